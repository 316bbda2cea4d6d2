use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;

use toto_settler::{
    betting::place_bet, clock::SystemClock, config::WorkerConfig, init_tracing,
    metrics::MetricsCollector, pocketbase::PocketBaseClient, service::DataService, types::Outcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Place or change a user's pick on an upcoming match", long_about = None)]
struct Args {
    /// User the bet belongs to
    #[arg(short, long)]
    user: String,

    /// Match to bet on
    #[arg(short, long = "match")]
    match_id: String,

    /// H, D or A
    #[arg(short, long)]
    pick: Outcome,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = WorkerConfig::from_env()?;
    let client = PocketBaseClient::new(&config.service, &config.rate_limits, MetricsCollector::new())?;
    client.authenticate(&config.service.credentials()).await?;

    let bet = place_bet(&client, &SystemClock, &args.user, &args.match_id, args.pick).await?;
    println!("Bet {}: {} picked {} on match {}", bet.id, bet.user_id, bet.pick, bet.match_id);

    Ok(())
}
