use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::warn;

use toto_settler::{
    config::WorkerConfig,
    init_tracing,
    metrics::MetricsCollector,
    pocketbase::PocketBaseClient,
    service::{BetFilter, DataService, MatchFilter},
    standings,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the leaderboard and overall statistics", long_about = None)]
struct Args {
    /// Only show the top N users
    #[arg(short, long)]
    limit: Option<usize>,

    /// Include the per-league breakdown for each user
    #[arg(long)]
    leagues: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = WorkerConfig::from_env()?;
    let client = PocketBaseClient::new(&config.service, &config.rate_limits, MetricsCollector::new())?;
    client.authenticate(&config.service.credentials()).await?;

    let matches = client.list_matches(&MatchFilter::all()).await?;
    let bets = client.list_bets(&BetFilter::all()).await?;
    for err in matches.rejected.iter().chain(&bets.rejected) {
        warn!("left out of standings: {}", err);
    }

    let mut standings = standings::compute(&matches.records, &bets.records);
    if let Some(limit) = args.limit {
        standings.leaderboard.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&standings)?);
        return Ok(());
    }

    let overall = &standings.overall;
    println!("Overall Statistics:");
    println!("===================\n");
    println!("Matches:      {} ({} live)", overall.total_matches, overall.live_matches);
    println!("Bets:         {} ({} settled)", overall.total_bets, overall.settled_bets);
    println!("Correct:      {}", overall.correct_bets);
    println!("Success rate: {}%\n", overall.success_rate());

    println!("Leaderboard:");
    println!("============\n");
    println!("{:>4}  {:<24} {:>6} {:>8} {:>8} {:>6}", "#", "User", "Points", "Guessed", "Settled", "Rate");

    for (rank, user) in standings.leaderboard.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {:>6} {:>8} {:>8} {:>5}%",
            rank + 1,
            user.user_id,
            user.totals.points,
            user.totals.guessed_bets,
            user.totals.settled_bets,
            user.totals.success_rate()
        );

        if args.leagues {
            for (league, tally) in &user.leagues {
                println!(
                    "      {:<22} {:>6} {:>8} {:>8} {:>5}%",
                    league,
                    tally.points,
                    tally.guessed_bets,
                    tally.settled_bets,
                    tally.success_rate()
                );
            }
        }
    }

    Ok(())
}
