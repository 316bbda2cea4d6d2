use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    clock::Clock,
    error::ServiceError,
    service::{BetFilter, DataService},
    types::{Bet, BetPatch, MatchStatus, NewBet, Outcome},
};

#[derive(Debug, thiserror::Error)]
pub enum BetError {
    #[error("match {match_id} is {status}, bets are only accepted on upcoming matches")]
    MatchLocked { match_id: String, status: MatchStatus },
    #[error("match {match_id} kicked off at {starts_at}")]
    KickoffPassed {
        match_id: String,
        starts_at: DateTime<Utc>,
    },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Records `user_id`'s pick on `match_id`, replacing any earlier pick.
///
/// A match is open for betting only while it is upcoming and its kickoff is
/// still in the future, even if the lock stage has not caught up yet.
pub async fn place_bet<S, C>(
    service: &S,
    clock: &C,
    user_id: &str,
    match_id: &str,
    pick: Outcome,
) -> Result<Bet, BetError>
where
    S: DataService + ?Sized,
    C: Clock + ?Sized,
{
    let m = service.get_match(match_id).await?;

    if m.status != MatchStatus::Upcoming {
        return Err(BetError::MatchLocked {
            match_id: m.id,
            status: m.status,
        });
    }
    if m.starts_at <= clock.now() {
        return Err(BetError::KickoffPassed {
            match_id: m.id,
            starts_at: m.starts_at,
        });
    }

    let existing = service
        .list_bets(&BetFilter::for_match(match_id).and_user(user_id))
        .await?;
    for err in &existing.rejected {
        warn!(match_id, user_id, "ignoring unreadable bet: {}", err);
    }

    let bet = match existing.records.into_iter().next() {
        Some(bet) if bet.pick == pick => bet,
        Some(bet) => service.update_bet(&bet.id, &BetPatch::pick(pick)).await?,
        None => {
            service
                .create_bet(&NewBet {
                    match_id: match_id.to_string(),
                    user_id: user_id.to_string(),
                    pick,
                })
                .await?
        }
    };

    info!(bet_id = %bet.id, match_id, user_id, pick = %pick, "bet placed on {}", m.label());
    Ok(bet)
}
