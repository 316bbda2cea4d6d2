use tracing::{debug, info};

use crate::{
    scoring::points_for,
    service::{BetFilter, DataService, MatchFilter},
    stage::{Stage, StageReport},
    types::BetPatch,
};

/// Recomputes the points of every bet on a match that carries a result.
///
/// Each bet's points are a pure function of its pick and the match's current
/// result, so a corrected result flows through on the next pass. Only bets
/// whose stored value differs are written. `examined` counts bets.
pub async fn settle_points<S>(service: &S) -> StageReport
where
    S: DataService + ?Sized,
{
    let mut report = StageReport::new(Stage::Points);

    let decided = match service.list_matches(&MatchFilter::all().having_result()).await {
        Ok(listing) => report.accept(listing),
        Err(e) => return report.abort(e),
    };

    for m in decided {
        let Some(result) = m.result else {
            continue;
        };

        let bets = match service.list_bets(&BetFilter::for_match(&m.id)).await {
            Ok(listing) => report.accept(listing),
            Err(e) => {
                if let Some(e) = report.record_failure(&m.id, e) {
                    return report.abort(e);
                }
                continue;
            }
        };

        let mut updated = 0usize;
        for bet in &bets {
            report.examined += 1;
            let points = points_for(bet.pick, result);
            if bet.points == Some(points) {
                continue;
            }

            match service.update_bet(&bet.id, &BetPatch::points(points)).await {
                Ok(_) => {
                    report.written += 1;
                    updated += 1;
                }
                Err(e) => {
                    if let Some(e) = report.record_failure(&bet.id, e) {
                        return report.abort(e);
                    }
                }
            }
        }

        if updated > 0 {
            info!(match_id = %m.id, result = %result, "{}: settled {}/{} bets", m.label(), updated, bets.len());
        }
    }

    debug!("points stage: {} of {} bets rewritten", report.written, report.examined);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{Fault, InMemoryDataService, Operation},
        types::{Bet, Match, MatchStatus, Outcome},
    };
    use chrono::{TimeZone, Utc};

    fn decided(id: &str, result: Option<Outcome>) -> Match {
        let mut m = Match::scheduled(id, "Home", "Away", Utc.with_ymd_and_hms(2025, 4, 1, 18, 0, 0).unwrap());
        m.status = MatchStatus::Completed;
        m.result = result;
        m
    }

    fn bet(id: &str, match_id: &str, pick: Outcome, points: Option<i32>) -> Bet {
        Bet {
            id: id.to_string(),
            match_id: match_id.to_string(),
            user_id: format!("user-{}", id),
            pick,
            points,
        }
    }

    #[tokio::test]
    async fn test_settles_bets_against_result() {
        let service = InMemoryDataService::new();
        service.insert_match(decided("m1", Some(Outcome::Home)));
        service.insert_bet(bet("b1", "m1", Outcome::Home, None));
        service.insert_bet(bet("b2", "m1", Outcome::Draw, None));
        service.insert_bet(bet("b3", "m1", Outcome::Away, Some(0)));

        let report = settle_points(&service).await;
        assert_eq!((report.examined, report.written), (3, 3));
        assert_eq!(service.bet_by_id("b1").unwrap().points, Some(3));
        assert_eq!(service.bet_by_id("b2").unwrap().points, Some(1));
        assert_eq!(service.bet_by_id("b3").unwrap().points, Some(1));

        let report = settle_points(&service).await;
        assert_eq!((report.examined, report.written), (3, 0));
    }

    #[tokio::test]
    async fn test_leaves_undecided_matches_alone() {
        let service = InMemoryDataService::new();
        service.insert_match(decided("m1", None));
        service.insert_bet(bet("b1", "m1", Outcome::Home, None));

        let report = settle_points(&service).await;
        assert_eq!(report.examined, 0);
        assert_eq!(service.bet_by_id("b1").unwrap().points, None);
    }

    #[tokio::test]
    async fn test_failed_bet_does_not_block_siblings() {
        let service = InMemoryDataService::new();
        service.insert_match(decided("m1", Some(Outcome::Draw)));
        service.insert_match(decided("m2", Some(Outcome::Away)));
        service.insert_bet(bet("b1", "m1", Outcome::Draw, None));
        service.insert_bet(bet("b2", "m1", Outcome::Home, None));
        service.insert_bet(bet("b3", "m2", Outcome::Away, None));
        service.fail_record("b1", Fault::NotFound);

        let report = settle_points(&service).await;
        assert_eq!((report.written, report.skipped), (2, 1));
        assert_eq!(service.bet_by_id("b1").unwrap().points, None);
        assert_eq!(service.bet_by_id("b2").unwrap().points, Some(1));
        assert_eq!(service.bet_by_id("b3").unwrap().points, Some(3));
    }

    #[tokio::test]
    async fn test_auth_failure_abandons_stage() {
        let service = InMemoryDataService::new();
        service.insert_match(decided("m1", Some(Outcome::Draw)));
        service.insert_bet(bet("b1", "m1", Outcome::Draw, None));
        service.inject(Operation::ListBets, Fault::Auth);

        let report = settle_points(&service).await;
        assert!(report.aborted_by_auth());
        assert_eq!(service.bet_by_id("b1").unwrap().points, None);
    }

    #[tokio::test]
    async fn test_unreadable_bets_count_as_skipped() {
        let service = InMemoryDataService::new();
        service.insert_match(decided("m1", Some(Outcome::Away)));
        service.insert_bet(bet("b1", "m1", Outcome::Away, None));
        service.insert_malformed_bet("b2", "m1", "pick X");

        let report = settle_points(&service).await;
        assert_eq!((report.examined, report.written, report.skipped), (1, 1, 1));
        assert_eq!(service.bet_by_id("b1").unwrap().points, Some(3));
    }
}
