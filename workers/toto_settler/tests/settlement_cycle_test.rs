use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use toto_settler::{
    clock::FixedClock,
    lock_stage::lock_started_matches,
    memory::{Fault, InMemoryDataService, Operation},
    metrics::MetricsCollector,
    orchestrator::{CycleReport, Orchestrator},
    points_stage::settle_points,
    result_stage::derive_results,
    service::Credentials,
    stage::Stage,
    types::{Bet, Match, MatchStatus, Outcome},
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("worker@example.com", "pb-secret")
}

fn worker(service: &InMemoryDataService) -> Orchestrator<InMemoryDataService, FixedClock> {
    Orchestrator::new(service.clone(), FixedClock::new(now()), credentials(), MetricsCollector::new())
}

fn fixture(id: &str, status: MatchStatus, scores: (Option<u32>, Option<u32>)) -> Match {
    let mut m = Match::scheduled(id, "Zenit", "Spartak", now() - Duration::hours(1));
    m.league = "RPL".to_string();
    m.status = status;
    m.home_score = scores.0;
    m.away_score = scores.1;
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

fn points(service: &InMemoryDataService, bet_id: &str) -> Option<i32> {
    service.bet_by_id(bet_id).and_then(|b| b.points)
}

/// A store with work pending in every stage.
fn mixed_store() -> InMemoryDataService {
    let service = InMemoryDataService::with_credentials(credentials());

    let mut started = fixture("m1", MatchStatus::Upcoming, (None, None));
    started.starts_at = now() - Duration::minutes(3);
    let mut later = fixture("m2", MatchStatus::Upcoming, (None, None));
    later.starts_at = now() + Duration::hours(2);
    let mut stale = fixture("m4", MatchStatus::Completed, (Some(0), Some(0)));
    stale.result = Some(Outcome::Away);

    service.insert_match(started);
    service.insert_match(later);
    service.insert_match(fixture("m3", MatchStatus::Live, (Some(1), Some(2))));
    service.insert_match(stale);

    service.insert_bet(bet("b1", "m1", Outcome::Home, None));
    service.insert_bet(bet("b2", "m2", Outcome::Draw, None));
    service.insert_bet(bet("b3", "m3", Outcome::Away, None));
    service.insert_bet(bet("b4", "m3", Outcome::Home, Some(0)));
    service.insert_bet(bet("b5", "m4", Outcome::Away, Some(3)));
    service.insert_bet(bet("b6", "m4", Outcome::Draw, Some(1)));
    service
}

async fn cycle(worker: &mut Orchestrator<InMemoryDataService, FixedClock>) -> CycleReport {
    let report = worker.run_cycle().await;
    assert!(!report.skipped_for_auth);
    report
}

#[test_log::test(tokio::test)]
async fn test_started_match_is_locked_without_result() {
    let service = InMemoryDataService::with_credentials(credentials());
    let mut m1 = fixture("m1", MatchStatus::Upcoming, (None, None));
    m1.starts_at = now() - Duration::minutes(5);
    service.insert_match(m1);
    service.insert_bet(bet("b1", "m1", Outcome::Home, None));
    service.insert_bet(bet("b2", "m1", Outcome::Away, None));

    let mut worker = worker(&service);
    let report = cycle(&mut worker).await;

    let m1 = service.match_by_id("m1").unwrap();
    assert_eq!(m1.status, MatchStatus::Live);
    assert_eq!(m1.result, None);
    assert_eq!(points(&service, "b1"), None);
    assert_eq!(points(&service, "b2"), None);
    assert_eq!(report.locked(), 1);

    // second pass finds nothing to lock
    let report = cycle(&mut worker).await;
    assert_eq!(report.locked(), 0);
    assert_eq!(service.match_by_id("m1").unwrap().status, MatchStatus::Live);
}

#[test_log::test(tokio::test)]
async fn test_future_match_is_never_touched() {
    let service = InMemoryDataService::new();
    let mut later = fixture("m1", MatchStatus::Upcoming, (None, None));
    later.starts_at = now() + Duration::seconds(1);
    service.insert_match(later.clone());

    let mut worker = worker(&service);
    cycle(&mut worker).await;
    cycle(&mut worker).await;

    assert_eq!(service.match_by_id("m1"), Some(later));
    assert_eq!(service.match_writes(), 0);
}

#[test_log::test(tokio::test)]
async fn test_live_match_settles_every_bet() {
    let service = InMemoryDataService::with_credentials(credentials());
    service.insert_match(fixture("m2", MatchStatus::Live, (Some(2), Some(1))));
    service.insert_bet(bet("b1", "m2", Outcome::Home, None));
    service.insert_bet(bet("b2", "m2", Outcome::Draw, None));
    service.insert_bet(bet("b3", "m2", Outcome::Away, None));

    let mut worker = worker(&service);
    let report = cycle(&mut worker).await;

    assert_eq!(service.match_by_id("m2").unwrap().result, Some(Outcome::Home));
    assert_eq!(points(&service, "b1"), Some(3));
    assert_eq!(points(&service, "b2"), Some(1));
    assert_eq!(points(&service, "b3"), Some(1));
    assert_eq!(report.results_written(), 1);
    assert_eq!(report.points_written(), 3);
}

#[test_log::test(tokio::test)]
async fn test_stale_result_is_corrected_and_bets_flip() {
    let service = InMemoryDataService::new();
    let mut m3 = fixture("m3", MatchStatus::Completed, (Some(1), Some(1)));
    m3.result = Some(Outcome::Home);
    service.insert_match(m3);
    service.insert_bet(bet("b1", "m3", Outcome::Draw, Some(1)));
    service.insert_bet(bet("b2", "m3", Outcome::Draw, Some(1)));
    service.insert_bet(bet("b3", "m3", Outcome::Home, Some(3)));

    let mut worker = worker(&service);
    cycle(&mut worker).await;

    assert_eq!(service.match_by_id("m3").unwrap().result, Some(Outcome::Draw));
    assert_eq!(points(&service, "b1"), Some(3));
    assert_eq!(points(&service, "b2"), Some(3));
    assert_eq!(points(&service, "b3"), Some(1));
}

#[test_log::test(tokio::test)]
async fn test_result_tracks_score_ordering() {
    let service = InMemoryDataService::new();
    for home in 0..4u32 {
        for away in 0..4u32 {
            let id = format!("m-{}-{}", home, away);
            service.insert_match(fixture(&id, MatchStatus::Completed, (Some(home), Some(away))));
        }
    }

    let mut worker = worker(&service);
    cycle(&mut worker).await;

    for m in service.matches() {
        let (home, away) = (m.home_score.unwrap(), m.away_score.unwrap());
        let expected = if home > away {
            Outcome::Home
        } else if home == away {
            Outcome::Draw
        } else {
            Outcome::Away
        };
        assert_eq!(m.result, Some(expected), "{}", m.id);
    }
}

#[test_log::test(tokio::test)]
async fn test_partial_scores_never_produce_result() {
    let service = InMemoryDataService::new();
    service.insert_match(fixture("home-only", MatchStatus::Live, (Some(1), None)));
    service.insert_match(fixture("away-only", MatchStatus::Completed, (None, Some(0))));
    service.insert_bet(bet("b1", "home-only", Outcome::Home, None));

    let mut worker = worker(&service);
    cycle(&mut worker).await;

    assert!(service.matches().iter().all(|m| m.result.is_none()));
    assert_eq!(points(&service, "b1"), None);
}

#[test_log::test(tokio::test)]
async fn test_second_cycle_is_a_fixpoint() {
    let service = InMemoryDataService::with_credentials(credentials());
    let mut upcoming = fixture("m1", MatchStatus::Upcoming, (None, None));
    upcoming.starts_at = now() - Duration::minutes(1);
    service.insert_match(upcoming);
    service.insert_match(fixture("m2", MatchStatus::Live, (Some(0), Some(3))));
    service.insert_match(fixture("m3", MatchStatus::Completed, (Some(2), Some(2))));
    service.insert_match(fixture("m4", MatchStatus::Cancelled, (Some(1), Some(0))));
    service.insert_bet(bet("b1", "m1", Outcome::Home, None));
    service.insert_bet(bet("b2", "m2", Outcome::Away, None));
    service.insert_bet(bet("b3", "m3", Outcome::Home, Some(0)));
    service.insert_bet(bet("b4", "m4", Outcome::Home, None));

    let mut worker = worker(&service);
    cycle(&mut worker).await;

    let matches = service.matches();
    let bets = service.bets();
    let writes = (service.match_writes(), service.bet_writes());

    let report = cycle(&mut worker).await;
    assert_eq!(report.total_written(), 0);
    assert_eq!(service.matches(), matches);
    assert_eq!(service.bets(), bets);
    assert_eq!((service.match_writes(), service.bet_writes()), writes);

    // cancelled matches stay out of settlement
    assert_eq!(service.match_by_id("m4").unwrap().result, None);
    assert_eq!(points(&service, "b4"), None);
}

#[test_log::test(tokio::test)]
async fn test_admin_score_correction_propagates() {
    let service = InMemoryDataService::new();
    service.insert_match(fixture("m1", MatchStatus::Completed, (Some(3), Some(0))));
    service.insert_bet(bet("b1", "m1", Outcome::Home, None));
    service.insert_bet(bet("b2", "m1", Outcome::Away, None));

    let mut worker = worker(&service);
    cycle(&mut worker).await;
    assert_eq!(points(&service, "b1"), Some(3));
    assert_eq!(points(&service, "b2"), Some(1));

    service.edit_match("m1", |m| {
        m.home_score = Some(0);
        m.away_score = Some(3);
    });
    cycle(&mut worker).await;

    assert_eq!(service.match_by_id("m1").unwrap().result, Some(Outcome::Away));
    assert_eq!(points(&service, "b1"), Some(1));
    assert_eq!(points(&service, "b2"), Some(3));
}

#[test_log::test(tokio::test)]
async fn test_failures_are_isolated_and_healed_later() {
    let service = InMemoryDataService::new();
    service.insert_match(fixture("m1", MatchStatus::Live, (Some(1), Some(0))));
    service.insert_bet(bet("b1", "m1", Outcome::Home, None));
    service.insert_bet(bet("b2", "m1", Outcome::Draw, None));
    service.fail_record("b1", Fault::Conflict);

    let mut worker = worker(&service);
    let report = cycle(&mut worker).await;
    let points_stage = report.stage(Stage::Points).unwrap();
    assert_eq!(points_stage.skipped, 1);
    assert!(points_stage.aborted.is_none());
    assert_eq!(points(&service, "b1"), None);
    assert_eq!(points(&service, "b2"), Some(1));

    service.clear_record_fault("b1");
    service.inject(Operation::ListMatches, Fault::Transient);
    let report = cycle(&mut worker).await;
    assert!(report.stage(Stage::Lock).unwrap().aborted.is_some());
    assert_eq!(points(&service, "b1"), Some(3));
}

#[test_log::test(tokio::test)]
async fn test_concurrent_workers_reach_single_worker_state() {
    let reference = mixed_store();
    cycle(&mut worker(&reference)).await;

    let shared = mixed_store();
    let mut first = worker(&shared);
    let mut second = worker(&shared);
    let (a, b) = tokio::join!(first.run_cycle(), second.run_cycle());
    assert!(!a.skipped_for_auth && !b.skipped_for_auth);

    assert_eq!(shared.matches(), reference.matches());
    assert_eq!(shared.bets(), reference.bets());

    let report = cycle(&mut first).await;
    assert_eq!(report.total_written(), 0);
}

#[test_log::test(tokio::test)]
async fn test_interleaved_stages_reach_single_worker_state() {
    let reference = mixed_store();
    cycle(&mut worker(&reference)).await;

    let shared = InMemoryDataService::new();
    for m in mixed_store().matches() {
        shared.insert_match(m);
    }
    for b in mixed_store().bets() {
        shared.insert_bet(b);
    }

    // a second worker runs a full cycle while the first is between stages
    lock_started_matches(&shared, now()).await;
    cycle(&mut worker(&shared)).await;
    derive_results(&shared).await;
    lock_started_matches(&shared, now()).await;
    settle_points(&shared).await;
    settle_points(&shared).await;

    assert_eq!(shared.matches(), reference.matches());
    assert_eq!(shared.bets(), reference.bets());

    let writes = (shared.match_writes(), shared.bet_writes());
    let report = cycle(&mut worker(&shared)).await;
    assert_eq!(report.total_written(), 0);
    assert_eq!((shared.match_writes(), shared.bet_writes()), writes);
}
