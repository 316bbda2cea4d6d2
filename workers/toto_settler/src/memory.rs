//! An in-process [`DataService`] with fault injection, used to exercise the
//! settlement stages without a remote store.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    error::ServiceError,
    service::{BetFilter, Credentials, DataService, Listing, MatchFilter, Session},
    types::{Bet, BetPatch, Match, MatchPatch, MatchStatus, NewBet, BETS, MATCHES},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    ListMatches,
    GetMatch,
    UpdateMatch,
    ListBets,
    UpdateBet,
    CreateBet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Auth,
    Transient,
    NotFound,
    Conflict,
    Validation,
}

impl Fault {
    fn to_error(self, context: &str) -> ServiceError {
        let context = format!("injected fault: {}", context);
        match self {
            Fault::Auth => ServiceError::Auth(context),
            Fault::Transient => ServiceError::Transient(context),
            Fault::NotFound => ServiceError::NotFound(context),
            Fault::Conflict => ServiceError::Conflict(context),
            Fault::Validation => ServiceError::Validation(context),
        }
    }
}

/// A stored row that fails validation when read back.
struct Malformed {
    id: String,
    status: Option<MatchStatus>,
    match_id: Option<String>,
    reason: String,
}

impl Malformed {
    fn to_error(&self, collection: &'static str) -> ServiceError {
        ServiceError::invalid_record(collection, self.id.clone(), self.reason.clone())
    }
}

#[derive(Default)]
struct Store {
    malformed_matches: Vec<Malformed>,
    malformed_bets: Vec<Malformed>,
    matches: BTreeMap<String, Match>,
    bets: BTreeMap<String, Bet>,
    credentials: Option<Credentials>,
    session: Option<String>,
    sessions_issued: u64,
    pending_faults: HashMap<Operation, VecDeque<Fault>>,
    record_faults: HashMap<String, Fault>,
    calls: HashMap<Operation, usize>,
    match_writes: usize,
    bet_writes: usize,
    next_bet: u64,
}

impl Store {
    fn enter(&mut self, op: Operation) -> Result<(), ServiceError> {
        *self.calls.entry(op).or_default() += 1;

        if let Some(fault) = self.pending_faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(fault.to_error(&format!("{:?}", op)));
        }

        if op != Operation::Authenticate && self.credentials.is_some() && self.session.is_none() {
            return Err(ServiceError::Auth("no valid session".to_string()));
        }

        Ok(())
    }

    fn check_record(&self, id: &str) -> Result<(), ServiceError> {
        match self.record_faults.get(id) {
            Some(fault) => Err(fault.to_error(id)),
            None => Ok(()),
        }
    }
}

/// Cloning yields another handle onto the same store.
#[derive(Clone, Default)]
pub struct InMemoryDataService {
    inner: Arc<Mutex<Store>>,
}

impl InMemoryDataService {
    /// A store that accepts calls without authentication.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects calls until `authenticate` succeeds with these credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        let service = Self::default();
        service.store().credentials = Some(credentials);
        service
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_match(&self, m: Match) {
        self.store().matches.insert(m.id.clone(), m);
    }

    pub fn insert_bet(&self, bet: Bet) {
        self.store().bets.insert(bet.id.clone(), bet);
    }

    /// Stores a match row that listings with a matching status report as rejected.
    pub fn insert_malformed_match(&self, id: &str, status: MatchStatus, reason: &str) {
        self.store().malformed_matches.push(Malformed {
            id: id.to_string(),
            status: Some(status),
            match_id: None,
            reason: reason.to_string(),
        });
    }

    /// Stores a bet row on `match_id` that listings report as rejected.
    pub fn insert_malformed_bet(&self, id: &str, match_id: &str, reason: &str) {
        self.store().malformed_bets.push(Malformed {
            id: id.to_string(),
            status: None,
            match_id: Some(match_id.to_string()),
            reason: reason.to_string(),
        });
    }

    /// Applies an out-of-band edit, as an admin would through the UI.
    pub fn edit_match(&self, id: &str, edit: impl FnOnce(&mut Match)) {
        if let Some(m) = self.store().matches.get_mut(id) {
            edit(m);
        }
    }

    pub fn match_by_id(&self, id: &str) -> Option<Match> {
        self.store().matches.get(id).cloned()
    }

    pub fn bet_by_id(&self, id: &str) -> Option<Bet> {
        self.store().bets.get(id).cloned()
    }

    pub fn matches(&self) -> Vec<Match> {
        self.store().matches.values().cloned().collect()
    }

    pub fn bets(&self) -> Vec<Bet> {
        self.store().bets.values().cloned().collect()
    }

    /// Fails the next call of `op` with `fault`. Faults queue up per operation.
    pub fn inject(&self, op: Operation, fault: Fault) {
        self.store().pending_faults.entry(op).or_default().push_back(fault);
    }

    /// Fails every write to the record `id` until cleared.
    pub fn fail_record(&self, id: &str, fault: Fault) {
        self.store().record_faults.insert(id.to_string(), fault);
    }

    pub fn clear_record_fault(&self, id: &str) {
        self.store().record_faults.remove(id);
    }

    /// Drops the current session, as if the token expired server-side.
    pub fn revoke_session(&self) {
        self.store().session = None;
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.store().calls.get(&op).copied().unwrap_or_default()
    }

    pub fn match_writes(&self) -> usize {
        self.store().match_writes
    }

    pub fn bet_writes(&self) -> usize {
        self.store().bet_writes
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::Authenticate)?;

        if let Some(expected) = &store.credentials {
            if expected != credentials {
                return Err(ServiceError::Auth("invalid credentials".to_string()));
            }
        }

        store.sessions_issued += 1;
        let token = format!("session-{}", store.sessions_issued);
        store.session = Some(token.clone());
        Ok(Session {
            token,
            issued_at: Utc::now(),
        })
    }

    async fn list_matches(&self, filter: &MatchFilter) -> Result<Listing<Match>, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::ListMatches)?;

        let mut matches: Vec<Match> = store.matches.values().filter(|m| filter.matches(m)).cloned().collect();
        if filter.sort_by_start {
            matches.sort_by_key(|m| m.starts_at);
        }

        let rejected = store
            .malformed_matches
            .iter()
            .filter(|row| {
                filter.statuses.is_empty() || row.status.map_or(false, |s| filter.statuses.contains(&s))
            })
            .map(|row| row.to_error(MATCHES))
            .collect();
        Ok(Listing::new(matches).with_rejected(rejected))
    }

    async fn get_match(&self, id: &str) -> Result<Match, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::GetMatch)?;

        store
            .matches
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("{} record {}", MATCHES, id)))
    }

    async fn update_match(&self, id: &str, patch: &MatchPatch) -> Result<Match, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::UpdateMatch)?;
        store.check_record(id)?;

        let m = store
            .matches
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(format!("{} record {}", MATCHES, id)))?;
        if let Some(status) = patch.status {
            m.status = status;
        }
        if let Some(result) = patch.result {
            m.result = Some(result);
        }
        let updated = m.clone();
        store.match_writes += 1;
        Ok(updated)
    }

    async fn list_bets(&self, filter: &BetFilter) -> Result<Listing<Bet>, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::ListBets)?;

        let bets = store.bets.values().filter(|b| filter.matches(b)).cloned().collect();
        let rejected = store
            .malformed_bets
            .iter()
            .filter(|row| filter.match_id.is_none() || row.match_id == filter.match_id)
            .map(|row| row.to_error(BETS))
            .collect();
        Ok(Listing::new(bets).with_rejected(rejected))
    }

    async fn update_bet(&self, id: &str, patch: &BetPatch) -> Result<Bet, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::UpdateBet)?;
        store.check_record(id)?;

        let bet = store
            .bets
            .get_mut(id)
            .ok_or_else(|| ServiceError::NotFound(format!("{} record {}", BETS, id)))?;
        if let Some(pick) = patch.pick {
            bet.pick = pick;
        }
        if let Some(points) = patch.points {
            bet.points = Some(points);
        }
        let updated = bet.clone();
        store.bet_writes += 1;
        Ok(updated)
    }

    async fn create_bet(&self, new_bet: &NewBet) -> Result<Bet, ServiceError> {
        let mut store = self.store();
        store.enter(Operation::CreateBet)?;

        if !store.matches.contains_key(&new_bet.match_id) {
            return Err(ServiceError::Validation(format!("unknown match_id {}", new_bet.match_id)));
        }

        store.next_bet += 1;
        let bet = Bet {
            id: format!("bet{}", store.next_bet),
            match_id: new_bet.match_id.clone(),
            user_id: new_bet.user_id.clone(),
            pick: new_bet.pick,
            points: None,
        };
        store.bets.insert(bet.id.clone(), bet.clone());
        store.bet_writes += 1;
        Ok(bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_requires_session_when_credentials_set() {
        let creds = Credentials::new("admin", "secret");
        let service = InMemoryDataService::with_credentials(creds.clone());

        let err = service.list_matches(&MatchFilter::all()).await.unwrap_err();
        assert!(err.is_auth());

        let err = service
            .authenticate(&Credentials::new("admin", "wrong"))
            .await
            .unwrap_err();
        assert!(err.is_auth());

        service.authenticate(&creds).await.unwrap();
        assert!(service.list_matches(&MatchFilter::all()).await.is_ok());

        service.revoke_session();
        assert!(service.list_matches(&MatchFilter::all()).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once() {
        let service = InMemoryDataService::new();
        service.inject(Operation::ListBets, Fault::Transient);

        assert!(service.list_bets(&BetFilter::all()).await.unwrap_err().is_transient());
        assert!(service.list_bets(&BetFilter::all()).await.is_ok());
        assert_eq!(service.calls(Operation::ListBets), 2);
    }

    #[tokio::test]
    async fn test_malformed_rows_follow_the_filter() {
        let service = InMemoryDataService::new();
        service.insert_malformed_match("m9", MatchStatus::Live, "missing tour");
        service.insert_malformed_bet("b9", "m1", "pick X");

        let live = service.list_matches(&MatchFilter::with_status(MatchStatus::Live)).await.unwrap();
        assert!(live.records.is_empty());
        assert_eq!(live.rejected.len(), 1);
        assert_eq!(live.rejected[0].record_id(), Some("m9"));

        let upcoming = service
            .list_matches(&MatchFilter::with_status(MatchStatus::Upcoming))
            .await
            .unwrap();
        assert!(upcoming.rejected.is_empty());

        assert_eq!(service.list_bets(&BetFilter::for_match("m1")).await.unwrap().rejected.len(), 1);
        assert!(service.list_bets(&BetFilter::for_match("m2")).await.unwrap().rejected.is_empty());
    }

    #[tokio::test]
    async fn test_create_bet_assigns_id() {
        let service = InMemoryDataService::new();
        service.insert_match(Match::scheduled(
            "m1",
            "A",
            "B",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));

        let bet = service
            .create_bet(&NewBet {
                match_id: "m1".into(),
                user_id: "u1".into(),
                pick: Outcome::Away,
            })
            .await
            .unwrap();
        assert_eq!(bet.id, "bet1");
        assert_eq!(bet.points, None);
        assert_eq!(service.bet_by_id("bet1"), Some(bet));
    }
}
