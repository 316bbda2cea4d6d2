use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::{
    error::ServiceError,
    types::{Bet, BetPatch, Match, MatchPatch, MatchStatus, NewBet},
    utils::escape_filter_value,
};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now >= self.issued_at + ttl
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Selects matches by status and, optionally, by having a derived result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFilter {
    pub statuses: Vec<MatchStatus>,
    pub with_result: bool,
    pub sort_by_start: bool,
}

impl MatchFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: MatchStatus) -> Self {
        Self::with_statuses(&[status])
    }

    pub fn with_statuses(statuses: &[MatchStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn having_result(mut self) -> Self {
        self.with_result = true;
        self
    }

    pub fn sorted_by_start(mut self) -> Self {
        self.sort_by_start = true;
        self
    }

    pub fn matches(&self, m: &Match) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&m.status))
            && (!self.with_result || m.result.is_some())
    }

    /// Renders the filter in the remote store's expression syntax.
    pub fn expression(&self) -> Option<String> {
        let mut clauses = Vec::new();

        if !self.statuses.is_empty() {
            // The server filters on the raw column, so aliases must be spelled out.
            let statuses = self
                .statuses
                .iter()
                .flat_map(MatchStatus::stored_values)
                .map(|value| format!("status = \"{}\"", value))
                .collect::<Vec<_>>();
            if statuses.len() == 1 {
                clauses.push(statuses.join(""));
            } else {
                clauses.push(format!("({})", statuses.join(" || ")));
            }
        }

        if self.with_result {
            clauses.push("result != \"\"".to_string());
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" && "))
        }
    }

    pub fn sort(&self) -> Option<&'static str> {
        self.sort_by_start.then_some("starts_at")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BetFilter {
    pub match_id: Option<String>,
    pub user_id: Option<String>,
}

impl BetFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_match(match_id: impl Into<String>) -> Self {
        Self {
            match_id: Some(match_id.into()),
            ..Self::default()
        }
    }

    pub fn and_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, bet: &Bet) -> bool {
        self.match_id.as_deref().map_or(true, |id| bet.match_id == id)
            && self.user_id.as_deref().map_or(true, |id| bet.user_id == id)
    }

    pub fn expression(&self) -> Option<String> {
        let clauses = [("match_id", &self.match_id), ("user_id", &self.user_id)]
            .into_iter()
            .filter_map(|(field, value)| {
                value
                    .as_deref()
                    .map(|v| format!("{} = \"{}\"", field, escape_filter_value(v)))
            })
            .collect::<Vec<_>>();

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" && "))
        }
    }
}

/// Records returned by a listing.
///
/// `rejected` holds one [`ServiceError::InvalidRecord`] per stored record that
/// matched the filter but failed validation. Those are never fatal to the
/// listing; callers decide how to account for them.
#[derive(Debug)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub rejected: Vec<ServiceError>,
}

impl<T> Listing<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }

    pub fn with_rejected(mut self, rejected: Vec<ServiceError>) -> Self {
        self.rejected = rejected;
        self
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// The remote store holding matches and bets.
///
/// Implementations own network, paging and timeout concerns. Every call
/// resolves to a value or one of the [`ServiceError`] kinds.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Logs in and installs the resulting session for subsequent calls.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ServiceError>;

    async fn list_matches(&self, filter: &MatchFilter) -> Result<Listing<Match>, ServiceError>;

    async fn get_match(&self, id: &str) -> Result<Match, ServiceError>;

    async fn update_match(&self, id: &str, patch: &MatchPatch) -> Result<Match, ServiceError>;

    async fn list_bets(&self, filter: &BetFilter) -> Result<Listing<Bet>, ServiceError>;

    async fn update_bet(&self, id: &str, patch: &BetPatch) -> Result<Bet, ServiceError>;

    async fn create_bet(&self, bet: &NewBet) -> Result<Bet, ServiceError>;
}
