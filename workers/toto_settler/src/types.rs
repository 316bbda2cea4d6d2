use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{error::ServiceError, utils::parse_timestamp};

pub const MATCHES: &str = "matches";
pub const BETS: &str = "bets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    // The admin app writes "finished" for the same state.
    #[serde(alias = "finished")]
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Every stored spelling of this status, canonical first.
    pub fn stored_values(&self) -> &'static [&'static str] {
        match self {
            MatchStatus::Upcoming => &["upcoming"],
            MatchStatus::Live => &["live"],
            MatchStatus::Completed => &["completed", "finished"],
            MatchStatus::Cancelled => &["cancelled"],
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "live" => Ok(MatchStatus::Live),
            "completed" | "finished" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(format!("unknown match status {:?}", other)),
        }
    }
}

/// Home win, draw or away win. Used both for a user's pick and a match's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "H")]
    Home,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "A")]
    Away,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Home => "H",
            Outcome::Draw => "D",
            Outcome::Away => "A",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H" => Ok(Outcome::Home),
            "D" => Ok(Outcome::Draw),
            "A" => Ok(Outcome::Away),
            other => Err(format!("unknown outcome code {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub league: String,
    pub tour: u32,
    pub home_team: String,
    pub away_team: String,
    pub starts_at: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub result: Option<Outcome>,
    pub odd_home: Option<f64>,
    pub odd_draw: Option<f64>,
    pub odd_away: Option<f64>,
}

impl Match {
    /// A fresh fixture as an admin would create it: upcoming, no scores.
    pub fn scheduled(
        id: impl Into<String>,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        starts_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            league: String::new(),
            tour: 1,
            home_team: home_team.into(),
            away_team: away_team.into(),
            starts_at,
            status: MatchStatus::Upcoming,
            home_score: None,
            away_score: None,
            result: None,
            odd_home: None,
            odd_draw: None,
            odd_away: None,
        }
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub id: String,
    pub match_id: String,
    pub user_id: String,
    pub pick: Outcome,
    /// Unset until settled. Anything other than the settlement formula's value
    /// (including legacy zeroes) is rewritten by the points stage.
    pub points: Option<i32>,
}

/// Partial update for a match. Only fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,
}

impl MatchPatch {
    pub fn status(status: MatchStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn result(result: Outcome) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i32>,
}

impl BetPatch {
    pub fn points(points: i32) -> Self {
        Self {
            points: Some(points),
            ..Self::default()
        }
    }

    pub fn pick(pick: Outcome) -> Self {
        Self {
            pick: Some(pick),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBet {
    pub match_id: String,
    pub user_id: String,
    pub pick: Outcome,
}

/// A match as it arrives over the wire, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatchRecord {
    pub id: String,
    pub league: Option<String>,
    pub tour: Option<i64>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub starts_at: Option<String>,
    pub status: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub result: Option<String>,
    pub odd_home: Option<f64>,
    pub odd_draw: Option<f64>,
    pub odd_away: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn score(value: Option<i64>, field: &str) -> Result<Option<u32>, String> {
    match value {
        None => Ok(None),
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| format!("{} must be a non-negative integer, got {}", field, v)),
    }
}

fn odd(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

impl TryFrom<MatchRecord> for Match {
    type Error = ServiceError;

    fn try_from(record: MatchRecord) -> Result<Self, Self::Error> {
        let id = record.id.trim().to_string();
        let invalid = |reason: String| ServiceError::invalid_record(MATCHES, id.clone(), reason);

        if id.is_empty() {
            return Err(invalid("missing id".to_string()));
        }

        let status = non_empty(record.status)
            .ok_or_else(|| invalid("missing status".to_string()))?
            .parse::<MatchStatus>()
            .map_err(invalid)?;

        let raw_start = non_empty(record.starts_at)
            .ok_or_else(|| invalid("missing starts_at".to_string()))?;
        let starts_at = parse_timestamp(&raw_start)
            .ok_or_else(|| invalid(format!("unparseable starts_at {:?}", raw_start)))?;

        let home_team = non_empty(record.home_team)
            .ok_or_else(|| invalid("missing home_team".to_string()))?;
        let away_team = non_empty(record.away_team)
            .ok_or_else(|| invalid("missing away_team".to_string()))?;

        let tour = match record.tour {
            Some(t) if t >= 1 => u32::try_from(t).map_err(|_| invalid(format!("tour out of range: {}", t)))?,
            Some(t) => return Err(invalid(format!("tour must be positive, got {}", t))),
            None => return Err(invalid("missing tour".to_string())),
        };

        let home_score = score(record.home_score, "home_score").map_err(invalid)?;
        let away_score = score(record.away_score, "away_score").map_err(invalid)?;

        let result = match non_empty(record.result) {
            Some(code) => Some(code.parse::<Outcome>().map_err(invalid)?),
            None => None,
        };

        Ok(Match {
            id: id.clone(),
            league: non_empty(record.league).unwrap_or_default(),
            tour,
            home_team,
            away_team,
            starts_at,
            status,
            home_score,
            away_score,
            result,
            odd_home: odd(record.odd_home),
            odd_draw: odd(record.odd_draw),
            odd_away: odd(record.odd_away),
        })
    }
}

/// A bet as it arrives over the wire, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BetRecord {
    pub id: String,
    pub match_id: Option<String>,
    pub user_id: Option<String>,
    pub pick: Option<String>,
    pub points: Option<i64>,
}

impl TryFrom<BetRecord> for Bet {
    type Error = ServiceError;

    fn try_from(record: BetRecord) -> Result<Self, Self::Error> {
        let id = record.id.trim().to_string();
        let invalid = |reason: String| ServiceError::invalid_record(BETS, id.clone(), reason);

        if id.is_empty() {
            return Err(invalid("missing id".to_string()));
        }

        let match_id = non_empty(record.match_id).ok_or_else(|| invalid("missing match_id".to_string()))?;
        let user_id = non_empty(record.user_id).ok_or_else(|| invalid("missing user_id".to_string()))?;
        let pick = non_empty(record.pick)
            .ok_or_else(|| invalid("missing pick".to_string()))?
            .parse::<Outcome>()
            .map_err(invalid)?;
        let points = match record.points {
            Some(p) => Some(i32::try_from(p).map_err(|_| invalid(format!("points out of range: {}", p)))?),
            None => None,
        };

        Ok(Bet {
            id: id.clone(),
            match_id,
            user_id,
            pick,
            points,
        })
    }
}
