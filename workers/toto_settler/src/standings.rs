//! Leaderboard and overall statistics derived from settled bets.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::{
    scoring::{CORRECT_PICK_POINTS, INCORRECT_PICK_POINTS},
    types::{Bet, Match, MatchStatus},
    utils::percent,
};

/// Bet counters for one user, overall or within a league.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Sum of points for correct picks only.
    pub points: i64,
    /// Bets the points stage has settled.
    pub settled_bets: usize,
    pub all_bets: usize,
    pub guessed_bets: usize,
}

impl Tally {
    fn record(&mut self, points: Option<i32>) {
        self.all_bets += 1;
        match points {
            Some(CORRECT_PICK_POINTS) => {
                self.points += i64::from(CORRECT_PICK_POINTS);
                self.guessed_bets += 1;
                self.settled_bets += 1;
            }
            Some(INCORRECT_PICK_POINTS) => self.settled_bets += 1,
            // unset or a legacy value not yet healed
            _ => {}
        }
    }

    /// Rounded percentage of settled bets that were guessed.
    pub fn success_rate(&self) -> u32 {
        percent(self.guessed_bets, self.settled_bets)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStanding {
    pub user_id: String,
    #[serde(flatten)]
    pub totals: Tally,
    pub leagues: BTreeMap<String, Tally>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverallStats {
    pub total_matches: usize,
    pub live_matches: usize,
    pub total_bets: usize,
    pub settled_bets: usize,
    pub correct_bets: usize,
}

impl OverallStats {
    pub fn success_rate(&self) -> u32 {
        percent(self.correct_bets, self.settled_bets)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Standings {
    pub leaderboard: Vec<UserStanding>,
    pub overall: OverallStats,
}

impl Standings {
    pub fn user(&self, user_id: &str) -> Option<&UserStanding> {
        self.leaderboard.iter().find(|u| u.user_id == user_id)
    }
}

pub fn compute(matches: &[Match], bets: &[Bet]) -> Standings {
    let leagues: HashMap<&str, &str> = matches
        .iter()
        .filter(|m| !m.league.is_empty())
        .map(|m| (m.id.as_str(), m.league.as_str()))
        .collect();

    let mut overall = OverallStats {
        total_matches: matches.len(),
        live_matches: matches.iter().filter(|m| m.status == MatchStatus::Live).count(),
        ..OverallStats::default()
    };

    let mut users: BTreeMap<&str, UserStanding> = BTreeMap::new();
    for bet in bets {
        let standing = users.entry(bet.user_id.as_str()).or_insert_with(|| UserStanding {
            user_id: bet.user_id.clone(),
            totals: Tally::default(),
            leagues: BTreeMap::new(),
        });

        standing.totals.record(bet.points);
        if let Some(league) = leagues.get(bet.match_id.as_str()) {
            standing.leagues.entry(league.to_string()).or_default().record(bet.points);
        }

        overall.total_bets += 1;
        match bet.points {
            Some(CORRECT_PICK_POINTS) => {
                overall.settled_bets += 1;
                overall.correct_bets += 1;
            }
            Some(INCORRECT_PICK_POINTS) => overall.settled_bets += 1,
            _ => {}
        }
    }

    let mut leaderboard: Vec<UserStanding> = users.into_values().collect();
    leaderboard.sort_by(|a, b| {
        b.totals
            .points
            .cmp(&a.totals.points)
            .then(b.totals.guessed_bets.cmp(&a.totals.guessed_bets))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    Standings { leaderboard, overall }
}
