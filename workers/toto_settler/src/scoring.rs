use crate::types::Outcome;

/// Points awarded when a pick matches the result.
pub const CORRECT_PICK_POINTS: i32 = 3;
/// Points awarded for a settled pick that missed.
pub const INCORRECT_PICK_POINTS: i32 = 1;

/// Outcome implied by a final score.
pub fn outcome_from_scores(home_score: u32, away_score: u32) -> Outcome {
    use std::cmp::Ordering::*;
    match home_score.cmp(&away_score) {
        Greater => Outcome::Home,
        Equal => Outcome::Draw,
        Less => Outcome::Away,
    }
}

/// Result for a match whose scores may not be entered yet. Both scores must be present.
pub fn derive_result(home_score: Option<u32>, away_score: Option<u32>) -> Option<Outcome> {
    match (home_score, away_score) {
        (Some(home), Some(away)) => Some(outcome_from_scores(home, away)),
        _ => None,
    }
}

pub fn points_for(pick: Outcome, result: Outcome) -> i32 {
    if pick == result {
        CORRECT_PICK_POINTS
    } else {
        INCORRECT_PICK_POINTS
    }
}
