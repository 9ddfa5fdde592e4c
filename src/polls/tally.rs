use std::collections::HashMap;

use crate::entities::poll_option;
use crate::models::poll::{OptionResult, PollResults};

const PERCENTAGE_DECIMALS: i32 = 2;

/// Builds per-option results in the order `options` is given.
///
/// Votes recorded against options that are not in `options` are ignored, so
/// `total_votes` is always the sum of the listed option counts.
pub fn tally(
    poll_id: i32,
    options: &[poll_option::Model],
    counts: &HashMap<i32, i64>,
) -> PollResults {
    let votes = options
        .iter()
        .map(|option| counts.get(&option.id).copied().unwrap_or(0))
        .collect::<Vec<_>>();
    let total_votes = votes.iter().sum::<i64>();
    assert!(total_votes >= 0, "Vote total cannot be negative");

    let results = options
        .iter()
        .zip(votes)
        .map(|(option, votes)| OptionResult {
            option_id: option.id,
            title: option.title.clone(),
            votes,
            percentage: percentage(votes, total_votes),
        })
        .collect::<Vec<_>>();

    PollResults {
        poll_id,
        options: results,
        total_votes,
    }
}

pub fn percentage(votes: i64, total: i64) -> f64 {
    assert!(votes >= 0, "Vote count cannot be negative");
    assert!(votes <= total || total == 0, "Option votes exceed total");
    if total <= 0 {
        return 0.0;
    }
    round_half_away_from_zero(votes as f64 / total as f64 * 100.0, PERCENTAGE_DECIMALS)
}

fn round_half_away_from_zero(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    // f64::round already rounds halves away from zero.
    (value * scale).round() / scale
}
