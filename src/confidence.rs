//! Confidence scoring: initial values, clamped adjustment, weekly decay,
//! and the dormancy threshold.

use chrono::{DateTime, Utc};

use crate::models::{Instinct, InstinctStatus};

pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.95;

pub const CONFIRM_DELTA: f64 = 0.05;
pub const CONTRADICT_DELTA: f64 = -0.1;

pub const DECAY_PER_WEEK: f64 = 0.02;
const DAYS_PER_WEEK: i64 = 7;

pub const DORMANT_THRESHOLD: f64 = 0.2;

/// Initial confidence from the number of supporting observations.
pub fn initial_confidence(evidence_count: usize) -> f64 {
    match evidence_count {
        0 => MIN_CONFIDENCE,
        1..=2 => 0.3,
        3..=5 => 0.5,
        6..=10 => 0.7,
        _ => 0.85,
    }
}

/// Adjust confidence by delta, clamped to the valid range.
pub fn adjust_confidence(current: f64, delta: f64) -> f64 {
    (current + delta).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Decay accrued since the last observation: 0.02 per complete week,
/// nothing within the first week.
pub fn calculate_decay(last_observed: DateTime<Utc>, current_time: DateTime<Utc>) -> f64 {
    let days_elapsed = (current_time - last_observed).num_days();
    let weeks_elapsed = days_elapsed / DAYS_PER_WEEK;
    if weeks_elapsed <= 0 {
        return 0.0;
    }
    weeks_elapsed as f64 * DECAY_PER_WEEK
}

/// Apply decay to an instinct, using last_observed when set and
/// updated_at otherwise. Returns the instinct unchanged when no decay
/// has accrued.
pub fn apply_decay(instinct: &Instinct, current_time: DateTime<Utc>) -> Instinct {
    let last_observed = instinct.last_observed.unwrap_or(instinct.updated_at);
    let decay = calculate_decay(last_observed, current_time);
    if decay == 0.0 {
        return instinct.clone();
    }
    instinct.with_confidence(adjust_confidence(instinct.confidence, -decay))
}

/// Status implied by a confidence level.
pub fn dormant_status(confidence: f64) -> InstinctStatus {
    if confidence < DORMANT_THRESHOLD {
        InstinctStatus::Dormant
    } else {
        InstinctStatus::Active
    }
}
