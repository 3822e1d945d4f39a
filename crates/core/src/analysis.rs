//! Per-level performance analytics computed from raw completion history.
//!
//! Everything here works on a snapshot slice and never touches storage.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{LevelCompletion, LevelId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisError {
    #[error("no completions recorded for level {0}")]
    NoCompletions(LevelId),

    #[error("completion for level {found} passed to summary of level {expected}")]
    MixedLevels { expected: LevelId, found: LevelId },

    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
}

//
// ─── LEVEL STATS ───────────────────────────────────────────────────────────────
//

/// Summary of every attempt a player made at one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelStats {
    pub level_id: LevelId,
    pub total_attempts: usize,
    pub best_time: f64,
    pub average_time: f64,
    pub best_score: u32,
    pub average_score: f64,
    /// `first.time - latest.time`; positive means faster.
    pub time_improvement: f64,
    /// `latest.score - first.score`; positive means better.
    pub score_improvement: i64,
    pub first_attempt: LevelCompletion,
    pub latest_attempt: LevelCompletion,
}

fn chronological(a: &LevelCompletion, b: &LevelCompletion) -> std::cmp::Ordering {
    a.completed_at()
        .cmp(&b.completed_at())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Summarizes the completions of a single level.
///
/// Input order does not matter; first and latest attempts are picked by
/// completion timestamp, falling back to completion id on equal timestamps.
///
/// # Errors
///
/// Returns `AnalysisError::NoCompletions` for an empty slice and
/// `AnalysisError::MixedLevels` if any completion belongs to another level.
pub fn summarize(
    level_id: LevelId,
    completions: &[LevelCompletion],
) -> Result<LevelStats, AnalysisError> {
    if let Some(stray) = completions.iter().find(|c| c.level_id() != level_id) {
        return Err(AnalysisError::MixedLevels {
            expected: level_id,
            found: stray.level_id(),
        });
    }

    let mut ordered: Vec<&LevelCompletion> = completions.iter().collect();
    ordered.sort_by(|a, b| chronological(a, b));

    let (Some(first), Some(latest)) = (ordered.first(), ordered.last()) else {
        return Err(AnalysisError::NoCompletions(level_id));
    };

    let total_attempts = ordered.len();
    #[allow(clippy::cast_precision_loss)]
    let count = total_attempts as f64;

    let mut best_time = f64::INFINITY;
    let mut time_sum = 0.0;
    let mut best_score = 0_u32;
    let mut score_sum = 0.0;
    for c in &ordered {
        best_time = best_time.min(c.completion_time());
        time_sum += c.completion_time();
        best_score = best_score.max(c.score());
        score_sum += f64::from(c.score());
    }

    Ok(LevelStats {
        level_id,
        total_attempts,
        best_time,
        average_time: time_sum / count,
        best_score,
        average_score: score_sum / count,
        time_improvement: first.completion_time() - latest.completion_time(),
        score_improvement: i64::from(latest.score()) - i64::from(first.score()),
        first_attempt: (*first).clone(),
        latest_attempt: (*latest).clone(),
    })
}

/// Partitions completions by level and summarizes each partition.
///
/// # Errors
///
/// Partitions are never empty, so this only fails if [`summarize`] does.
pub fn summarize_by_level(
    completions: &[LevelCompletion],
) -> Result<BTreeMap<LevelId, LevelStats>, AnalysisError> {
    let mut groups: BTreeMap<LevelId, Vec<LevelCompletion>> = BTreeMap::new();
    for c in completions {
        groups.entry(c.level_id()).or_default().push(c.clone());
    }

    groups
        .into_iter()
        .map(|(level_id, group)| summarize(level_id, &group).map(|stats| (level_id, stats)))
        .collect()
}

//
// ─── ATTEMPT HISTORY ───────────────────────────────────────────────────────────
//

/// One row of a level's attempt history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptEntry {
    /// 1 for the chronologically first attempt.
    pub attempt_number: usize,
    pub completion: LevelCompletion,
    /// `previous.time - this.time` against the attempt before it; positive
    /// means faster. `None` for the first attempt.
    pub time_delta: Option<f64>,
}

/// Lists attempts most recent first, each compared with the attempt that
/// preceded it.
#[must_use]
pub fn attempt_history(completions: &[LevelCompletion]) -> Vec<AttemptEntry> {
    let mut ordered: Vec<&LevelCompletion> = completions.iter().collect();
    ordered.sort_by(|a, b| chronological(a, b));

    let mut entries: Vec<AttemptEntry> = Vec::with_capacity(ordered.len());
    let mut previous: Option<f64> = None;
    for (idx, c) in ordered.into_iter().enumerate() {
        entries.push(AttemptEntry {
            attempt_number: idx + 1,
            completion: c.clone(),
            time_delta: previous.map(|p| p - c.completion_time()),
        });
        previous = Some(c.completion_time());
    }
    entries.reverse();
    entries
}

//
// ─── TIMEFRAME ─────────────────────────────────────────────────────────────────
//

/// Look-back window applied to completion history before summarizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    All,
    Week,
    Month,
    Year,
}

impl Timeframe {
    /// Earliest timestamp still inside the window, `None` for `All`.
    #[must_use]
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::All => None,
            Timeframe::Week => Some(now - Duration::days(7)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::Year => Some(now - Duration::days(365)),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::All => "all",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Timeframe::All),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "year" => Ok(Timeframe::Year),
            other => Err(AnalysisError::UnknownTimeframe(other.to_owned())),
        }
    }
}

/// Drops completions older than the timeframe window.
#[must_use]
pub fn filter_timeframe(
    completions: Vec<LevelCompletion>,
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> Vec<LevelCompletion> {
    match timeframe.window_start(now) {
        None => completions,
        Some(start) => completions
            .into_iter()
            .filter(|c| c.completed_at() >= start)
            .collect(),
    }
}
