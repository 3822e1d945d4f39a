use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CompletionId, LevelId, PlayerId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons a submitted completion is rejected before it touches any state.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CompletionError {
    #[error("player id is required")]
    MissingPlayerId,

    #[error("level id is required")]
    MissingLevelId,

    #[error("score is required")]
    MissingScore,

    #[error("completion time is required")]
    MissingCompletionTime,

    #[error("score must be >= 0, got {0}")]
    NegativeScore(i64),

    #[error("score {0} is out of range")]
    ScoreOutOfRange(i64),

    #[error("completion time must be a finite number of seconds > 0, got {0}")]
    InvalidCompletionTime(f64),
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

/// Untrusted completion payload as handed over by the request layer.
///
/// Every field is optional so a missing value can be told apart from a
/// zero; [`CompletionSubmission::validate`] turns it into a
/// [`ValidCompletion`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionSubmission {
    pub player_id: Option<PlayerId>,
    pub level_id: Option<LevelId>,
    pub score: Option<i64>,
    pub completion_time: Option<f64>,
}

impl CompletionSubmission {
    #[must_use]
    pub fn new(player_id: PlayerId, level_id: LevelId, score: i64, completion_time: f64) -> Self {
        Self {
            player_id: Some(player_id),
            level_id: Some(level_id),
            score: Some(score),
            completion_time: Some(completion_time),
        }
    }

    /// Checks presence and ranges of every field.
    ///
    /// # Errors
    ///
    /// Returns the first `CompletionError` found, checking ids before values.
    pub fn validate(&self) -> Result<ValidCompletion, CompletionError> {
        let player_id = self.player_id.ok_or(CompletionError::MissingPlayerId)?;
        let level_id = self.level_id.ok_or(CompletionError::MissingLevelId)?;
        let raw_score = self.score.ok_or(CompletionError::MissingScore)?;
        let time = self
            .completion_time
            .ok_or(CompletionError::MissingCompletionTime)?;

        if raw_score < 0 {
            return Err(CompletionError::NegativeScore(raw_score));
        }
        let score =
            u32::try_from(raw_score).map_err(|_| CompletionError::ScoreOutOfRange(raw_score))?;

        if !time.is_finite() || time <= 0.0 {
            return Err(CompletionError::InvalidCompletionTime(time));
        }

        Ok(ValidCompletion {
            player_id,
            level_id,
            score,
            completion_time: time,
        })
    }
}

/// A completion whose fields passed validation. Only constructible through
/// [`CompletionSubmission::validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidCompletion {
    player_id: PlayerId,
    level_id: LevelId,
    score: u32,
    completion_time: f64,
}

impl ValidCompletion {
    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    #[must_use]
    pub fn level_id(&self) -> LevelId {
        self.level_id
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Seconds, finite and > 0.
    #[must_use]
    pub fn completion_time(&self) -> f64 {
        self.completion_time
    }
}

//
// ─── LEVEL COMPLETION ──────────────────────────────────────────────────────────
//

/// One immutable record of a player finishing one level attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCompletion {
    id: CompletionId,
    player_id: PlayerId,
    level_id: LevelId,
    completion_time: f64,
    score: u32,
    completed_at: DateTime<Utc>,
}

impl LevelCompletion {
    /// Rehydrate a completion from storage.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::InvalidCompletionTime` if the stored time is
    /// not a positive finite number.
    pub fn from_persisted(
        id: CompletionId,
        player_id: PlayerId,
        level_id: LevelId,
        completion_time: f64,
        score: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, CompletionError> {
        if !completion_time.is_finite() || completion_time <= 0.0 {
            return Err(CompletionError::InvalidCompletionTime(completion_time));
        }
        Ok(Self {
            id,
            player_id,
            level_id,
            completion_time,
            score,
            completed_at,
        })
    }

    /// Materialize a validated submission once storage has assigned its id.
    #[must_use]
    pub fn from_valid(id: CompletionId, valid: &ValidCompletion, completed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            player_id: valid.player_id,
            level_id: valid.level_id,
            completion_time: valid.completion_time,
            score: valid.score,
            completed_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> CompletionId {
        self.id
    }

    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    #[must_use]
    pub fn level_id(&self) -> LevelId {
        self.level_id
    }

    #[must_use]
    pub fn completion_time(&self) -> f64 {
        self.completion_time
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}
