use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::completion::ValidCompletion;
use crate::model::ids::{LevelId, PlayerId};
use crate::stats::{self, Observation};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("player name cannot be empty")]
    EmptyName,

    #[error("completion belongs to player {found}, not {expected}")]
    PlayerMismatch { expected: PlayerId, found: PlayerId },

    #[error("point total overflow")]
    PointsOverflow,

    #[error("invalid persisted player state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Running completion-time statistics kept on the player row.
///
/// `average_time` and `best_time` are `None` exactly when `total_quizzes`
/// is zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlayerAggregate {
    pub total_quizzes: u32,
    pub average_time: Option<f64>,
    pub best_time: Option<f64>,
}

impl PlayerAggregate {
    /// Checks the shape invariants of a stored aggregate.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::InvalidPersistedState` when the averages disagree
    /// with the count or hold non-positive or non-finite values.
    pub fn check(&self) -> Result<(), PlayerError> {
        let invalid = |msg: &str| Err(PlayerError::InvalidPersistedState(msg.to_owned()));
        match (self.total_quizzes, self.average_time, self.best_time) {
            (0, None, None) => Ok(()),
            (0, _, _) => invalid("aggregate times set without completions"),
            (_, Some(avg), Some(best)) => {
                if !avg.is_finite() || avg <= 0.0 {
                    return invalid("average time must be finite and > 0");
                }
                if !best.is_finite() || best <= 0.0 {
                    return invalid("best time must be finite and > 0");
                }
                Ok(())
            }
            _ => invalid("missing aggregate times for recorded completions"),
        }
    }
}

//
// ─── PLAYER ────────────────────────────────────────────────────────────────────
//

/// A player and their cumulative progression state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    id: PlayerId,
    name: String,
    points: u64,
    current_level: Option<LevelId>,
    #[serde(flatten)]
    aggregate: PlayerAggregate,
    streak: u32,
    last_activity: DateTime<Utc>,
}

impl Player {
    /// Creates a player with no progress.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::EmptyName` if the trimmed name is empty.
    pub fn new(id: PlayerId, name: impl Into<String>, now: DateTime<Utc>) -> Result<Self, PlayerError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(PlayerError::EmptyName);
        }
        Ok(Self {
            id,
            name,
            points: 0,
            current_level: None,
            aggregate: PlayerAggregate::default(),
            streak: 0,
            last_activity: now,
        })
    }

    /// Rehydrate a player from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError` if the name is blank or the aggregate is
    /// internally inconsistent.
    pub fn from_persisted(
        id: PlayerId,
        name: String,
        points: u64,
        current_level: Option<LevelId>,
        aggregate: PlayerAggregate,
        streak: u32,
        last_activity: DateTime<Utc>,
    ) -> Result<Self, PlayerError> {
        let mut player = Self::new(id, name, last_activity)?;
        aggregate.check()?;
        player.points = points;
        player.current_level = current_level;
        player.aggregate = aggregate;
        player.streak = streak;
        Ok(player)
    }

    /// Folds one validated completion into this player's state.
    ///
    /// Either every field is updated or, on error, none is.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::PlayerMismatch` if the completion is for another
    /// player and `PlayerError::PointsOverflow` if the point total would wrap.
    pub fn apply_completion(
        &mut self,
        completion: &ValidCompletion,
        completed_at: DateTime<Utc>,
    ) -> Result<(), PlayerError> {
        if completion.player_id() != self.id {
            return Err(PlayerError::PlayerMismatch {
                expected: self.id,
                found: completion.player_id(),
            });
        }

        let points = self
            .points
            .checked_add(u64::from(completion.score()))
            .ok_or(PlayerError::PointsOverflow)?;
        let aggregate = stats::update(
            &self.aggregate,
            Observation {
                time: completion.completion_time(),
                score: completion.score(),
            },
        );

        self.points = points;
        self.aggregate = aggregate;
        self.current_level = self.current_level.max(Some(completion.level_id()));
        self.last_activity = completed_at;
        Ok(())
    }

    /// Overwrites the time aggregate, used when repairing drift found by a
    /// full-history audit.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::InvalidPersistedState` if the aggregate is malformed.
    pub fn replace_aggregate(&mut self, aggregate: PlayerAggregate) -> Result<(), PlayerError> {
        aggregate.check()?;
        self.aggregate = aggregate;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn points(&self) -> u64 {
        self.points
    }

    #[must_use]
    pub fn current_level(&self) -> Option<LevelId> {
        self.current_level
    }

    #[must_use]
    pub fn aggregate(&self) -> &PlayerAggregate {
        &self.aggregate
    }

    #[must_use]
    pub fn total_quizzes(&self) -> u32 {
        self.aggregate.total_quizzes
    }

    #[must_use]
    pub fn average_time(&self) -> Option<f64> {
        self.aggregate.average_time
    }

    #[must_use]
    pub fn best_time(&self) -> Option<f64> {
        self.aggregate.best_time
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}
