//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use quiz_core::model::{CompletionError, LevelError, LevelId, PlayerError, PlayerId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse error classes reported to callers of the progression engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was malformed; the caller must change it.
    Validation,
    /// A referenced player or level does not exist.
    NotFound,
    /// Concurrent updates kept colliding; retrying is safe.
    Conflict,
    /// Storage was unreachable or too slow; retrying is safe.
    Dependency,
}

/// Failure reaching the persistence layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DependencyError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors emitted by `ProgressionCoordinator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error(transparent)]
    InvalidCompletion(#[from] CompletionError),
    #[error(transparent)]
    InvalidPlayer(#[from] PlayerError),
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("level {0} not found")]
    LevelNotFound(LevelId),
    #[error("player {player_id} was updated concurrently; gave up after {attempts} attempts")]
    Conflict { player_id: PlayerId, attempts: u32 },
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl ProgressionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCompletion(_) | Self::InvalidPlayer(_) => ErrorKind::Validation,
            Self::PlayerNotFound(_) | Self::LevelNotFound(_) => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Dependency(_) => ErrorKind::Dependency,
        }
    }

    /// True when the same request may be sent again unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Dependency)
    }
}

/// Errors emitted by `LeaderboardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LeaderboardError {
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `LevelService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LevelServiceError {
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `LevelStatsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LevelStatsError {
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error(transparent)]
    Analysis(#[from] quiz_core::analysis::AnalysisError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
