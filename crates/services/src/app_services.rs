use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::config::{LeaderboardConfig, ProgressionConfig};
use crate::error::AppServicesError;
use crate::leaderboard_service::LeaderboardService;
use crate::level_service::LevelService;
use crate::level_stats_service::LevelStatsService;
use crate::progression::ProgressionCoordinator;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progression: Arc<ProgressionCoordinator>,
    leaderboard: Arc<LeaderboardService>,
    level_stats: Arc<LevelStatsService>,
    levels: Arc<LevelService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or a
    /// config is invalid.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        progression: ProgressionConfig,
        leaderboard: LeaderboardConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(&storage, clock, progression, leaderboard)
    }

    /// Build services over in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if a config is invalid.
    pub fn in_memory(
        clock: Clock,
        progression: ProgressionConfig,
        leaderboard: LeaderboardConfig,
    ) -> Result<Self, AppServicesError> {
        Self::from_storage(&Storage::in_memory(), clock, progression, leaderboard)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if `progression` is invalid.
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        progression: ProgressionConfig,
        leaderboard: LeaderboardConfig,
    ) -> Result<Self, AppServicesError> {
        progression.validate()?;
        tracing::debug!(
            max_attempts = progression.max_attempts,
            storage_timeout_ms = u64::try_from(progression.storage_timeout.as_millis()).unwrap_or(u64::MAX),
            top_k = leaderboard.top_k,
            "services assembled"
        );

        Ok(Self {
            progression: Arc::new(
                ProgressionCoordinator::from_storage(clock, storage).with_config(progression),
            ),
            leaderboard: Arc::new(LeaderboardService::from_storage(leaderboard, storage)),
            level_stats: Arc::new(LevelStatsService::from_storage(clock, storage)),
            levels: Arc::new(LevelService::new(Arc::clone(&storage.levels))),
        })
    }

    #[must_use]
    pub fn progression(&self) -> Arc<ProgressionCoordinator> {
        Arc::clone(&self.progression)
    }

    #[must_use]
    pub fn leaderboard(&self) -> Arc<LeaderboardService> {
        Arc::clone(&self.leaderboard)
    }

    #[must_use]
    pub fn level_stats(&self) -> Arc<LevelStatsService> {
        Arc::clone(&self.level_stats)
    }

    #[must_use]
    pub fn levels(&self) -> Arc<LevelService> {
        Arc::clone(&self.levels)
    }
}
