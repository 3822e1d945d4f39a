use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use quiz_core::{
    Clock,
    analysis::{self, AttemptEntry, LevelStats, Timeframe},
    model::{Level, LevelCompletion, LevelId, PlayerId},
};
use storage::repository::{CompletionRepository, LevelRepository, PlayerRepository, Storage};

use crate::error::LevelStatsError;

/// One level's summary together with its attempt history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDetail {
    /// `None` when the level is missing from the catalogue.
    pub level: Option<Level>,
    pub stats: LevelStats,
    /// Most recent attempt first.
    pub history: Vec<AttemptEntry>,
}

/// One entry of a cross-level overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub level_id: LevelId,
    pub level_title: Option<String>,
    pub level_number: Option<u32>,
    pub stats: LevelStats,
}

/// Per-level performance reports for a single player.
#[derive(Clone)]
pub struct LevelStatsService {
    clock: Clock,
    players: Arc<dyn PlayerRepository>,
    levels: Arc<dyn LevelRepository>,
    completions: Arc<dyn CompletionRepository>,
}

impl LevelStatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        players: Arc<dyn PlayerRepository>,
        levels: Arc<dyn LevelRepository>,
        completions: Arc<dyn CompletionRepository>,
    ) -> Self {
        Self {
            clock,
            players,
            levels,
            completions,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.players),
            Arc::clone(&storage.levels),
            Arc::clone(&storage.completions),
        )
    }

    /// Summary and attempt history for one level within `timeframe`.
    ///
    /// Returns `Ok(None)` when the player has no completions there.
    ///
    /// # Errors
    ///
    /// Returns `LevelStatsError::PlayerNotFound` for an unknown player and
    /// `LevelStatsError::Storage` if repository access fails.
    pub async fn level_stats(
        &self,
        player_id: PlayerId,
        level_id: LevelId,
        timeframe: Timeframe,
    ) -> Result<Option<LevelDetail>, LevelStatsError> {
        let completions = self
            .windowed(player_id, Some(level_id), timeframe)
            .await?;
        if completions.is_empty() {
            return Ok(None);
        }

        let stats = analysis::summarize(level_id, &completions)?;
        let history = analysis::attempt_history(&completions);
        let level = self.levels.get_level(level_id).await?;
        Ok(Some(LevelDetail {
            level,
            stats,
            history,
        }))
    }

    /// Summaries for every level the player completed within `timeframe`,
    /// ordered by level id.
    ///
    /// # Errors
    ///
    /// Returns `LevelStatsError::PlayerNotFound` for an unknown player and
    /// `LevelStatsError::Storage` if repository access fails.
    pub async fn all_levels(
        &self,
        player_id: PlayerId,
        timeframe: Timeframe,
    ) -> Result<Vec<LevelSummary>, LevelStatsError> {
        let completions = self.windowed(player_id, None, timeframe).await?;
        let by_level = analysis::summarize_by_level(&completions)?;

        let catalogue: HashMap<LevelId, Level> = self
            .levels
            .list_levels()
            .await?
            .into_iter()
            .map(|l| (l.id(), l))
            .collect();

        Ok(by_level
            .into_iter()
            .map(|(level_id, stats)| {
                let level = catalogue.get(&level_id);
                LevelSummary {
                    level_id,
                    level_title: level.map(|l| l.title().to_owned()),
                    level_number: level.map(Level::number),
                    stats,
                }
            })
            .collect())
    }

    async fn windowed(
        &self,
        player_id: PlayerId,
        level_id: Option<LevelId>,
        timeframe: Timeframe,
    ) -> Result<Vec<LevelCompletion>, LevelStatsError> {
        if self.players.get_player(player_id).await?.is_none() {
            return Err(LevelStatsError::PlayerNotFound(player_id));
        }
        let all = self.completions.list_completions(player_id, level_id).await?;
        let kept = analysis::filter_timeframe(all, timeframe, self.clock.now());
        tracing::debug!(
            player_id = %player_id,
            timeframe = %timeframe,
            completions = kept.len(),
            "level history loaded"
        );
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::ProgressionCoordinator;
    use chrono::Duration;
    use quiz_core::model::CompletionSubmission;
    use quiz_core::time::fixed_clock;

    async fn record(storage: &Storage, clock: Clock, level: u64, score: i64, time: f64) {
        ProgressionCoordinator::from_storage(clock, storage)
            .record_completion(&CompletionSubmission::new(
                PlayerId::new(1),
                LevelId::new(level),
                score,
                time,
            ))
            .await
            .unwrap();
    }

    async fn seeded() -> Storage {
        let storage = Storage::in_memory();
        for n in 1..=2_u32 {
            let level = Level::new(LevelId::new(u64::from(n)), format!("Level {n}"), n).unwrap();
            storage.levels.upsert_level(&level).await.unwrap();
        }
        ProgressionCoordinator::from_storage(fixed_clock(), &storage)
            .ensure_player(PlayerId::new(1), "Ada")
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn level_stats_reports_improvement_and_history() {
        let storage = seeded().await;
        let start = fixed_clock();
        record(&storage, start, 1, 10, 60.0).await;
        record(&storage, start.advanced(Duration::days(1)), 1, 20, 50.0).await;
        record(&storage, start.advanced(Duration::days(2)), 1, 30, 40.0).await;

        let service = LevelStatsService::from_storage(start.advanced(Duration::days(2)), &storage);
        let detail = service
            .level_stats(PlayerId::new(1), LevelId::new(1), Timeframe::All)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(detail.level.as_ref().map(Level::title), Some("Level 1"));
        assert_eq!(detail.stats.total_attempts, 3);
        assert_eq!(detail.stats.time_improvement, 20.0);
        assert_eq!(detail.stats.score_improvement, 20);
        assert_eq!(detail.history[0].attempt_number, 3);
        assert_eq!(detail.history[0].time_delta, Some(10.0));
        assert_eq!(detail.history[2].time_delta, None);
    }

    #[tokio::test]
    async fn timeframe_drops_old_attempts() {
        let storage = seeded().await;
        let start = fixed_clock();
        record(&storage, start, 1, 10, 60.0).await;
        record(&storage, start.advanced(Duration::days(20)), 1, 30, 40.0).await;

        let service =
            LevelStatsService::from_storage(start.advanced(Duration::days(21)), &storage);
        let week = service
            .level_stats(PlayerId::new(1), LevelId::new(1), Timeframe::Week)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(week.stats.total_attempts, 1);
        assert_eq!(week.stats.time_improvement, 0.0);

        let month = service
            .level_stats(PlayerId::new(1), LevelId::new(1), Timeframe::Month)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(month.stats.total_attempts, 2);
    }

    #[tokio::test]
    async fn missing_history_is_none_and_unknown_player_errors() {
        let storage = seeded().await;
        let service = LevelStatsService::from_storage(fixed_clock(), &storage);

        let none = service
            .level_stats(PlayerId::new(1), LevelId::new(2), Timeframe::All)
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(
            service
                .all_levels(PlayerId::new(1), Timeframe::All)
                .await
                .unwrap()
                .is_empty()
        );

        let err = service
            .all_levels(PlayerId::new(7), Timeframe::All)
            .await
            .unwrap_err();
        assert!(matches!(err, LevelStatsError::PlayerNotFound(_)));
    }

    #[tokio::test]
    async fn all_levels_partitions_and_labels() {
        let storage = seeded().await;
        record(&storage, fixed_clock(), 2, 5, 30.0).await;
        record(&storage, fixed_clock(), 1, 10, 12.0).await;
        record(&storage, fixed_clock(), 2, 15, 20.0).await;

        let service = LevelStatsService::from_storage(fixed_clock(), &storage);
        let summaries = service
            .all_levels(PlayerId::new(1), Timeframe::All)
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].level_id, LevelId::new(1));
        assert_eq!(summaries[1].level_title.as_deref(), Some("Level 2"));
        assert_eq!(summaries[1].level_number, Some(2));
        assert_eq!(summaries[1].stats.best_time, 20.0);
        assert_eq!(summaries[1].stats.best_score, 15);
    }
}
