use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use quiz_core::{
    Clock,
    model::{CompletionSubmission, LevelCompletion, LevelId, Player, PlayerAggregate, PlayerId},
    stats,
};
use storage::repository::{
    CompletionRepository, LevelRepository, NewCompletionRecord, PlayerRepository,
    ProgressPersistence, Storage, StorageError,
};

use crate::config::ProgressionConfig;
use crate::error::{DependencyError, ProgressionError};

/// Stored and recomputed aggregates may differ by this much before an audit
/// reports drift.
pub const AUDIT_TOLERANCE: f64 = 1e-9;

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// How a new completion compares with the player's earlier attempts at the
/// same level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionAnnotation {
    /// Best time at this level before the new completion; `None` on a first
    /// attempt.
    pub previous_best_at_level: Option<f64>,
    /// `previous_best - time`; positive means faster.
    pub improvement: Option<f64>,
    pub is_new_level_best: bool,
}

impl CompletionAnnotation {
    fn against(previous_best_at_level: Option<f64>, time: f64) -> Self {
        Self {
            previous_best_at_level,
            improvement: previous_best_at_level.map(|best| best - time),
            is_new_level_best: previous_best_at_level.is_none_or(|best| time < best),
        }
    }
}

/// Result of a recorded completion: the updated player, the stored row, and
/// its annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCompletion {
    pub player: Player,
    pub completion: LevelCompletion,
    pub annotation: CompletionAnnotation,
}

/// Stored aggregate next to one rebuilt from the full completion history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AuditReport {
    pub player_id: PlayerId,
    pub stored: PlayerAggregate,
    pub recomputed: PlayerAggregate,
    pub completions: usize,
    pub consistent: bool,
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

/// Single write path for player progression.
///
/// Each completion is folded into the player with an optimistic
/// compare-and-swap on `total_quizzes`; losers of a race re-read and retry
/// up to `ProgressionConfig::max_attempts` times.
#[derive(Clone)]
pub struct ProgressionCoordinator {
    clock: Clock,
    config: ProgressionConfig,
    players: Arc<dyn PlayerRepository>,
    levels: Arc<dyn LevelRepository>,
    completions: Arc<dyn CompletionRepository>,
    progress: Arc<dyn ProgressPersistence>,
}

impl ProgressionCoordinator {
    #[must_use]
    pub fn new(
        clock: Clock,
        players: Arc<dyn PlayerRepository>,
        levels: Arc<dyn LevelRepository>,
        completions: Arc<dyn CompletionRepository>,
        progress: Arc<dyn ProgressPersistence>,
    ) -> Self {
        Self {
            clock,
            config: ProgressionConfig::default(),
            players,
            levels,
            completions,
            progress,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.players),
            Arc::clone(&storage.levels),
            Arc::clone(&storage.completions),
            Arc::clone(&storage.progress),
        )
    }

    #[must_use]
    pub fn with_config(mut self, config: ProgressionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// Runs one storage call under the configured timeout.
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<Result<T, StorageError>, DependencyError> {
        tokio::time::timeout(self.config.storage_timeout, fut)
            .await
            .map_err(|_| DependencyError::Timeout(self.config.storage_timeout))
    }

    async fn load_player(&self, id: PlayerId) -> Result<Player, ProgressionError> {
        self.call(self.players.get_player(id))
            .await?
            .map_err(dependency)?
            .ok_or(ProgressionError::PlayerNotFound(id))
    }

    /// Returns the player, creating an empty one named `name` on first sight.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::InvalidPlayer` for a blank name and
    /// `ProgressionError::Dependency` when storage fails.
    pub async fn ensure_player(
        &self,
        id: PlayerId,
        name: &str,
    ) -> Result<Player, ProgressionError> {
        if let Some(existing) = self.call(self.players.get_player(id)).await?.map_err(dependency)? {
            return Ok(existing);
        }

        let player = Player::new(id, name, self.clock.now())?;
        match self.call(self.players.insert_player(&player)).await? {
            Ok(()) => {
                tracing::info!(player_id = %id, "player registered");
                Ok(player)
            }
            // Another caller registered the same id first.
            Err(StorageError::Conflict) => self.load_player(id).await,
            Err(e) => Err(dependency(e)),
        }
    }

    /// Validates and records one level completion.
    ///
    /// The completion row and the player's points, level, and time aggregate
    /// are written as one unit. Nothing is written on error.
    ///
    /// # Errors
    ///
    /// - `InvalidCompletion` for malformed input
    /// - `PlayerNotFound` / `LevelNotFound` for unknown ids
    /// - `Conflict` when every attempt lost a concurrent update
    /// - `Dependency` when storage fails or times out
    pub async fn record_completion(
        &self,
        submission: &CompletionSubmission,
    ) -> Result<RecordedCompletion, ProgressionError> {
        let valid = submission.validate()?;
        let player_id = valid.player_id();
        let level_id = valid.level_id();

        self.ensure_level(level_id).await?;

        for attempt in 1..=self.config.max_attempts {
            let current = self.load_player(player_id).await?;
            let history = self
                .call(self.completions.list_completions(player_id, Some(level_id)))
                .await?
                .map_err(dependency)?;
            let previous_best = history
                .iter()
                .map(LevelCompletion::completion_time)
                .reduce(f64::min);

            let completed_at = self.clock.now();
            let expected_total = current.total_quizzes();
            let mut updated = current;
            updated.apply_completion(&valid, completed_at)?;

            let record = NewCompletionRecord::from_valid(&valid, completed_at);
            match self
                .call(self.progress.apply_completion(expected_total, &updated, record))
                .await?
            {
                Ok(completion) => {
                    let annotation =
                        CompletionAnnotation::against(previous_best, completion.completion_time());
                    tracing::info!(
                        player_id = %player_id,
                        level_id = %level_id,
                        completion_id = %completion.id(),
                        time = completion.completion_time(),
                        score = completion.score(),
                        total_quizzes = updated.total_quizzes(),
                        attempt,
                        "completion recorded"
                    );
                    return Ok(RecordedCompletion {
                        player: updated,
                        completion,
                        annotation,
                    });
                }
                Err(StorageError::Conflict) => {
                    tracing::warn!(
                        player_id = %player_id,
                        expected_total,
                        attempt,
                        "concurrent progression update, retrying"
                    );
                    self.back_off(attempt).await;
                }
                Err(StorageError::NotFound) => return Err(self.missing(player_id, level_id).await),
                Err(e) => return Err(dependency(e)),
            }
        }

        Err(ProgressionError::Conflict {
            player_id,
            attempts: self.config.max_attempts,
        })
    }

    /// Rebuilds the player's time aggregate from every stored completion and
    /// compares it with the stored one.
    ///
    /// The two reads are not one snapshot; a completion recorded in between
    /// shows up as drift.
    ///
    /// # Errors
    ///
    /// Returns `PlayerNotFound` or `Dependency`.
    pub async fn audit_player(&self, player_id: PlayerId) -> Result<AuditReport, ProgressionError> {
        let player = self.load_player(player_id).await?;
        self.audit_loaded(&player).await
    }

    /// Overwrites a drifted aggregate with the recomputed one. Points and
    /// current level are left alone.
    ///
    /// Returns the report observed before any write; `consistent == false`
    /// means the aggregate was rewritten.
    ///
    /// # Errors
    ///
    /// Returns `PlayerNotFound`, `Conflict` after exhausting retries, or
    /// `Dependency`.
    pub async fn repair_player(&self, player_id: PlayerId) -> Result<AuditReport, ProgressionError> {
        for attempt in 1..=self.config.max_attempts {
            let mut player = self.load_player(player_id).await?;
            let report = self.audit_loaded(&player).await?;
            if report.consistent {
                return Ok(report);
            }

            let expected_total = player.total_quizzes();
            player.replace_aggregate(report.recomputed)?;
            match self
                .call(self.progress.write_player_aggregate(expected_total, &player))
                .await?
            {
                Ok(()) => {
                    tracing::warn!(
                        player_id = %player_id,
                        stored_total = report.stored.total_quizzes,
                        recomputed_total = report.recomputed.total_quizzes,
                        "player aggregate repaired"
                    );
                    return Ok(report);
                }
                Err(StorageError::Conflict) => {
                    tracing::warn!(player_id = %player_id, attempt, "repair raced a completion, retrying");
                    self.back_off(attempt).await;
                }
                Err(StorageError::NotFound) => {
                    return Err(ProgressionError::PlayerNotFound(player_id));
                }
                Err(e) => return Err(dependency(e)),
            }
        }

        Err(ProgressionError::Conflict {
            player_id,
            attempts: self.config.max_attempts,
        })
    }

    async fn audit_loaded(&self, player: &Player) -> Result<AuditReport, ProgressionError> {
        let completions = self
            .call(self.completions.list_completions(player.id(), None))
            .await?
            .map_err(dependency)?;
        let recomputed = stats::recompute(completions.iter().map(LevelCompletion::completion_time));
        let stored = *player.aggregate();
        let consistent = stats::approx_eq(&stored, &recomputed, AUDIT_TOLERANCE);
        tracing::debug!(player_id = %player.id(), consistent, "player aggregate audited");
        Ok(AuditReport {
            player_id: player.id(),
            stored,
            recomputed,
            completions: completions.len(),
            consistent,
        })
    }

    async fn ensure_level(&self, level_id: LevelId) -> Result<(), ProgressionError> {
        match self.call(self.levels.get_level(level_id)).await?.map_err(dependency)? {
            Some(_) => Ok(()),
            None => Err(ProgressionError::LevelNotFound(level_id)),
        }
    }

    /// Storage reports a missing player and a missing level the same way.
    async fn missing(&self, player_id: PlayerId, level_id: LevelId) -> ProgressionError {
        match self.load_player(player_id).await {
            Ok(_) => ProgressionError::LevelNotFound(level_id),
            Err(e) => e,
        }
    }

    async fn back_off(&self, attempt: u32) {
        if attempt < self.config.max_attempts && !self.config.retry_backoff.is_zero() {
            tokio::time::sleep(self.config.retry_backoff * attempt).await;
        }
    }
}

fn dependency(e: StorageError) -> ProgressionError {
    DependencyError::Storage(e).into()
}
