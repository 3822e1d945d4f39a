use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::analysis::Timeframe;
use quiz_core::model::{CompletionSubmission, LevelCompletion, LevelId, Player, PlayerId};
use quiz_core::time::fixed_clock;
use services::{
    AppServices, ErrorKind, LeaderboardConfig, ProgressionConfig, ProgressionCoordinator,
    ProgressionError,
};
use storage::repository::{
    NewCompletionRecord, PlayerFilter, PlayerRepository, ProgressPersistence, Storage,
    StorageError,
};

fn submission(player: u64, level: u64, score: i64, time: f64) -> CompletionSubmission {
    CompletionSubmission::new(PlayerId::new(player), LevelId::new(level), score, time)
}

async fn seed_levels(services: &AppServices, count: u32) {
    for n in 1..=count {
        services
            .levels()
            .save_level(LevelId::new(u64::from(n)), format!("Level {n}"), n)
            .await
            .unwrap();
    }
}

fn fast_retries(max_attempts: u32) -> ProgressionConfig {
    ProgressionConfig {
        max_attempts,
        storage_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(1),
    }
}

/// Fails the first `remaining` writes with a conflict, then delegates.
struct ContendedProgress {
    inner: Arc<dyn ProgressPersistence>,
    remaining: AtomicU32,
    calls: AtomicU32,
}

impl ContendedProgress {
    fn new(inner: Arc<dyn ProgressPersistence>, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            calls: AtomicU32::new(0),
        }
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProgressPersistence for ContendedProgress {
    async fn apply_completion(
        &self,
        expected_total: u32,
        player: &Player,
        completion: NewCompletionRecord,
    ) -> Result<LevelCompletion, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.take_conflict() {
            return Err(StorageError::Conflict);
        }
        self.inner
            .apply_completion(expected_total, player, completion)
            .await
    }

    async fn write_player_aggregate(
        &self,
        expected_total: u32,
        player: &Player,
    ) -> Result<(), StorageError> {
        self.inner.write_player_aggregate(expected_total, player).await
    }
}

/// Player reads that never finish in time.
struct StalledPlayers;

#[async_trait]
impl PlayerRepository for StalledPlayers {
    async fn insert_player(&self, _player: &Player) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_player(&self, _id: PlayerId) -> Result<Option<Player>, StorageError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn list_players(&self, _filter: PlayerFilter) -> Result<Vec<Player>, StorageError> {
        Ok(Vec::new())
    }
}

async fn contended(conflicts: u32, max_attempts: u32) -> (Storage, Arc<ContendedProgress>, ProgressionCoordinator) {
    let storage = Storage::in_memory();
    let services = AppServices::from_storage(
        &storage,
        fixed_clock(),
        fast_retries(max_attempts),
        LeaderboardConfig::default(),
    )
    .unwrap();
    seed_levels(&services, 1).await;
    services
        .progression()
        .ensure_player(PlayerId::new(1), "Ada")
        .await
        .unwrap();

    let progress = Arc::new(ContendedProgress::new(Arc::clone(&storage.progress), conflicts));
    let coordinator = ProgressionCoordinator::new(
        fixed_clock(),
        Arc::clone(&storage.players),
        Arc::clone(&storage.levels),
        Arc::clone(&storage.completions),
        Arc::clone(&progress) as Arc<dyn ProgressPersistence>,
    )
    .with_config(fast_retries(max_attempts));
    (storage, progress, coordinator)
}

#[tokio::test]
async fn sqlite_flow_records_ranks_and_reports() {
    let services = AppServices::new_sqlite(
        "sqlite:file:progression_flow?mode=memory&cache=shared",
        fixed_clock(),
        ProgressionConfig::default(),
        LeaderboardConfig::default(),
    )
    .await
    .unwrap();
    seed_levels(&services, 3).await;

    let progression = services.progression();
    for (id, name) in [(1, "Ada"), (2, "Grace"), (3, "Linus"), (4, "Idle")] {
        progression
            .ensure_player(PlayerId::new(id), name)
            .await
            .unwrap();
    }

    progression.record_completion(&submission(1, 3, 100, 30.0)).await.unwrap();
    progression.record_completion(&submission(2, 3, 150, 40.0)).await.unwrap();
    progression.record_completion(&submission(3, 2, 500, 10.0)).await.unwrap();
    progression.record_completion(&submission(1, 1, 10, 60.0)).await.unwrap();
    let latest = progression
        .record_completion(&submission(1, 1, 30, 40.0))
        .await
        .unwrap();

    assert_eq!(latest.annotation.previous_best_at_level, Some(60.0));
    assert_eq!(latest.annotation.improvement, Some(20.0));
    assert_eq!(latest.player.points(), 140);
    assert_eq!(latest.player.current_level(), Some(LevelId::new(3)));

    let board = services
        .leaderboard()
        .leaderboard(Some(PlayerId::new(4)))
        .await
        .unwrap();
    let ids: Vec<u64> = board.rows.iter().map(|r| r.player_id.value()).collect();
    assert_eq!(ids, [2, 1, 3, 4]);
    assert_eq!(board.eligible_players, 3);
    assert!(board.rows[3].is_current);
    assert_eq!(board.rows[3].rank, 4);

    let detail = services
        .level_stats()
        .level_stats(PlayerId::new(1), LevelId::new(1), Timeframe::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.stats.time_improvement, 20.0);
    assert_eq!(detail.stats.score_improvement, 20);

    let report = progression.audit_player(PlayerId::new(1)).await.unwrap();
    assert!(report.consistent);
    assert_eq!(report.completions, 3);

    let json = serde_json::to_value(&board).unwrap();
    assert_eq!(json["rows"][0]["name"], "Grace");
}

#[tokio::test]
async fn per_player_invariants_hold_over_a_session() {
    let services = AppServices::in_memory(
        fixed_clock(),
        ProgressionConfig::default(),
        LeaderboardConfig::default(),
    )
    .unwrap();
    seed_levels(&services, 4).await;
    let progression = services.progression();
    progression.ensure_player(PlayerId::new(1), "Ada").await.unwrap();

    let plays = [(2, 10, 50.0), (1, 5, 65.0), (4, 20, 31.5), (3, 0, 44.0), (2, 7, 29.0)];
    let mut running_min = f64::INFINITY;
    let mut sum_time = 0.0;
    let mut sum_score = 0_u64;
    let mut last_level = None;

    for (n, (level, score, time)) in plays.into_iter().enumerate() {
        let recorded = progression
            .record_completion(&submission(1, level, score, time))
            .await
            .unwrap();
        running_min = running_min.min(time);
        sum_time += time;
        sum_score += u64::try_from(score).unwrap();

        let player = recorded.player;
        let count = u32::try_from(n + 1).unwrap();
        assert_eq!(player.total_quizzes(), count);
        assert_eq!(player.best_time(), Some(running_min));
        assert!((player.average_time().unwrap() - sum_time / f64::from(count)).abs() < 1e-9);
        assert_eq!(player.points(), sum_score);
        assert!(player.current_level() >= last_level);
        last_level = player.current_level();
    }
    assert_eq!(last_level, Some(LevelId::new(4)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_writers_lose_no_update() {
    let services = AppServices::in_memory(
        fixed_clock(),
        fast_retries(16),
        LeaderboardConfig::default(),
    )
    .unwrap();
    seed_levels(&services, 1).await;
    services
        .progression()
        .ensure_player(PlayerId::new(1), "Ada")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 1..=8_u32 {
        let progression = services.progression();
        handles.push(tokio::spawn(async move {
            progression
                .record_completion(&submission(1, 1, 1, f64::from(i) * 10.0))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = services
        .progression()
        .audit_player(PlayerId::new(1))
        .await
        .unwrap();
    assert!(report.consistent);
    assert_eq!(report.stored.total_quizzes, 8);
    assert_eq!(report.stored.best_time, Some(10.0));
    assert!((report.stored.average_time.unwrap() - 45.0).abs() < 1e-9);
}

#[tokio::test]
async fn conflicts_below_the_limit_are_retried() {
    let (storage, progress, coordinator) = contended(2, 3).await;
    let recorded = coordinator
        .record_completion(&submission(1, 1, 10, 20.0))
        .await
        .unwrap();
    assert_eq!(recorded.player.total_quizzes(), 1);
    assert_eq!(progress.calls.load(Ordering::SeqCst), 3);

    let stored = storage.players.get_player(PlayerId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.total_quizzes(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_a_retryable_conflict() {
    let (storage, progress, coordinator) = contended(u32::MAX, 3).await;
    let err = coordinator
        .record_completion(&submission(1, 1, 10, 20.0))
        .await
        .unwrap_err();

    assert!(matches!(err, ProgressionError::Conflict { attempts: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());
    assert_eq!(progress.calls.load(Ordering::SeqCst), 3);

    let stored = storage.players.get_player(PlayerId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.total_quizzes(), 0);
}

#[tokio::test]
async fn slow_storage_times_out_as_dependency_error() {
    let storage = Storage::in_memory();
    let coordinator = ProgressionCoordinator::new(
        fixed_clock(),
        Arc::new(StalledPlayers),
        Arc::clone(&storage.levels),
        Arc::clone(&storage.completions),
        Arc::clone(&storage.progress),
    )
    .with_config(ProgressionConfig {
        storage_timeout: Duration::from_millis(20),
        ..ProgressionConfig::default()
    });

    let err = coordinator.audit_player(PlayerId::new(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert!(err.is_retryable());
}
