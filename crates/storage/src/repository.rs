use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    CompletionId, Level, LevelCompletion, LevelId, Player, PlayerId, ValidCompletion,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Which players a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerFilter {
    #[default]
    All,
    /// Players with at least one recorded completion.
    Active,
}

impl PlayerFilter {
    #[must_use]
    pub fn matches(self, player: &Player) -> bool {
        match self {
            PlayerFilter::All => true,
            PlayerFilter::Active => player.total_quizzes() > 0,
        }
    }
}

/// Completion row to insert; storage assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompletionRecord {
    pub player_id: PlayerId,
    pub level_id: LevelId,
    pub completion_time: f64,
    pub score: u32,
    pub completed_at: DateTime<Utc>,
}

impl NewCompletionRecord {
    #[must_use]
    pub fn from_valid(valid: &ValidCompletion, completed_at: DateTime<Utc>) -> Self {
        Self {
            player_id: valid.player_id(),
            level_id: valid.level_id(),
            completion_time: valid.completion_time(),
            score: valid.score(),
            completed_at,
        }
    }
}

#[async_trait]
pub trait PlayerRepository: Send + Sync {
    /// Create a player row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already taken.
    async fn insert_player(&self, player: &Player) -> Result<(), StorageError>;

    /// Fetch a player by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_player(&self, id: PlayerId) -> Result<Option<Player>, StorageError>;

    /// List players matching `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_players(&self, filter: PlayerFilter) -> Result<Vec<Player>, StorageError>;
}

#[async_trait]
pub trait LevelRepository: Send + Sync {
    /// Persist or update a level.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the level cannot be stored.
    async fn upsert_level(&self, level: &Level) -> Result<(), StorageError>;

    /// Fetch a level by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_level(&self, id: LevelId) -> Result<Option<Level>, StorageError>;

    /// All levels ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_levels(&self) -> Result<Vec<Level>, StorageError>;
}

#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Completions for a player, optionally restricted to one level, oldest
    /// first (ties broken by id).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_completions(
        &self,
        player_id: PlayerId,
        level_id: Option<LevelId>,
    ) -> Result<Vec<LevelCompletion>, StorageError>;
}

/// Atomic write paths for player progression.
///
/// Both methods compare-and-swap on the stored `total_quizzes`: the write
/// only lands if the row still holds `expected_total`.
#[async_trait]
pub trait ProgressPersistence: Send + Sync {
    /// Write the player's updated progression fields and insert the
    /// completion as one unit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored count moved,
    /// `StorageError::NotFound` if the player row is gone, or other storage
    /// errors. Nothing is applied on error.
    async fn apply_completion(
        &self,
        expected_total: u32,
        player: &Player,
        completion: NewCompletionRecord,
    ) -> Result<LevelCompletion, StorageError>;

    /// Overwrite only the time aggregate (total, average, best).
    ///
    /// # Errors
    ///
    /// Same contract as [`ProgressPersistence::apply_completion`].
    async fn write_player_aggregate(
        &self,
        expected_total: u32,
        player: &Player,
    ) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    players: HashMap<PlayerId, Player>,
    levels: BTreeMap<LevelId, Level>,
    completions: Vec<LevelCompletion>,
    next_completion_id: u64,
}

impl MemoryState {
    fn check_expected(&self, id: PlayerId, expected_total: u32) -> Result<(), StorageError> {
        let stored = self.players.get(&id).ok_or(StorageError::NotFound)?;
        if stored.total_quizzes() != expected_total {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All tables sit behind one lock, so each trait call is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl PlayerRepository for InMemoryRepository {
    async fn insert_player(&self, player: &Player) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.players.contains_key(&player.id()) {
            return Err(StorageError::Conflict);
        }
        guard.players.insert(player.id(), player.clone());
        Ok(())
    }

    async fn get_player(&self, id: PlayerId) -> Result<Option<Player>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.players.get(&id).cloned())
    }

    async fn list_players(&self, filter: PlayerFilter) -> Result<Vec<Player>, StorageError> {
        let guard = self.lock()?;
        let mut players: Vec<Player> = guard
            .players
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        players.sort_by_key(Player::id);
        Ok(players)
    }
}

#[async_trait]
impl LevelRepository for InMemoryRepository {
    async fn upsert_level(&self, level: &Level) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.levels.insert(level.id(), level.clone());
        Ok(())
    }

    async fn get_level(&self, id: LevelId) -> Result<Option<Level>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.levels.get(&id).cloned())
    }

    async fn list_levels(&self) -> Result<Vec<Level>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.levels.values().cloned().collect())
    }
}

#[async_trait]
impl CompletionRepository for InMemoryRepository {
    async fn list_completions(
        &self,
        player_id: PlayerId,
        level_id: Option<LevelId>,
    ) -> Result<Vec<LevelCompletion>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<LevelCompletion> = guard
            .completions
            .iter()
            .filter(|c| c.player_id() == player_id)
            .filter(|c| level_id.is_none_or(|l| c.level_id() == l))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.completed_at()
                .cmp(&b.completed_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        Ok(found)
    }
}

#[async_trait]
impl ProgressPersistence for InMemoryRepository {
    async fn apply_completion(
        &self,
        expected_total: u32,
        player: &Player,
        completion: NewCompletionRecord,
    ) -> Result<LevelCompletion, StorageError> {
        if completion.player_id != player.id() {
            return Err(StorageError::Conflict);
        }

        let mut guard = self.lock()?;
        guard.check_expected(player.id(), expected_total)?;
        if !guard.levels.contains_key(&completion.level_id) {
            return Err(StorageError::NotFound);
        }

        let id = guard.next_completion_id + 1;
        let stored = LevelCompletion::from_persisted(
            CompletionId::new(id),
            completion.player_id,
            completion.level_id,
            completion.completion_time,
            completion.score,
            completion.completed_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        guard.next_completion_id = id;
        guard.completions.push(stored.clone());
        guard.players.insert(player.id(), player.clone());
        Ok(stored)
    }

    async fn write_player_aggregate(
        &self,
        expected_total: u32,
        player: &Player,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.check_expected(player.id(), expected_total)?;
        let stored = guard
            .players
            .get_mut(&player.id())
            .ok_or(StorageError::NotFound)?;
        stored
            .replace_aggregate(*player.aggregate())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub players: Arc<dyn PlayerRepository>,
    pub levels: Arc<dyn LevelRepository>,
    pub completions: Arc<dyn CompletionRepository>,
    pub progress: Arc<dyn ProgressPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            players: Arc::new(repo.clone()),
            levels: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            progress: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::CompletionSubmission;
    use quiz_core::time::fixed_now;

    fn level(id: u64) -> Level {
        Level::new(LevelId::new(id), format!("Level {id}"), u32::try_from(id).unwrap()).unwrap()
    }

    fn valid(player: u64, level: u64, score: i64, time: f64) -> ValidCompletion {
        CompletionSubmission::new(PlayerId::new(player), LevelId::new(level), score, time)
            .validate()
            .unwrap()
    }

    async fn seeded() -> (InMemoryRepository, Player) {
        let repo = InMemoryRepository::new();
        repo.upsert_level(&level(1)).await.unwrap();
        let player = Player::new(PlayerId::new(1), "Ada", fixed_now()).unwrap();
        repo.insert_player(&player).await.unwrap();
        (repo, player)
    }

    #[tokio::test]
    async fn insert_player_twice_conflicts() {
        let (repo, player) = seeded().await;
        let err = repo.insert_player(&player).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn apply_completion_writes_player_and_completion() {
        let (repo, mut player) = seeded().await;
        let v = valid(1, 1, 25, 30.0);
        player.apply_completion(&v, fixed_now()).unwrap();

        let stored = repo
            .apply_completion(0, &player, NewCompletionRecord::from_valid(&v, fixed_now()))
            .await
            .unwrap();
        assert_eq!(stored.id(), CompletionId::new(1));

        let fetched = repo.get_player(player.id()).await.unwrap().unwrap();
        assert_eq!(fetched.total_quizzes(), 1);
        assert_eq!(fetched.points(), 25);
        assert_eq!(
            repo.list_completions(player.id(), None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn stale_expected_total_applies_nothing() {
        let (repo, mut player) = seeded().await;
        let v = valid(1, 1, 25, 30.0);
        player.apply_completion(&v, fixed_now()).unwrap();

        let err = repo
            .apply_completion(3, &player, NewCompletionRecord::from_valid(&v, fixed_now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let fetched = repo.get_player(player.id()).await.unwrap().unwrap();
        assert_eq!(fetched.total_quizzes(), 0);
        assert!(
            repo.list_completions(player.id(), None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn completions_are_filtered_and_chronological() {
        let (repo, mut player) = seeded().await;
        repo.upsert_level(&level(2)).await.unwrap();

        let later = fixed_now() + chrono::Duration::minutes(10);
        for (lvl, at) in [(2, later), (1, fixed_now()), (1, later)] {
            let v = valid(1, lvl, 5, 12.0);
            let expected = player.total_quizzes();
            player.apply_completion(&v, at).unwrap();
            repo.apply_completion(expected, &player, NewCompletionRecord::from_valid(&v, at))
                .await
                .unwrap();
        }

        let level_one = repo
            .list_completions(player.id(), Some(LevelId::new(1)))
            .await
            .unwrap();
        assert_eq!(level_one.len(), 2);
        assert!(level_one[0].completed_at() <= level_one[1].completed_at());

        let active = repo.list_players(PlayerFilter::Active).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn unknown_level_is_not_found() {
        let (repo, mut player) = seeded().await;
        let v = valid(1, 99, 5, 12.0);
        player.apply_completion(&v, fixed_now()).unwrap();
        let err = repo
            .apply_completion(0, &player, NewCompletionRecord::from_valid(&v, fixed_now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
