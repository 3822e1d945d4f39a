use std::sync::Arc;

use quiz_core::model::{Level, LevelId};
use storage::repository::LevelRepository;

use crate::error::LevelServiceError;

/// Maintains the level catalogue.
#[derive(Clone)]
pub struct LevelService {
    levels: Arc<dyn LevelRepository>,
}

impl LevelService {
    #[must_use]
    pub fn new(levels: Arc<dyn LevelRepository>) -> Self {
        Self { levels }
    }

    /// Create or replace a level.
    ///
    /// # Errors
    ///
    /// Returns `LevelServiceError::Level` if validation fails.
    /// Returns `LevelServiceError::Storage` if persistence fails.
    pub async fn save_level(
        &self,
        id: LevelId,
        title: String,
        number: u32,
    ) -> Result<Level, LevelServiceError> {
        let level = Level::new(id, title, number)?;
        self.levels.upsert_level(&level).await?;
        tracing::debug!(level_id = %id, number, "level saved");
        Ok(level)
    }

    /// Fetch a level by ID.
    ///
    /// Returns `Ok(None)` when the level does not exist.
    ///
    /// # Errors
    ///
    /// Returns `LevelServiceError::Storage` if repository access fails.
    pub async fn get_level(&self, id: LevelId) -> Result<Option<Level>, LevelServiceError> {
        Ok(self.levels.get_level(id).await?)
    }

    /// List levels ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `LevelServiceError::Storage` if repository access fails.
    pub async fn list_levels(&self) -> Result<Vec<Level>, LevelServiceError> {
        Ok(self.levels.list_levels().await?)
    }
}
