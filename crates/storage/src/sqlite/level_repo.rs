use quiz_core::model::{Level, LevelId};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, map_level_row};
use crate::repository::{LevelRepository, StorageError};

#[async_trait::async_trait]
impl LevelRepository for SqliteRepository {
    async fn upsert_level(&self, level: &Level) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO levels (id, title, number)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                number = excluded.number
            ",
        )
        .bind(id_i64("level_id", level.id().value())?)
        .bind(level.title().to_owned())
        .bind(i64::from(level.number()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_level(&self, id: LevelId) -> Result<Option<Level>, StorageError> {
        let row = sqlx::query("SELECT id, title, number FROM levels WHERE id = ?1")
            .bind(id_i64("level_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_level_row).transpose()
    }

    async fn list_levels(&self) -> Result<Vec<Level>, StorageError> {
        let rows = sqlx::query("SELECT id, title, number FROM levels ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_level_row).collect()
    }
}
