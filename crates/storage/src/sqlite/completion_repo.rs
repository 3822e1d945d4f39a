use quiz_core::model::{CompletionId, LevelCompletion, LevelId, Player, PlayerId};
use sqlx::{Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, level_id_to_i64, map_completion_row, ser};
use crate::repository::{
    CompletionRepository, NewCompletionRecord, ProgressPersistence, StorageError,
};

/// Distinguishes a vanished player from a moved `total_quizzes` after a
/// compare-and-swap matched no row.
async fn cas_miss(tx: &mut Transaction<'_, Sqlite>, player_id: i64) -> StorageError {
    match sqlx::query("SELECT 1 FROM players WHERE id = ?1")
        .bind(player_id)
        .fetch_optional(&mut **tx)
        .await
    {
        Ok(Some(_)) => StorageError::Conflict,
        Ok(None) => StorageError::NotFound,
        Err(e) => db_err(e),
    }
}

#[async_trait::async_trait]
impl CompletionRepository for SqliteRepository {
    async fn list_completions(
        &self,
        player_id: PlayerId,
        level_id: Option<LevelId>,
    ) -> Result<Vec<LevelCompletion>, StorageError> {
        let player = id_i64("player_id", player_id.value())?;
        let level = level_id_to_i64(level_id)?;

        let rows = sqlx::query(
            r"
                SELECT id, player_id, level_id, completion_time, score, completed_at
                FROM level_completions
                WHERE player_id = ?1 AND (?2 IS NULL OR level_id = ?2)
                ORDER BY completed_at ASC, id ASC
            ",
        )
        .bind(player)
        .bind(level)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_completion_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ProgressPersistence for SqliteRepository {
    async fn apply_completion(
        &self,
        expected_total: u32,
        player: &Player,
        completion: NewCompletionRecord,
    ) -> Result<LevelCompletion, StorageError> {
        if completion.player_id != player.id() {
            return Err(StorageError::Conflict);
        }

        let player_id = id_i64("player_id", player.id().value())?;
        let level_id = id_i64("level_id", completion.level_id.value())?;
        let points = i64::try_from(player.points())
            .map_err(|_| StorageError::Serialization("points overflow".into()))?;

        // Levels are never deleted, so this check can sit outside the transaction.
        let level_exists = sqlx::query("SELECT 1 FROM levels WHERE id = ?1")
            .bind(level_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if level_exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Write before any read so this transaction never holds a stale snapshot.
        let updated = sqlx::query(
            r"
            UPDATE players SET
                points = ?1,
                current_level_id = ?2,
                total_quizzes = ?3,
                average_time = ?4,
                best_time = ?5,
                last_activity = ?6
            WHERE id = ?7 AND total_quizzes = ?8
            ",
        )
        .bind(points)
        .bind(level_id_to_i64(player.current_level())?)
        .bind(i64::from(player.total_quizzes()))
        .bind(player.average_time())
        .bind(player.best_time())
        .bind(player.last_activity())
        .bind(player_id)
        .bind(i64::from(expected_total))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(cas_miss(&mut tx, player_id).await);
        }

        let res = sqlx::query(
            r"
                INSERT INTO level_completions (
                    player_id, level_id, completion_time, score, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(player_id)
        .bind(level_id)
        .bind(completion.completion_time)
        .bind(i64::from(completion.score))
        .bind(completion.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("completion id sign overflow".into()))?;

        tx.commit().await.map_err(db_err)?;

        LevelCompletion::from_persisted(
            CompletionId::new(id),
            completion.player_id,
            completion.level_id,
            completion.completion_time,
            completion.score,
            completion.completed_at,
        )
        .map_err(ser)
    }

    async fn write_player_aggregate(
        &self,
        expected_total: u32,
        player: &Player,
    ) -> Result<(), StorageError> {
        let player_id = id_i64("player_id", player.id().value())?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r"
            UPDATE players SET
                total_quizzes = ?1,
                average_time = ?2,
                best_time = ?3
            WHERE id = ?4 AND total_quizzes = ?5
            ",
        )
        .bind(i64::from(player.total_quizzes()))
        .bind(player.average_time())
        .bind(player.best_time())
        .bind(player_id)
        .bind(i64::from(expected_total))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(cas_miss(&mut tx, player_id).await);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
