use quiz_core::model::{Player, PlayerId};

use super::SqliteRepository;
use super::mapping::{db_err, id_i64, level_id_to_i64, map_player_row};
use crate::repository::{PlayerFilter, PlayerRepository, StorageError};

const PLAYER_COLUMNS: &str = "id, name, points, current_level_id, total_quizzes, \
     average_time, best_time, streak, last_activity";

#[async_trait::async_trait]
impl PlayerRepository for SqliteRepository {
    async fn insert_player(&self, player: &Player) -> Result<(), StorageError> {
        let points = i64::try_from(player.points())
            .map_err(|_| StorageError::Serialization("points overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO players (
                id, name, points, current_level_id, total_quizzes,
                average_time, best_time, streak, last_activity
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(id_i64("player_id", player.id().value())?)
        .bind(player.name().to_owned())
        .bind(points)
        .bind(level_id_to_i64(player.current_level())?)
        .bind(i64::from(player.total_quizzes()))
        .bind(player.average_time())
        .bind(player.best_time())
        .bind(i64::from(player.streak()))
        .bind(player.last_activity())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_player(&self, id: PlayerId) -> Result<Option<Player>, StorageError> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("player_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_player_row).transpose()
    }

    async fn list_players(&self, filter: PlayerFilter) -> Result<Vec<Player>, StorageError> {
        let min_total: i64 = match filter {
            PlayerFilter::All => 0,
            PlayerFilter::Active => 1,
        };
        let sql = format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE total_quizzes >= ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(min_total)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_player_row(&row)?);
        }
        Ok(out)
    }
}
