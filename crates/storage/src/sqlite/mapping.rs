use quiz_core::model::{
    CompletionId, Level, LevelCompletion, LevelId, Player, PlayerAggregate, PlayerId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// `SQLITE_BUSY` / `SQLITE_LOCKED` (and their extended codes) mean another
/// writer holds the database; the caller may retry.
fn is_lock_contention(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

/// Maps driver errors onto the storage taxonomy.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.code().is_some_and(|c| is_lock_contention(&c)) => {
            tracing::warn!(error = %db, "sqlite lock contention");
            StorageError::Conflict
        }
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn player_id_from_i64(v: i64) -> Result<PlayerId, StorageError> {
    Ok(PlayerId::new(i64_to_u64("player_id", v)?))
}

pub(crate) fn level_id_from_i64(v: i64) -> Result<LevelId, StorageError> {
    Ok(LevelId::new(i64_to_u64("level_id", v)?))
}

pub(crate) fn level_id_to_i64(id: Option<LevelId>) -> Result<Option<i64>, StorageError> {
    id.map(|l| id_i64("level_id", l.value())).transpose()
}

pub(crate) fn map_player_row(row: &sqlx::sqlite::SqliteRow) -> Result<Player, StorageError> {
    let aggregate = PlayerAggregate {
        total_quizzes: u32_from_i64(
            "total_quizzes",
            row.try_get::<i64, _>("total_quizzes").map_err(ser)?,
        )?,
        average_time: row.try_get("average_time").map_err(ser)?,
        best_time: row.try_get("best_time").map_err(ser)?,
    };

    let current_level = row
        .try_get::<Option<i64>, _>("current_level_id")
        .map_err(ser)?
        .map(level_id_from_i64)
        .transpose()?;

    Player::from_persisted(
        player_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get("name").map_err(ser)?,
        i64_to_u64("points", row.try_get::<i64, _>("points").map_err(ser)?)?,
        current_level,
        aggregate,
        u32_from_i64("streak", row.try_get::<i64, _>("streak").map_err(ser)?)?,
        row.try_get("last_activity").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_level_row(row: &sqlx::sqlite::SqliteRow) -> Result<Level, StorageError> {
    Level::new(
        level_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        u32_from_i64("number", row.try_get::<i64, _>("number").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_completion_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LevelCompletion, StorageError> {
    LevelCompletion::from_persisted(
        CompletionId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        player_id_from_i64(row.try_get::<i64, _>("player_id").map_err(ser)?)?,
        level_id_from_i64(row.try_get::<i64, _>("level_id").map_err(ser)?)?,
        row.try_get("completion_time").map_err(ser)?,
        u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_codes_count_as_contention() {
        assert!(is_lock_contention("5"));
        assert!(is_lock_contention("6"));
        assert!(is_lock_contention("517"));
        assert!(!is_lock_contention("19"));
        assert!(!is_lock_contention("not-a-code"));
    }

    #[test]
    fn id_conversion_rejects_overflow() {
        assert!(id_i64("player_id", u64::MAX).is_err());
        assert_eq!(id_i64("player_id", 7).unwrap(), 7);
        assert!(player_id_from_i64(-1).is_err());
    }
}
