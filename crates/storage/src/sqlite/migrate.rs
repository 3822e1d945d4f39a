use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates levels, players, level completions and their indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS levels (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    number INTEGER NOT NULL CHECK (number >= 1)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS players (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    points INTEGER NOT NULL CHECK (points >= 0),
                    current_level_id INTEGER,
                    total_quizzes INTEGER NOT NULL CHECK (total_quizzes >= 0),
                    average_time REAL,
                    best_time REAL,
                    streak INTEGER NOT NULL CHECK (streak >= 0),
                    last_activity TEXT NOT NULL,
                    FOREIGN KEY (current_level_id) REFERENCES levels(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS level_completions (
                    id INTEGER PRIMARY KEY,
                    player_id INTEGER NOT NULL,
                    level_id INTEGER NOT NULL,
                    completion_time REAL NOT NULL CHECK (completion_time > 0),
                    score INTEGER NOT NULL CHECK (score >= 0),
                    completed_at TEXT NOT NULL,
                    FOREIGN KEY (player_id) REFERENCES players(id),
                    FOREIGN KEY (level_id) REFERENCES levels(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_completions_player_level_completed
                    ON level_completions (player_id, level_id, completed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_players_total_quizzes
                    ON players (total_quizzes);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
