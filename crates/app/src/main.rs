mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use quiz_core::model::CompletionSubmission;
use serde::Serialize;
use services::{AppServices, Clock, LeaderboardConfig, ProgressionConfig, ProgressionError};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LevelCommand, RecordArgs};

/// Every pooled connection must see the same in-memory database.
const SHARED_MEMORY_URL: &str = "sqlite:file:quiz?mode=memory&cache=shared";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" {
        return SHARED_MEMORY_URL.to_owned();
    }
    if trimmed.starts_with("sqlite://") || trimmed.starts_with("sqlite:file:") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    if db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("invalid --db value: {db_url}"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(anyhow!("invalid --db value: {db_url}"));
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }

    Ok(())
}

fn submission(args: RecordArgs) -> Result<CompletionSubmission> {
    if let Some(raw) = args.json {
        return serde_json::from_str(&raw).context("parsing --json payload");
    }
    Ok(CompletionSubmission {
        player_id: args.player,
        level_id: args.level,
        score: args.score,
        completion_time: args.time,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe(err: ProgressionError) -> anyhow::Error {
    let hint = if err.is_retryable() {
        "safe to retry"
    } else {
        "input must change"
    };
    anyhow!("{err} ({:?}; {hint})", err.kind())
}

async fn run(cli: Cli) -> Result<()> {
    let db_url = normalize_sqlite_url(cli.db_url);
    prepare_sqlite_file(&db_url)?;

    let progression = ProgressionConfig::from_env()?;
    let mut leaderboard = LeaderboardConfig::from_env()?;
    if let Command::Leaderboard {
        top,
        include_inactive,
        ..
    } = &cli.command
    {
        if let Some(top) = top {
            leaderboard.top_k = *top;
        }
        if *include_inactive {
            leaderboard.eligibility = quiz_core::ranking::Eligibility::Everyone;
        }
    }

    tracing::debug!(db = %db_url, "opening database");
    let services = AppServices::new_sqlite(&db_url, Clock::system(), progression, leaderboard)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    match cli.command {
        Command::Player { id, name } => {
            let player = services
                .progression()
                .ensure_player(id, &name)
                .await
                .map_err(describe)?;
            print_json(&player)
        }
        Command::Level {
            action: LevelCommand::Save { id, title, number },
        } => print_json(&services.levels().save_level(id, title, number).await?),
        Command::Level {
            action: LevelCommand::List,
        } => print_json(&services.levels().list_levels().await?),
        Command::Record(args) => {
            let recorded = services
                .progression()
                .record_completion(&submission(args)?)
                .await
                .map_err(describe)?;
            print_json(&recorded)
        }
        Command::Leaderboard { current, .. } => {
            print_json(&services.leaderboard().leaderboard(current).await?)
        }
        Command::Rank { player } => {
            let rank = services.leaderboard().points_rank(player).await?;
            print_json(&serde_json::json!({ "player_id": player, "rank": rank }))
        }
        Command::LevelStats {
            player,
            level: Some(level),
            timeframe,
        } => print_json(
            &services
                .level_stats()
                .level_stats(player, level, timeframe)
                .await?,
        ),
        Command::LevelStats {
            player,
            level: None,
            timeframe,
        } => print_json(&services.level_stats().all_levels(player, timeframe).await?),
        Command::Audit { player, repair } => {
            let progression = services.progression();
            let report = if repair {
                progression.repair_player(player).await
            } else {
                progression.audit_player(player).await
            }
            .map_err(describe)?;
            print_json(&report)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{LevelId, PlayerId};

    #[test]
    fn memory_url_is_shared_across_connections() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), SHARED_MEMORY_URL);
        assert!(prepare_sqlite_file(SHARED_MEMORY_URL).is_ok());
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/quiz.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/quiz.db"));
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/q.db".into()),
            "sqlite:///tmp/q.db"
        );
    }

    #[test]
    fn json_payload_keeps_missing_fields_missing() {
        let args = RecordArgs {
            json: Some(r#"{"player_id": 3, "level_id": 1, "completion_time": 9.5}"#.into()),
            player: None,
            level: None,
            score: None,
            time: None,
        };
        let parsed = submission(args).unwrap();
        assert_eq!(parsed.player_id, Some(PlayerId::new(3)));
        assert_eq!(parsed.level_id, Some(LevelId::new(1)));
        assert_eq!(parsed.score, None);
    }
}
