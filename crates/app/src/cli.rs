use clap::{Args, Parser, Subcommand};
use quiz_core::analysis::Timeframe;
use quiz_core::model::{LevelId, PlayerId};

/// Quiz progression and ranking
#[derive(Debug, Parser)]
#[command(name = "quiz", version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// `SQLite` database (path, `sqlite:` URL, or `sqlite::memory:`)
    #[arg(long = "db", env = "QUIZ_DB_URL", default_value = "sqlite://quiz.sqlite3", global = true)]
    pub db_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a player, or show the one already registered under the id
    Player {
        #[arg(long)]
        id: PlayerId,
        #[arg(long)]
        name: String,
    },

    /// Manage the level catalogue
    Level {
        #[command(subcommand)]
        action: LevelCommand,
    },

    /// Record a level completion
    Record(RecordArgs),

    /// Show the leaderboard
    Leaderboard {
        /// Player whose row is always shown
        #[arg(long)]
        current: Option<PlayerId>,
        /// Rows before the current player's row (overrides `QUIZ_LEADERBOARD_SIZE`)
        #[arg(long)]
        top: Option<usize>,
        /// Rank players without completions too
        #[arg(long)]
        include_inactive: bool,
    },

    /// Points-only rank of a player
    Rank {
        #[arg(long)]
        player: PlayerId,
    },

    /// Per-level performance of a player
    LevelStats {
        #[arg(long)]
        player: PlayerId,
        /// Restrict to one level; all levels otherwise
        #[arg(long)]
        level: Option<LevelId>,
        /// all, week, month, or year
        #[arg(long, default_value = "all")]
        timeframe: Timeframe,
    },

    /// Recompute a player's time aggregate from history
    Audit {
        #[arg(long)]
        player: PlayerId,
        /// Overwrite the stored aggregate when it drifted
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum LevelCommand {
    /// Create or replace a level
    Save {
        #[arg(long)]
        id: LevelId,
        #[arg(long)]
        title: String,
        #[arg(long)]
        number: u32,
    },
    /// List all levels
    List,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Raw JSON payload (`player_id`, `level_id`, `score`, `completion_time`)
    #[arg(long, conflicts_with_all = ["player", "level", "score", "time"])]
    pub json: Option<String>,
    #[arg(long)]
    pub player: Option<PlayerId>,
    #[arg(long)]
    pub level: Option<LevelId>,
    #[arg(long, allow_negative_numbers = true)]
    pub score: Option<i64>,
    /// Completion time in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub time: Option<f64>,
}
