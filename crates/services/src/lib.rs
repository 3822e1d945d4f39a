#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod leaderboard_service;
pub mod level_service;
pub mod level_stats_service;
pub mod progression;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use config::{LeaderboardConfig, ProgressionConfig};
pub use error::{
    AppServicesError, ConfigError, DependencyError, ErrorKind, LeaderboardError,
    LevelServiceError, LevelStatsError, ProgressionError,
};
pub use leaderboard_service::{Leaderboard, LeaderboardRow, LeaderboardService};
pub use level_service::LevelService;
pub use level_stats_service::{LevelDetail, LevelStatsService, LevelSummary};
pub use progression::{
    AuditReport, CompletionAnnotation, ProgressionCoordinator, RecordedCompletion,
};
