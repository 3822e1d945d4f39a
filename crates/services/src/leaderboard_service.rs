use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use quiz_core::{
    model::{LevelCompletion, LevelId, Player, PlayerId},
    ranking::{self, Eligibility, RankedPlayer},
};
use storage::repository::{
    CompletionRepository, LevelRepository, PlayerFilter, PlayerRepository, Storage,
};

use crate::config::LeaderboardConfig;
use crate::error::LeaderboardError;

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub points: u64,
    pub current_level: Option<LevelId>,
    pub level_title: Option<String>,
    pub best_time: Option<f64>,
    pub average_time: Option<f64>,
    pub total_quizzes: u32,
    /// Best time among the player's completions at `current_level`.
    pub current_level_best_time: Option<f64>,
    pub is_current: bool,
}

/// Top rows of the ranking plus, when requested, the current player's row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub rows: Vec<LeaderboardRow>,
    pub eligible_players: usize,
}

/// Read-only ranking views over a snapshot of all players.
#[derive(Clone)]
pub struct LeaderboardService {
    config: LeaderboardConfig,
    players: Arc<dyn PlayerRepository>,
    levels: Arc<dyn LevelRepository>,
    completions: Arc<dyn CompletionRepository>,
}

impl LeaderboardService {
    #[must_use]
    pub fn new(
        config: LeaderboardConfig,
        players: Arc<dyn PlayerRepository>,
        levels: Arc<dyn LevelRepository>,
        completions: Arc<dyn CompletionRepository>,
    ) -> Self {
        Self {
            config,
            players,
            levels,
            completions,
        }
    }

    #[must_use]
    pub fn from_storage(config: LeaderboardConfig, storage: &Storage) -> Self {
        Self::new(
            config,
            Arc::clone(&storage.players),
            Arc::clone(&storage.levels),
            Arc::clone(&storage.completions),
        )
    }

    #[must_use]
    pub fn config(&self) -> &LeaderboardConfig {
        &self.config
    }

    /// Materializes the top `top_k` rows. A `current` player ranked below
    /// the cut gets one extra row carrying their true rank; an unknown
    /// `current` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::Storage` if repository access fails.
    pub async fn leaderboard(
        &self,
        current: Option<PlayerId>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let players = self.players.list_players(PlayerFilter::All).await?;
        let eligible_players = players
            .iter()
            .filter(|p| self.config.eligibility.admits(p))
            .count();

        let ranked = ranking::materialize_leaderboard(
            players,
            self.config.eligibility,
            self.config.top_k,
            current,
        );

        let titles: HashMap<LevelId, String> = self
            .levels
            .list_levels()
            .await?
            .into_iter()
            .map(|l| (l.id(), l.title().to_owned()))
            .collect();

        let mut rows = Vec::with_capacity(ranked.len());
        for entry in ranked {
            let level_best = self.best_time_at_current_level(&entry.player).await?;
            rows.push(row(entry, &titles, level_best, current));
        }

        tracing::debug!(
            rows = rows.len(),
            eligible_players,
            top_k = self.config.top_k,
            "leaderboard materialized"
        );
        Ok(Leaderboard {
            rows,
            eligible_players,
        })
    }

    /// Rank the player would take if ranked by points alone among the other
    /// eligible players.
    ///
    /// # Errors
    ///
    /// Returns `LeaderboardError::PlayerNotFound` for an unknown id and
    /// `LeaderboardError::Storage` if repository access fails.
    pub async fn points_rank(&self, player_id: PlayerId) -> Result<usize, LeaderboardError> {
        let player = self
            .players
            .get_player(player_id)
            .await?
            .ok_or(LeaderboardError::PlayerNotFound(player_id))?;

        let filter = match self.config.eligibility {
            Eligibility::ActiveOnly => PlayerFilter::Active,
            Eligibility::Everyone => PlayerFilter::All,
        };
        let mut others: Vec<u64> = self
            .players
            .list_players(filter)
            .await?
            .iter()
            .filter(|p| p.id() != player_id)
            .map(Player::points)
            .collect();
        others.sort_unstable_by(|a, b| b.cmp(a));

        Ok(ranking::resolve_rank(player.points(), &others))
    }

    async fn best_time_at_current_level(
        &self,
        player: &Player,
    ) -> Result<Option<f64>, LeaderboardError> {
        let Some(level) = player.current_level() else {
            return Ok(None);
        };
        let completions = self
            .completions
            .list_completions(player.id(), Some(level))
            .await?;
        Ok(completions
            .iter()
            .map(LevelCompletion::completion_time)
            .reduce(f64::min))
    }
}

fn row(
    entry: RankedPlayer,
    titles: &HashMap<LevelId, String>,
    current_level_best_time: Option<f64>,
    current: Option<PlayerId>,
) -> LeaderboardRow {
    let RankedPlayer { rank, player } = entry;
    LeaderboardRow {
        rank,
        player_id: player.id(),
        name: player.name().to_owned(),
        points: player.points(),
        current_level: player.current_level(),
        level_title: player.current_level().and_then(|l| titles.get(&l).cloned()),
        best_time: player.best_time(),
        average_time: player.average_time(),
        total_quizzes: player.total_quizzes(),
        current_level_best_time,
        is_current: current == Some(player.id()),
    }
}
