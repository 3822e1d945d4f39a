//! Leaderboard ordering and rank resolution.
//!
//! Two rank semantics coexist:
//! - [`rank`] assigns positional ranks over the full ordering
//!   (level, then points, then average time);
//! - [`resolve_rank`] places a point total among other point totals and is
//!   the fallback when a player is not part of the ordering.

use std::cmp::Ordering;

use serde::Serialize;

use crate::model::{Player, PlayerId};

/// Which players take part in a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Only players with at least one recorded completion.
    #[default]
    ActiveOnly,
    Everyone,
}

impl Eligibility {
    #[must_use]
    pub fn admits(self, player: &Player) -> bool {
        match self {
            Eligibility::ActiveOnly => player.total_quizzes() > 0,
            Eligibility::Everyone => true,
        }
    }
}

/// A player with their 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPlayer {
    pub rank: usize,
    pub player: Player,
}

/// Leaderboard ordering: higher level first, then more points, then lower
/// average time, with a missing average sorting last.
#[must_use]
pub fn compare(a: &Player, b: &Player) -> Ordering {
    b.current_level()
        .cmp(&a.current_level())
        .then_with(|| b.points().cmp(&a.points()))
        .then_with(|| compare_average(a.average_time(), b.average_time()))
}

fn compare_average(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sorts players (stable on full ties) and assigns positional ranks 1..=N.
///
/// Exact ties still get distinct, strictly increasing ranks.
#[must_use]
pub fn rank(mut players: Vec<Player>) -> Vec<RankedPlayer> {
    players.sort_by(compare);
    players
        .into_iter()
        .enumerate()
        .map(|(idx, player)| RankedPlayer {
            rank: idx + 1,
            player,
        })
        .collect()
}

/// Filters by eligibility, then ranks.
#[must_use]
pub fn rank_eligible(players: Vec<Player>, eligibility: Eligibility) -> Vec<RankedPlayer> {
    rank(
        players
            .into_iter()
            .filter(|p| eligibility.admits(p))
            .collect(),
    )
}

/// Position a player with `player_points` would take when ranked by points
/// alone: everyone with equal or more points comes first.
///
/// `points` is expected in descending order but the result does not depend
/// on it.
#[must_use]
pub fn resolve_rank(player_points: u64, points: &[u64]) -> usize {
    points.iter().filter(|&&p| p >= player_points).count() + 1
}

/// Builds the top-`top_k` view of the eligible ordering.
///
/// When `current` names a player outside the cut, their row is appended:
/// with their positional rank if they are eligible, otherwise with the
/// points-only rank among eligible players. A player already inside the cut
/// is never duplicated, and an unknown `current` is ignored.
#[must_use]
pub fn materialize_leaderboard(
    players: Vec<Player>,
    eligibility: Eligibility,
    top_k: usize,
    current: Option<PlayerId>,
) -> Vec<RankedPlayer> {
    let (eligible, ineligible): (Vec<Player>, Vec<Player>) =
        players.into_iter().partition(|p| eligibility.admits(p));

    let ranked = rank(eligible);

    let Some(current_id) = current else {
        return ranked.into_iter().take(top_k).collect();
    };

    let current_pos = ranked.iter().position(|r| r.player.id() == current_id);
    let fallback_points: Vec<u64> = if current_pos.is_none() {
        let mut pts: Vec<u64> = ranked.iter().map(|r| r.player.points()).collect();
        pts.sort_unstable_by(|a, b| b.cmp(a));
        pts
    } else {
        Vec::new()
    };

    let mut ranked_iter = ranked.into_iter();
    let mut board: Vec<RankedPlayer> = ranked_iter.by_ref().take(top_k).collect();

    match current_pos {
        Some(pos) if pos < top_k => {}
        Some(pos) => {
            if let Some(row) = ranked_iter.nth(pos - top_k) {
                board.push(row);
            }
        }
        None => {
            if let Some(player) = ineligible.into_iter().find(|p| p.id() == current_id) {
                board.push(RankedPlayer {
                    rank: resolve_rank(player.points(), &fallback_points),
                    player,
                });
            }
        }
    }

    board
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompletionSubmission, LevelId};
    use crate::time::fixed_now;

    /// Builds a player by replaying completions so the aggregate stays valid.
    fn player(id: u64, level: u64, points: u32, times: &[f64]) -> Player {
        let mut p = Player::new(PlayerId::new(id), format!("P{id}"), fixed_now()).unwrap();
        for (i, t) in times.iter().enumerate() {
            let score = if i == 0 { points } else { 0 };
            let c = CompletionSubmission::new(p.id(), LevelId::new(level), i64::from(score), *t)
                .validate()
                .unwrap();
            p.apply_completion(&c, fixed_now()).unwrap();
        }
        p
    }

    fn ids(rows: &[RankedPlayer]) -> Vec<u64> {
        rows.iter().map(|r| r.player.id().value()).collect()
    }

    #[test]
    fn level_dominates_points() {
        let a = player(1, 3, 100, &[10.0]);
        let b = player(2, 3, 150, &[10.0]);
        let c = player(3, 2, 500, &[10.0]);
        let ranked = rank(vec![a, b, c]);
        assert_eq!(ids(&ranked), vec![2, 1, 3]);
        let ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn lower_average_time_breaks_ties() {
        let slow = player(1, 2, 100, &[12.0]);
        let fast = player(2, 2, 100, &[8.5]);
        assert_eq!(ids(&rank(vec![slow, fast])), vec![2, 1]);
    }

    #[test]
    fn missing_average_sorts_last_and_exact_ties_keep_input_order() {
        let idle = Player::new(PlayerId::new(1), "Idle", fixed_now()).unwrap();
        let idle_too = Player::new(PlayerId::new(2), "Idle too", fixed_now()).unwrap();
        let twin_a = player(3, 1, 0, &[20.0]);
        let twin_b = player(4, 1, 0, &[20.0]);
        let ranked = rank(vec![idle, twin_a, idle_too, twin_b]);
        assert_eq!(ids(&ranked), vec![3, 4, 1, 2]);
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn active_only_excludes_players_without_completions() {
        let idle = Player::new(PlayerId::new(1), "Idle", fixed_now()).unwrap();
        let active = player(2, 1, 10, &[30.0]);
        assert_eq!(
            ids(&rank_eligible(vec![idle.clone(), active.clone()], Eligibility::ActiveOnly)),
            vec![2]
        );
        assert_eq!(
            ids(&rank_eligible(vec![idle, active], Eligibility::Everyone)),
            vec![2, 1]
        );
    }

    #[test]
    fn resolve_rank_places_query_after_equal_or_higher() {
        let points = [500, 300, 300, 100];
        assert_eq!(resolve_rank(600, &points), 1);
        assert_eq!(resolve_rank(300, &points), 4);
        assert_eq!(resolve_rank(200, &points), 4);
        assert_eq!(resolve_rank(0, &points), 5);
        assert_eq!(resolve_rank(10, &[]), 1);
    }

    #[test]
    fn empty_leaderboard_is_fine() {
        assert!(materialize_leaderboard(Vec::new(), Eligibility::ActiveOnly, 5, None).is_empty());
        let idle = Player::new(PlayerId::new(1), "Idle", fixed_now()).unwrap();
        let board = materialize_leaderboard(vec![idle], Eligibility::ActiveOnly, 5, None);
        assert!(board.is_empty());
    }

    #[test]
    fn current_player_outside_cut_is_appended_with_true_rank() {
        let players: Vec<Player> = (1..=7).map(|i| player(i, 1, (100 - i * 10) as u32, &[10.0])).collect();
        let board =
            materialize_leaderboard(players, Eligibility::ActiveOnly, 3, Some(PlayerId::new(6)));
        assert_eq!(ids(&board), vec![1, 2, 3, 6]);
        assert_eq!(board[3].rank, 6);
    }

    #[test]
    fn current_player_inside_cut_is_not_duplicated() {
        let players: Vec<Player> = (1..=4).map(|i| player(i, 1, (50 - i) as u32, &[10.0])).collect();
        let board =
            materialize_leaderboard(players, Eligibility::ActiveOnly, 3, Some(PlayerId::new(2)));
        assert_eq!(ids(&board), vec![1, 2, 3]);
    }

    #[test]
    fn ineligible_current_player_gets_points_rank() {
        let mut players: Vec<Player> = vec![
            player(1, 2, 300, &[10.0]),
            player(2, 1, 200, &[10.0]),
            player(3, 1, 50, &[10.0]),
        ];
        players.push(Player::new(PlayerId::new(9), "Newcomer", fixed_now()).unwrap());
        let board =
            materialize_leaderboard(players, Eligibility::ActiveOnly, 2, Some(PlayerId::new(9)));
        assert_eq!(ids(&board), vec![1, 2, 9]);
        assert_eq!(board[2].rank, 4);
    }

    #[test]
    fn unknown_current_player_is_ignored() {
        let players = vec![player(1, 1, 10, &[10.0])];
        let board =
            materialize_leaderboard(players, Eligibility::ActiveOnly, 5, Some(PlayerId::new(42)));
        assert_eq!(ids(&board), vec![1]);
    }
}
