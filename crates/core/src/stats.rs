//! Running completion-time statistics.
//!
//! [`update`] is the only place the incremental formulas live; every write
//! path goes through it. [`recompute`] rebuilds the same aggregate from a
//! full history and exists for audits, not for the write path.

use crate::model::PlayerAggregate;

/// One validated quiz result folded into an aggregate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Seconds, finite and > 0.
    pub time: f64,
    pub score: u32,
}

/// Folds `observation` into `prior`.
///
/// The new average is `(prior_avg * prior_total + time) / (prior_total + 1)`,
/// with the prior average taken as 0 when there were no completions. The
/// best time only ever moves down.
#[must_use]
pub fn update(prior: &PlayerAggregate, observation: Observation) -> PlayerAggregate {
    let total_quizzes = prior.total_quizzes.saturating_add(1);

    let prior_avg = if prior.total_quizzes == 0 {
        0.0
    } else {
        prior.average_time.unwrap_or(0.0)
    };
    let prior_sum = prior_avg * f64::from(prior.total_quizzes);
    // total_quizzes >= 1 here
    let average_time = (prior_sum + observation.time) / f64::from(total_quizzes);

    let best_time = match prior.best_time {
        Some(best) if best <= observation.time => best,
        _ => observation.time,
    };

    PlayerAggregate {
        total_quizzes,
        average_time: Some(average_time),
        best_time: Some(best_time),
    }
}

/// Rebuilds an aggregate from every recorded completion time.
#[must_use]
pub fn recompute<I>(times: I) -> PlayerAggregate
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0_u32;
    let mut sum = 0.0_f64;
    let mut best: Option<f64> = None;

    for t in times {
        count = count.saturating_add(1);
        sum += t;
        best = Some(best.map_or(t, |b| b.min(t)));
    }

    if count == 0 {
        return PlayerAggregate::default();
    }

    PlayerAggregate {
        total_quizzes: count,
        average_time: Some(sum / f64::from(count)),
        best_time: best,
    }
}

/// True when two aggregates agree on count and agree on times within
/// `tolerance`.
#[must_use]
pub fn approx_eq(a: &PlayerAggregate, b: &PlayerAggregate, tolerance: f64) -> bool {
    let close = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= tolerance,
        _ => false,
    };
    a.total_quizzes == b.total_quizzes
        && close(a.average_time, b.average_time)
        && close(a.best_time, b.best_time)
}
