//! Benchmark scoring.
//!
//! `pass_at_k` is the unbiased estimator over n samples with c correct:
//! the chance that a random size-k subset contains at least one correct
//! sample. Computed as `1 - prod(1 - k/i)` for `i` in `n-c+1..=n`
//! rather than with binomial coefficients, which overflow long before
//! realistic sample counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample count and correct count for one benchmark task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttempts {
    pub samples: usize,
    pub correct: usize,
}

impl TaskAttempts {
    pub fn from_flags(flags: &[bool]) -> Self {
        Self {
            samples: flags.len(),
            correct: flags.iter().filter(|&&pass| pass).count(),
        }
    }
}

/// Unbiased pass@k for one task: n samples, c correct, draw k.
pub fn pass_at_k(n: usize, c: usize, k: usize) -> f64 {
    let c = c.min(n);
    if n - c < k {
        return 1.0;
    }
    let mut fail_all = 1.0f64;
    for i in (n - c + 1)..=n {
        fail_all *= 1.0 - k as f64 / i as f64;
    }
    1.0 - fail_all
}

/// Mean pass@k across tasks, one entry per requested k.
/// An empty task list scores 0.0 for every k.
pub fn pass_at_k_aggregate(tasks: &[TaskAttempts], ks: &[usize]) -> BTreeMap<usize, f64> {
    ks.iter()
        .map(|&k| {
            let mean = if tasks.is_empty() {
                0.0
            } else {
                tasks
                    .iter()
                    .map(|task| pass_at_k(task.samples, task.correct, k))
                    .sum::<f64>()
                    / tasks.len() as f64
            };
            (k, mean)
        })
        .collect()
}

/// Fraction of passing flags. Empty input scores 0.0.
pub fn accuracy(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    flags.iter().filter(|&&pass| pass).count() as f64 / flags.len() as f64
}
