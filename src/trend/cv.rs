//! Deterministic k-fold splits

use serde::{Deserialize, Serialize};

/// How samples are assigned to folds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategy {
    /// Consecutive blocks in sample order; the first `n % k` folds get one
    /// extra sample.
    #[default]
    Contiguous,
    /// Sample `i` goes to fold `i % k`, so every fold spans the whole record.
    Interleaved,
}

/// Held-out index sets for `k`-fold cross-validation over `n` samples.
///
/// `k` is capped at `n`; folds are never empty and every sample is held out
/// exactly once.
pub fn kfold(n: usize, k: usize, strategy: FoldStrategy) -> Vec<Vec<usize>> {
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }
    match strategy {
        FoldStrategy::Contiguous => {
            let base = n / k;
            let extra = n % k;
            let mut start = 0;
            (0..k)
                .map(|f| {
                    let size = base + usize::from(f < extra);
                    let fold = (start..start + size).collect();
                    start += size;
                    fold
                })
                .collect()
        }
        FoldStrategy::Interleaved => (0..k).map(|f| (f..n).step_by(k).collect()).collect(),
    }
}

/// Mean held-out error over the folds for which `score` returns a value.
///
/// `score(train, test)` returns `None` for a degenerate fold (too few training
/// samples for the model); such folds are skipped. Returns `None` if every
/// fold was skipped.
pub fn cross_validate<F>(n: usize, k: usize, strategy: FoldStrategy, mut score: F) -> Option<f64>
where
    F: FnMut(&[usize], &[usize]) -> Option<f64>,
{
    let folds = kfold(n, k, strategy);
    let mut total = 0.0;
    let mut used = 0usize;
    for test in &folds {
        let train = complement(n, test);
        if let Some(err) = score(&train, test) {
            total += err;
            used += 1;
        }
    }
    (used > 0).then(|| total / used as f64)
}

pub(crate) fn complement(n: usize, test: &[usize]) -> Vec<usize> {
    let mut held = vec![false; n];
    for &i in test {
        held[i] = true;
    }
    (0..n).filter(|&i| !held[i]).collect()
}

pub(crate) fn mse(predicted: impl Iterator<Item = f64>, observed: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = predicted
        .zip(observed)
        .fold((0.0, 0usize), |(s, n), (p, o)| (s + (p - o) * (p - o), n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}
