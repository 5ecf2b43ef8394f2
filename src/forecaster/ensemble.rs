//! Bagged regression-tree ensemble with per-member prediction.
//!
//! The confidence band requires individual learner outputs, so the model
//! family is an explicit bag of CART regression trees rather than an
//! opaque single model. Split search is quantile-binned instead of
//! exhaustive. Everything is serde-serializable so the fitted
//! bundle can round-trip through one JSON artifact.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Quantile bins evaluated per feature during split search.
const SPLIT_BINS: usize = 16;

/// Minimum samples in a node before a split is attempted.
const MIN_SPLIT_SAMPLES: usize = 4;

// ============================================================================
// Feature scaling
// ============================================================================

/// Zero-mean / unit-variance feature scaler, fit on the train split only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_features = rows.first().map_or(0, Vec::len);
        let n = rows.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; n_features];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // Constant features pass through unscaled
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.stds)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

// ============================================================================
// CART regression tree
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A single variance-reducing regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    /// Fit over the rows named by `indices` (with repetition, for
    /// bootstrap resamples).
    pub fn fit(x: &[Vec<f64>], y: &[f64], indices: &[usize], max_depth: usize) -> Self {
        Self {
            root: grow(x, y, indices, max_depth),
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn mean_of(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn grow(x: &[Vec<f64>], y: &[f64], indices: &[usize], depth_left: usize) -> Node {
    if depth_left == 0 || indices.len() < MIN_SPLIT_SAMPLES {
        return Node::Leaf {
            value: mean_of(y, indices),
        };
    }

    let n_features = x.first().map_or(0, Vec::len);
    let mut best: Option<(f64, usize, f64)> = None; // (sse, feature, threshold)

    for feature in 0..n_features {
        if let Some((sse, threshold)) = best_split(x, y, indices, feature) {
            match best {
                Some((best_sse, _, _)) if sse >= best_sse => {}
                _ => best = Some((sse, feature, threshold)),
            }
        }
    }

    let Some((_, feature, threshold)) = best else {
        return Node::Leaf {
            value: mean_of(y, indices),
        };
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| x[i][feature] <= threshold);
    if left_idx.is_empty() || right_idx.is_empty() {
        return Node::Leaf {
            value: mean_of(y, indices),
        };
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, y, &left_idx, depth_left - 1)),
        right: Box::new(grow(x, y, &right_idx, depth_left - 1)),
    }
}

/// Best quantile-binned split of `feature` over `indices`.
///
/// Returns `(total_sse, threshold)` for the candidate minimizing the
/// summed within-side squared error, or `None` when the feature is
/// constant over the node.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    feature: usize,
) -> Option<(f64, f64)> {
    let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (x[i][feature], y[i])).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = pairs.len();
    if pairs[0].0 >= pairs[n - 1].0 {
        return None;
    }

    // Prefix sums over the value-sorted labels
    let mut sum = vec![0.0; n + 1];
    let mut sum_sq = vec![0.0; n + 1];
    for (i, (_, label)) in pairs.iter().enumerate() {
        sum[i + 1] = sum[i] + label;
        sum_sq[i + 1] = sum_sq[i] + label * label;
    }
    let sse = |from: usize, to: usize| -> f64 {
        let count = (to - from) as f64;
        let s = sum[to] - sum[from];
        (sum_sq[to] - sum_sq[from]) - s * s / count
    };

    let mut best: Option<(f64, f64)> = None;
    for bin in 1..SPLIT_BINS {
        let pos = bin * n / SPLIT_BINS;
        if pos == 0 || pos >= n {
            continue;
        }
        // A threshold must actually separate the sorted values
        if pairs[pos - 1].0 >= pairs[pos].0 {
            continue;
        }
        let threshold = (pairs[pos - 1].0 + pairs[pos].0) / 2.0;
        let total = sse(0, pos) + sse(pos, n);
        match best {
            Some((best_sse, _)) if total >= best_sse => {}
            _ => best = Some((total, threshold)),
        }
    }
    best
}

// ============================================================================
// Bagged ensemble
// ============================================================================

/// Bootstrap-aggregated regression trees.
///
/// Deterministic for a given seed: member m draws its resample from
/// `StdRng` seeded with `seed + m`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggedForest {
    trees: Vec<RegressionTree>,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl BaggedForest {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        n_estimators: usize,
        max_depth: usize,
        seed: u64,
    ) -> Self {
        let n = x.len();
        let trees = (0..n_estimators)
            .into_par_iter()
            .map(|member| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(member as u64));
                let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &indices, max_depth)
            })
            .collect();

        Self {
            trees,
            n_estimators,
            max_depth,
            seed,
        }
    }

    /// Every member's prediction, in member order.
    pub fn predict_members(&self, row: &[f64]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(row)).collect()
    }

    /// Ensemble mean prediction.
    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.predict_members(row).iter().sum::<f64>() / self.trees.len() as f64
    }
}

// ============================================================================
// Split + metrics helpers
// ============================================================================

/// Seeded shuffle split: returns `(train_indices, test_indices)`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n.saturating_sub(1));
    let test = indices.split_off(n - n_test);
    (indices, test)
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Population standard deviation of the member predictions.
pub fn std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
