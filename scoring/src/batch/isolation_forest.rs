//! Isolation forest: an ensemble of random trees where anomalies sit on short
//! paths. Scores follow the usual `2^(-E[h(x)] / c(psi))` definition.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::error::ScoringError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Share of the training set expected to be anomalous, in (0, 0.5].
    pub contamination: f64,
    pub random_seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            random_seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn path_length(&self, row: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolation percentile, `q` in [0, 100].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    /// Threshold on `score_samples` below which a row counts as an outlier.
    pub offset: f64,
}

impl IsolationForest {
    pub fn fit(rows: &[Vec<f64>], params: IsolationForestParams) -> Result<Self, ScoringError> {
        if rows.is_empty() {
            return Err(ScoringError::EmptyInput);
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(ScoringError::InvalidContamination(params.contamination));
        }
        let width = rows[0].len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(ScoringError::LengthMismatch);
        }

        let n = rows.len();
        let sample_size = params.max_samples.clamp(1, n);
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.random_seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                grow(rows, sample, 0, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };
        let training_scores: Vec<f64> = rows.iter().map(|row| forest.score_sample(row)).collect();
        forest.offset = percentile(&training_scores, 100.0 * params.contamination);
        Ok(forest)
    }

    /// Negated anomaly score `-s(x)`; lower means more anomalous.
    pub fn score_sample(&self, row: &[f64]) -> f64 {
        let mean_depth =
            self.trees.iter().map(|tree| tree.path_length(row, 0)).sum::<f64>() / self.trees.len() as f64;
        let normaliser = average_path_length(self.sample_size);
        let ratio = if normaliser > 0.0 { mean_depth / normaliser } else { 1.0 };
        -(2f64.powf(-ratio))
    }

    /// `score_sample - offset`: negative values are outliers.
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.score_sample(row) - self.offset
    }
}

fn grow(rows: &[Vec<f64>], sample: Vec<usize>, depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let width = rows[sample[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (lo, hi) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = rows[i][feature];
                (lo.min(v), hi.max(v))
            });
            (hi > lo && (hi - lo).is_finite()).then_some((feature, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = sample.into_iter().partition(|&i| rows[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, left, depth + 1, height_limit, rng)),
        right: Box::new(grow(rows, right, depth + 1, height_limit, rng)),
    }
}
