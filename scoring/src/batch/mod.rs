pub mod isolation_forest;

pub use isolation_forest::*;

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use common::config::BatchConfig;
use tracing::{debug, info};

use crate::{
    error::ScoringError,
    features::FeatureExtractor,
    model::*,
    scorers::StandardScaler,
    storage::CommonStorage,
};

pub const BATCH_MODEL_NAME: &str = "isolation_forest";
pub const BATCH_MODEL_VERSION: &str = "v1";

/// Any two scaled values within this bound have a finite difference.
const MAX_SCALED_MAGNITUDE: f64 = f64::MAX / 2.0;

/// Outcome of one population run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchReport {
    /// No patient had an observation.
    Empty,
    Scored {
        population: usize,
        flagged: usize,
        cutoff: f64,
        contamination: f64,
        high_fraction: f64,
        written: usize,
        dry_run: bool,
        /// First patient's (id, normalised score, flag).
        sample: (ModelId, f64, bool),
    },
}

/// Normalised anomaly scores for one population, in patient order.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationScores {
    pub patient_ids: Vec<ModelId>,
    pub scores: Vec<f64>,
    pub flags: Vec<bool>,
    pub cutoff: f64,
}

impl PopulationScores {
    pub fn flagged(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}

/// Min-max scaling into [0, 1]; a flat input maps to all zeros.
pub fn min_max_normalise(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    if range.is_nan() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / range).collect()
}

/// Flags everything at or above the k-th largest score, with
/// `k = max(1, round(contamination * n))` rounded half to even.
/// Ties at the cutoff are all flagged.
pub fn flag_top_fraction(scores: &[f64], contamination: f64) -> (f64, Vec<bool>) {
    if scores.is_empty() {
        return (0.0, Vec::new());
    }
    let n = scores.len();
    let k = ((contamination * n as f64).round_ties_even() as usize).clamp(1, n);
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let cutoff = sorted[k - 1];
    (cutoff, scores.iter().map(|s| *s >= cutoff).collect())
}

/// Population-wide anomaly run over every patient's latest observation.
#[derive(Clone)]
pub struct BatchAnomalyScorer {
    storage: Arc<dyn CommonStorage>,
    extractor: FeatureExtractor,
    config: BatchConfig,
}

impl BatchAnomalyScorer {
    pub fn new(storage: Arc<dyn CommonStorage>, config: BatchConfig) -> Self {
        Self {
            storage,
            extractor: FeatureExtractor::new(),
            config,
        }
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.config.contamination = contamination;
        self
    }

    fn params(&self) -> IsolationForestParams {
        IsolationForestParams {
            n_estimators: self.config.n_estimators,
            max_samples: self.config.max_samples,
            contamination: self.config.contamination,
            random_seed: self.config.random_seed,
        }
    }

    /// Pure part of the run: features, standardisation, forest, normalisation, flags.
    pub fn score_population(
        &self,
        population: &[(Observation, Patient)],
        today: NaiveDate,
    ) -> Result<PopulationScores, ScoringError> {
        let vectors: Vec<FeatureVector> = population
            .iter()
            .map(|(observation, patient)| self.extractor.extract(observation, patient, today))
            .collect();
        let raw: Vec<&[f64]> = vectors.iter().map(|v| v.raw_fields()).collect();
        let scaler = StandardScaler::fit(&raw)?;

        let mut rows = Vec::with_capacity(raw.len());
        for ((_, patient), row) in population.iter().zip(raw.iter()) {
            let scaled = scaler.transform(row);
            if let Some(column) = scaled.iter().position(|v| v.is_nan() || v.abs() > MAX_SCALED_MAGNITUDE) {
                return Err(ScoringError::NonFiniteFeature {
                    patient_id: patient.id,
                    column: FEATURE_NAMES[column],
                });
            }
            rows.push(scaled);
        }

        let forest = IsolationForest::fit(&rows, self.params())?;
        let anomaly: Vec<f64> = rows.iter().map(|row| -forest.decision_function(row)).collect();
        let scores = min_max_normalise(&anomaly);
        let (cutoff, flags) = flag_top_fraction(&scores, self.config.contamination);

        Ok(PopulationScores {
            patient_ids: population.iter().map(|(_, patient)| patient.id).collect(),
            scores,
            flags,
            cutoff,
        })
    }

    /// Scores the whole population. Records are written all together or not
    /// at all; `dry_run` computes the report without writing.
    pub async fn run(&self, dry_run: bool) -> Result<BatchReport, GenericError> {
        let contamination = self.config.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(ScoringError::InvalidContamination(contamination).into());
        }
        self.config
            .validate()
            .map_err(|e| ScoringError::Config(e.to_string()))?;

        let population = self.storage.latest_observations().await?;
        if population.is_empty() {
            info!("No observations found, nothing to score");
            return Ok(BatchReport::Empty);
        }
        let population_size = population.len();
        debug!(population = population_size, "Scoring population");

        let scorer = self.clone();
        let today = Local::now().date_naive();
        let result =
            tokio::task::spawn_blocking(move || scorer.score_population(&population, today)).await??;
        let flagged = result.flagged();

        let written = if dry_run {
            0
        } else {
            let scored_at = Utc::now();
            let descriptor = ModelDescriptor::new(BATCH_MODEL_NAME, BATCH_MODEL_VERSION);
            let records: Vec<NewRiskScore> = result
                .patient_ids
                .iter()
                .zip(result.scores.iter().zip(result.flags.iter()))
                .map(|(patient_id, (score, flag))| {
                    NewRiskScore::new(*patient_id, *score, *flag, Some(descriptor.clone()), scored_at)
                })
                .collect();
            let written = self.storage.append_scores(&records).await?;
            metrics::counter!("risk_batch_records_written_total").increment(written as u64);
            written
        };

        let report = BatchReport::Scored {
            population: population_size,
            flagged,
            cutoff: result.cutoff,
            contamination,
            high_fraction: flagged as f64 / population_size as f64,
            written,
            dry_run,
            sample: (result.patient_ids[0], result.scores[0], result.flags[0]),
        };
        info!(
            population = population_size,
            flagged,
            cutoff = result.cutoff,
            written,
            dry_run,
            "Population scoring finished"
        );
        Ok(report)
    }
}
