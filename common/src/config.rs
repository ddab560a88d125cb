use serde::Deserialize;
use std::{error::Error, path::Path};
use thiserror::Error as ThisError;

use crate::yaml_include::load_yaml_string_with_includes;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    pub project_name: String,
    pub database_url: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            project_name: "risk-engine".to_string(),
            database_url: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessorConfig {
    pub sleep_ms: u64,
    /// Commit events drained per cycle; they are dispatched concurrently.
    pub batch_size: usize,
    pub log_level: String,
    pub metrics_address: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sleep_ms: 500,
            batch_size: 16,
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// Supervised training knobs for the cached model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum (features, label) pairs before a model is trained.
    pub min_training_labels: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse regularisation strength, as in `C` of a regularised logistic regression.
    pub l2_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_training_labels: 50,
            max_iter: 1000,
            learning_rate: 0.1,
            l2_penalty: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    /// Expected share of anomalous patients, in (0, 0.5].
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub random_seed: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            contamination: 0.05,
            n_estimators: 100,
            max_samples: 256,
            random_seed: 42,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub common: CommonConfig,
    pub processor: ProcessorConfig,
    pub scoring: ScoringConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("contamination must be in (0, 0.5], got {0}")]
    Contamination(f64),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must be a positive finite number")]
    NotPositive(&'static str),
}

impl Config {
    /// Loads the YAML file at `config_path`, resolving `!include` lines.
    ///
    /// `DATABASE_URL` in the environment wins over the file value.
    pub fn load(config_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let contents = load_yaml_string_with_includes(Path::new(config_path))?;
        let mut config = Self::from_yaml_str(&contents)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.common.database_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        if contents.trim().is_empty() || contents.trim() == "~" {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch.validate()?;
        if self.scoring.min_training_labels == 0 {
            return Err(ConfigError::Zero("scoring.min_training_labels"));
        }
        if self.scoring.max_iter == 0 {
            return Err(ConfigError::Zero("scoring.max_iter"));
        }
        if !(self.scoring.learning_rate.is_finite() && self.scoring.learning_rate > 0.0) {
            return Err(ConfigError::NotPositive("scoring.learning_rate"));
        }
        if !(self.scoring.l2_penalty.is_finite() && self.scoring.l2_penalty > 0.0) {
            return Err(ConfigError::NotPositive("scoring.l2_penalty"));
        }
        if self.processor.batch_size == 0 {
            return Err(ConfigError::Zero("processor.batch_size"));
        }
        Ok(())
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigError::Contamination(self.contamination));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::Zero("batch.n_estimators"));
        }
        if self.max_samples == 0 {
            return Err(ConfigError::Zero("batch.max_samples"));
        }
        Ok(())
    }
}
