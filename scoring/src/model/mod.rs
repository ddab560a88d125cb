use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Debug;
use strum_macros::{Display as EnumDisplay, EnumString};

pub type ModelId = i64;

pub type GenericError = Box<dyn Error + Send + Sync>;

pub mod risk_queue;
pub mod sea_orm_storage_model;

pub use risk_queue::{RiskQueueEntry, RiskQueueFilter, RiskQueueOrder, RiskQueuePage};

/// Upper bound (exclusive) of the Low band.
pub const LOW_BAND_UPPER: f64 = 0.20;
/// Lower bound (inclusive) of the High band.
pub const HIGH_BAND_LOWER: f64 = 0.50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: ModelId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

impl Patient {
    pub fn new(id: ModelId, first_name: &str, last_name: &str) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth: None,
        }
    }

    pub fn with_date_of_birth(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }
}

/// One biometric panel. Every measurement is optional; the feature extractor
/// substitutes neutral values for anything missing.
///
/// Observations are time-ordered by `id`: the latest observation of a patient
/// is the one with the highest id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub id: ModelId,
    pub patient_id: ModelId,
    pub age: Option<i32>,
    pub bmi: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub total_cholesterol: Option<f64>,
    pub hdl_cholesterol: Option<f64>,
    pub ldl_cholesterol: Option<f64>,
    pub triglycerides: Option<f64>,
    pub smoker: Option<bool>,
    pub physical_activity: Option<String>,
}

impl Observation {
    pub fn empty(id: ModelId, patient_id: ModelId) -> Self {
        Self {
            id,
            patient_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLabel {
    pub id: ModelId,
    pub patient_id: ModelId,
    /// Ground truth, e.g. a diagnosis within the horizon.
    pub label: bool,
    pub reference_date: Option<NaiveDate>,
    pub horizon_days: Option<i32>,
}

impl OutcomeLabel {
    pub fn new(id: ModelId, patient_id: ModelId, label: bool) -> Self {
        Self {
            id,
            patient_id,
            label,
            reference_date: None,
            horizon_days: None,
        }
    }

    /// Labels are unique per (patient, reference date, horizon).
    pub fn key(&self) -> (ModelId, Option<NaiveDate>, Option<i32>) {
        (self.patient_id, self.reference_date, self.horizon_days)
    }
}

/// Everything model training reads, taken at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSnapshot {
    pub latest: Vec<(Observation, Patient)>,
    pub labels: Vec<OutcomeLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumDisplay, EnumString)]
pub enum RiskBand {
    Low,
    Med,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score < LOW_BAND_UPPER {
            RiskBand::Low
        } else if score < HIGH_BAND_LOWER {
            RiskBand::Med
        } else {
            RiskBand::High
        }
    }
}

/// Name and version of whatever produced a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub version: String,
}

impl ModelDescriptor {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

/// A score about to be appended. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRiskScore {
    pub patient_id: ModelId,
    pub score: f64,
    pub band: RiskBand,
    pub high_risk: bool,
    pub scored_at: DateTime<Utc>,
    pub model: Option<ModelDescriptor>,
}

impl NewRiskScore {
    pub fn new(
        patient_id: ModelId,
        score: f64,
        high_risk: bool,
        model: Option<ModelDescriptor>,
        scored_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id,
            score,
            band: RiskBand::from_score(score),
            high_risk,
            scored_at,
            model,
        }
    }
}

/// Append-only score row. The current score of a patient is its latest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreRecord {
    pub id: ModelId,
    pub patient_id: ModelId,
    pub score: f64,
    pub band: RiskBand,
    pub high_risk: bool,
    pub scored_at: DateTime<Utc>,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
}

impl RiskScoreRecord {
    pub fn from_new(id: ModelId, new_score: &NewRiskScore) -> Self {
        Self {
            id,
            patient_id: new_score.patient_id,
            score: new_score.score,
            band: new_score.band,
            high_risk: new_score.high_risk,
            scored_at: new_score.scored_at,
            model_name: new_score.model.as_ref().map(|m| m.name.clone()),
            model_version: new_score.model.as_ref().map(|m| m.version.clone()),
        }
    }
}

/// Emitted by the write side once a record is durably committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitEvent {
    ObservationCommitted {
        patient_id: ModelId,
        observation_id: ModelId,
    },
    LabelCommitted {
        patient_id: ModelId,
        label_id: ModelId,
    },
}

impl CommitEvent {
    pub fn patient_id(&self) -> ModelId {
        match self {
            CommitEvent::ObservationCommitted { patient_id, .. }
            | CommitEvent::LabelCommitted { patient_id, .. } => *patient_id,
        }
    }
}

/// Number of fields in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 15;

/// Number of leading raw (non-derived) fields, used for population scoring.
pub const RAW_FEATURE_COUNT: usize = 10;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age",
    "bmi",
    "systolic_bp",
    "diastolic_bp",
    "total_cholesterol",
    "hdl_cholesterol",
    "ldl_cholesterol",
    "triglycerides",
    "smoker",
    "activity_level",
    "pulse_pressure",
    "chol_hdl_ratio",
    "non_hdl",
    "bp_stage",
    "bmi_category",
];

/// Positions in a [`FeatureVector`]. Changing the order or length invalidates
/// every trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FeatureColumn {
    Age = 0,
    Bmi,
    SystolicBp,
    DiastolicBp,
    TotalCholesterol,
    HdlCholesterol,
    LdlCholesterol,
    Triglycerides,
    Smoker,
    ActivityLevel,
    PulsePressure,
    CholHdlRatio,
    NonHdl,
    BpStage,
    BmiCategory,
}

impl FeatureColumn {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn get(&self, column: FeatureColumn) -> f64 {
        self.0[column.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn raw_fields(&self) -> &[f64] {
        &self.0[..RAW_FEATURE_COUNT]
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn band_boundaries() {
        assert_eq!(RiskBand::from_score(0.0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(0.1999), RiskBand::Low);
        assert_eq!(RiskBand::from_score(0.20), RiskBand::Med);
        assert_eq!(RiskBand::from_score(0.4999), RiskBand::Med);
        assert_eq!(RiskBand::from_score(0.50), RiskBand::High);
        assert_eq!(RiskBand::from_score(1.0), RiskBand::High);
    }

    #[test]
    fn band_text_form() {
        assert_eq!(RiskBand::Med.to_string(), "Med");
        assert_eq!(RiskBand::from_str("High").unwrap(), RiskBand::High);
        assert!(RiskBand::from_str("Severe").is_err());
    }

    #[test]
    fn feature_columns_match_names() {
        assert_eq!(FeatureColumn::Age.name(), "age");
        assert_eq!(FeatureColumn::ActivityLevel.index(), RAW_FEATURE_COUNT - 1);
        assert_eq!(FeatureColumn::BmiCategory.index(), FEATURE_COUNT - 1);
        assert_eq!(FeatureColumn::CholHdlRatio.name(), "chol_hdl_ratio");
    }

    #[test]
    fn record_copies_model_provenance() {
        let new_score = NewRiskScore::new(
            7,
            0.42,
            false,
            Some(ModelDescriptor::new("rule_based", "v1")),
            Utc::now(),
        );
        let record = RiskScoreRecord::from_new(3, &new_score);
        assert_eq!(record.band, RiskBand::Med);
        assert_eq!(record.model_name.as_deref(), Some("rule_based"));
        assert_eq!(record.model_version.as_deref(), Some("v1"));
    }
}
