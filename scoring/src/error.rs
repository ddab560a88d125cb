use thiserror::Error;

use crate::model::ModelId;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),

    #[error("Non-finite value in feature column '{column}' for patient {patient_id}")]
    NonFiniteFeature { patient_id: ModelId, column: &'static str },

    #[error("Rows and labels have different lengths")]
    LengthMismatch,

    #[error("Cannot fit on an empty data set")]
    EmptyInput,

    #[error("Training data contains a single class")]
    SingleClass,

    #[error("Patient not found: {0}")]
    PatientNotFound(ModelId),

    #[error("Configuration error: {0}")]
    Config(String),
}
