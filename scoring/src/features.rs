//! Feature engineering: one observation plus its patient becomes a fixed
//! 15-field [`FeatureVector`].
//!
//! Extraction is pure. "Today" is an explicit argument so that age derived
//! from a date of birth is reproducible.

use chrono::{Datelike, Local, NaiveDate};

use crate::model::{FEATURE_COUNT, FeatureVector, Observation, Patient};

pub const DEFAULT_BMI: f64 = 26.0;
pub const DEFAULT_SYSTOLIC_BP: f64 = 125.0;
pub const DEFAULT_DIASTOLIC_BP: f64 = 78.0;
pub const DEFAULT_TOTAL_CHOLESTEROL: f64 = 190.0;
pub const DEFAULT_HDL_CHOLESTEROL: f64 = 50.0;
pub const DEFAULT_LDL_CHOLESTEROL: f64 = 110.0;
pub const DEFAULT_TRIGLYCERIDES: f64 = 120.0;

/// Ordinal used when activity text is missing or unrecognised.
pub const DEFAULT_ACTIVITY_LEVEL: u8 = 1;

const RATIO_EPSILON: f64 = 1e-6;

/// Maps free-text activity to {0 sedentary, 1 low, 2 moderate, 3 high}.
pub fn activity_level(raw: Option<&str>) -> u8 {
    let Some(raw) = raw else {
        return DEFAULT_ACTIVITY_LEVEL;
    };
    match raw.trim().to_lowercase().as_str() {
        "none" | "no" | "sedentary" => 0,
        "low" | "light" => 1,
        "moderate" | "medium" => 2,
        "high" | "vigorous" => 3,
        _ => DEFAULT_ACTIVITY_LEVEL,
    }
}

/// Blood-pressure stage: 0 normal, 1 elevated, 2 stage 1, 3 stage 2, 4 crisis.
///
/// Stage 1 is checked before crisis, so a diastolic of 80-89 stays stage 1
/// even with a crisis-level systolic.
pub fn bp_stage(systolic: f64, diastolic: f64) -> u8 {
    if systolic < 120.0 && diastolic < 80.0 {
        return 0;
    }
    if (120.0..130.0).contains(&systolic) && diastolic < 80.0 {
        return 1;
    }
    if (130.0..140.0).contains(&systolic) || (80.0..90.0).contains(&diastolic) {
        return 2;
    }
    if systolic >= 180.0 || diastolic >= 120.0 {
        return 4;
    }
    3
}

/// 0 underweight, 1 normal, 2 overweight, 3 obese.
pub fn bmi_category(bmi: f64) -> u8 {
    if bmi < 18.5 {
        0
    } else if bmi < 25.0 {
        1
    } else if bmi < 30.0 {
        2
    } else {
        3
    }
}

/// Whole years between `date_of_birth` and `today`, not counting a birthday
/// that has not been reached yet this year.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let birthday_pending = (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day());
    today.year() - date_of_birth.year() - i32::from(birthday_pending)
}

fn resolve_age(observation: &Observation, patient: &Patient, today: NaiveDate) -> f64 {
    if let Some(age) = observation.age {
        return f64::from(age);
    }
    patient
        .date_of_birth
        .map(|dob| f64::from(age_on(dob, today)))
        .unwrap_or(0.0)
}

fn or_neutral(value: Option<f64>, neutral: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(neutral)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, observation: &Observation, patient: &Patient, today: NaiveDate) -> FeatureVector {
        let age = resolve_age(observation, patient, today);
        let bmi = or_neutral(observation.bmi, DEFAULT_BMI);
        let systolic = or_neutral(observation.systolic_bp, DEFAULT_SYSTOLIC_BP);
        let diastolic = or_neutral(observation.diastolic_bp, DEFAULT_DIASTOLIC_BP);
        let total_chol = or_neutral(observation.total_cholesterol, DEFAULT_TOTAL_CHOLESTEROL);
        let hdl = or_neutral(observation.hdl_cholesterol, DEFAULT_HDL_CHOLESTEROL);
        let ldl = or_neutral(observation.ldl_cholesterol, DEFAULT_LDL_CHOLESTEROL);
        let triglycerides = or_neutral(observation.triglycerides, DEFAULT_TRIGLYCERIDES);
        let smoker = if observation.smoker.unwrap_or(false) { 1.0 } else { 0.0 };
        let activity = f64::from(activity_level(observation.physical_activity.as_deref()));

        let fields: [f64; FEATURE_COUNT] = [
            age,
            bmi,
            systolic,
            diastolic,
            total_chol,
            hdl,
            ldl,
            triglycerides,
            smoker,
            activity,
            systolic - diastolic,
            total_chol / hdl.max(RATIO_EPSILON),
            total_chol - hdl,
            f64::from(bp_stage(systolic, diastolic)),
            f64::from(bmi_category(bmi)),
        ];
        FeatureVector(fields)
    }

    /// Extraction against the local calendar date.
    pub fn extract_now(&self, observation: &Observation, patient: &Patient) -> FeatureVector {
        self.extract(observation, patient, Local::now().date_naive())
    }
}
