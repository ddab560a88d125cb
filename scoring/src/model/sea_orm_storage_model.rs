use sea_orm::entity::prelude::*;
use chrono::{NaiveDate, NaiveDateTime};
use std::str::FromStr;

use crate::model::{GenericError, Observation, OutcomeLabel, Patient, RiskBand, RiskScoreRecord};

// Patients
pub mod patient {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "patients")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub first_name: String,
        pub last_name: String,
        pub date_of_birth: Option<NaiveDate>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::observation::Entity")]
        Observation,
        #[sea_orm(has_many = "super::outcome_label::Entity")]
        OutcomeLabel,
        #[sea_orm(has_many = "super::risk_score::Entity")]
        RiskScore,
    }

    impl Related<super::observation::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Observation.def()
        }
    }

    impl Related<super::outcome_label::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::OutcomeLabel.def()
        }
    }

    impl Related<super::risk_score::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::RiskScore.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

// Lab panels
pub mod observation {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "observations")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub patient_id: i64,
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
        pub created_at: NaiveDateTime,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::patient::Entity", from = "Column::PatientId", to = "super::patient::Column::Id")]
        Patient,
    }

    impl Related<super::patient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Patient.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

// Outcome labels
pub mod outcome_label {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "outcome_labels")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub patient_id: i64,
        pub label: bool,
        pub reference_date: Option<NaiveDate>,
        pub horizon_days: Option<i32>,
        pub updated_at: NaiveDateTime,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::patient::Entity", from = "Column::PatientId", to = "super::patient::Column::Id")]
        Patient,
    }

    impl Related<super::patient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Patient.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

// Risk scores (append-only)
pub mod risk_score {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "risk_scores")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub patient_id: i64,
        pub score: f64,
        pub band: String,
        pub high_risk: bool,
        pub model_name: Option<String>,
        pub model_version: Option<String>,
        pub scored_at: NaiveDateTime,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(belongs_to = "super::patient::Entity", from = "Column::PatientId", to = "super::patient::Column::Id")]
        Patient,
    }

    impl Related<super::patient::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Patient.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

impl From<patient::Model> for Patient {
    fn from(model: patient::Model) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name,
            last_name: model.last_name,
            date_of_birth: model.date_of_birth,
        }
    }
}

impl From<observation::Model> for Observation {
    fn from(model: observation::Model) -> Self {
        Self {
            id: model.id,
            patient_id: model.patient_id,
            age: model.age,
            bmi: model.bmi,
            systolic_bp: model.systolic_bp,
            diastolic_bp: model.diastolic_bp,
            total_cholesterol: model.total_cholesterol,
            hdl_cholesterol: model.hdl_cholesterol,
            ldl_cholesterol: model.ldl_cholesterol,
            triglycerides: model.triglycerides,
            smoker: model.smoker,
            physical_activity: model.physical_activity,
        }
    }
}

impl From<outcome_label::Model> for OutcomeLabel {
    fn from(model: outcome_label::Model) -> Self {
        Self {
            id: model.id,
            patient_id: model.patient_id,
            label: model.label,
            reference_date: model.reference_date,
            horizon_days: model.horizon_days,
        }
    }
}

impl TryFrom<risk_score::Model> for RiskScoreRecord {
    type Error = GenericError;

    fn try_from(model: risk_score::Model) -> Result<Self, Self::Error> {
        let band = RiskBand::from_str(&model.band)
            .map_err(|e| format!("Invalid band '{}' on risk score {}: {}", model.band, model.id, e))?;
        Ok(Self {
            id: model.id,
            patient_id: model.patient_id,
            score: model.score,
            band,
            high_risk: model.high_risk,
            scored_at: model.scored_at.and_utc(),
            model_name: model.model_name,
            model_version: model.model_version,
        })
    }
}

// Commit-event outbox drained by the processor
pub mod commit_event {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "commit_events")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub payload: Json,
        pub created_at: NaiveDateTime,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
