use crate::error::ScoringError;
use crate::model::sea_orm_storage_model as entities;
use crate::model::*;
use crate::storage::common::{CommonStorage, RecordStorage};
use async_trait::async_trait;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    AccessMode, ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
    DatabaseTransaction, EntityTrait, IsolationLevel, NotSet, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use std::collections::HashMap;
use tracing::debug;

const INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct ProdStorage {
    pub db: DatabaseConnection,
}

impl ProdStorage {
    pub async fn new(database_url: &str) -> Result<Self, GenericError> {
        let db = Database::connect(database_url).await?;
        Ok(Self { db })
    }

    /// Read-only snapshot so multi-query reads see a single point in time.
    async fn snapshot(&self) -> Result<DatabaseTransaction, GenericError> {
        Ok(self
            .db
            .begin_with_config(Some(IsolationLevel::RepeatableRead), Some(AccessMode::ReadOnly))
            .await?)
    }

    fn score_active_model(score: &NewRiskScore) -> entities::risk_score::ActiveModel {
        entities::risk_score::ActiveModel {
            id: NotSet,
            patient_id: Set(score.patient_id),
            score: Set(score.score),
            band: Set(score.band.to_string()),
            high_risk: Set(score.high_risk),
            model_name: Set(score.model.as_ref().map(|m| m.name.clone())),
            model_version: Set(score.model.as_ref().map(|m| m.version.clone())),
            scored_at: Set(score.scored_at.naive_utc()),
        }
    }

    fn with_patient(
        observation: entities::observation::Model,
        patient: Option<entities::patient::Model>,
    ) -> Result<(Observation, Patient), GenericError> {
        let patient_id = observation.patient_id;
        let patient = patient.ok_or(ScoringError::PatientNotFound(patient_id))?;
        Ok((observation.into(), patient.into()))
    }

    async fn latest_observations_in(
        txn: &DatabaseTransaction,
    ) -> Result<Vec<(Observation, Patient)>, GenericError> {
        let latest: Vec<(i64, i64)> = entities::observation::Entity::find()
            .select_only()
            .column(entities::observation::Column::PatientId)
            .column_as(entities::observation::Column::Id.max(), "max_id")
            .group_by(entities::observation::Column::PatientId)
            .into_tuple()
            .all(txn)
            .await?;
        let ids: Vec<i64> = latest.into_iter().map(|(_, id)| id).collect();
        debug!("Latest observation ids for {} patients", ids.len());

        let rows = if ids.is_empty() {
            Vec::new()
        } else {
            entities::observation::Entity::find()
                .filter(entities::observation::Column::Id.is_in(ids))
                .order_by_asc(entities::observation::Column::PatientId)
                .find_also_related(entities::patient::Entity)
                .all(txn)
                .await?
        };

        rows.into_iter()
            .map(|(observation, patient)| Self::with_patient(observation, patient))
            .collect()
    }

    async fn labels_in<C: ConnectionTrait>(conn: &C) -> Result<Vec<OutcomeLabel>, GenericError> {
        let labels = entities::outcome_label::Entity::find()
            .order_by_asc(entities::outcome_label::Column::Id)
            .all(conn)
            .await?;
        Ok(labels.into_iter().map(OutcomeLabel::from).collect())
    }
}

#[async_trait]
impl CommonStorage for ProdStorage {
    async fn latest_observation(
        &self,
        patient_id: ModelId,
    ) -> Result<Option<(Observation, Patient)>, GenericError> {
        let txn = self.snapshot().await?;
        let row = entities::observation::Entity::find()
            .filter(entities::observation::Column::PatientId.eq(patient_id))
            .order_by_desc(entities::observation::Column::Id)
            .find_also_related(entities::patient::Entity)
            .one(&txn)
            .await?;
        txn.commit().await?;

        row.map(|(observation, patient)| Self::with_patient(observation, patient))
            .transpose()
    }

    async fn latest_observations(&self) -> Result<Vec<(Observation, Patient)>, GenericError> {
        let txn = self.snapshot().await?;
        let latest = Self::latest_observations_in(&txn).await?;
        txn.commit().await?;
        Ok(latest)
    }

    async fn get_labels(&self) -> Result<Vec<OutcomeLabel>, GenericError> {
        Self::labels_in(&self.db).await
    }

    async fn training_snapshot(&self) -> Result<TrainingSnapshot, GenericError> {
        let txn = self.snapshot().await?;
        let latest = Self::latest_observations_in(&txn).await?;
        let labels = Self::labels_in(&txn).await?;
        txn.commit().await?;
        Ok(TrainingSnapshot { latest, labels })
    }

    async fn append_score(&self, score: &NewRiskScore) -> Result<RiskScoreRecord, GenericError> {
        let saved = Self::score_active_model(score).insert(&self.db).await?;
        RiskScoreRecord::try_from(saved)
    }

    async fn append_scores(&self, scores: &[NewRiskScore]) -> Result<usize, GenericError> {
        if scores.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin().await?;
        for chunk in scores.chunks(INSERT_CHUNK) {
            entities::risk_score::Entity::insert_many(chunk.iter().map(Self::score_active_model))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(scores.len())
    }

    async fn risk_queue(&self, filter: &RiskQueueFilter) -> Result<RiskQueuePage, GenericError> {
        // TODO: select the latest record per patient in SQL (DISTINCT ON) instead of loading every score.
        let txn = self.snapshot().await?;
        let scores = entities::risk_score::Entity::find()
            .order_by_asc(entities::risk_score::Column::Id)
            .all(&txn)
            .await?;
        let patients = entities::patient::Entity::find().all(&txn).await?;
        txn.commit().await?;

        let records = scores
            .into_iter()
            .map(RiskScoreRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let patients: HashMap<ModelId, Patient> = patients
            .into_iter()
            .map(|p| (p.id, Patient::from(p)))
            .collect();
        Ok(filter.apply(records, &patients))
    }

    async fn score_history(&self, patient_id: ModelId) -> Result<Vec<RiskScoreRecord>, GenericError> {
        entities::risk_score::Entity::find()
            .filter(entities::risk_score::Column::PatientId.eq(patient_id))
            .order_by_asc(entities::risk_score::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(RiskScoreRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl RecordStorage for ProdStorage {
    async fn save_patient(&self, patient: &Patient) -> Result<ModelId, GenericError> {
        let model = entities::patient::ActiveModel {
            id: if patient.id == 0 { NotSet } else { Set(patient.id) },
            first_name: Set(patient.first_name.clone()),
            last_name: Set(patient.last_name.clone()),
            date_of_birth: Set(patient.date_of_birth),
        };
        Ok(model.insert(&self.db).await?.id)
    }

    async fn save_observation(&self, observation: &Observation) -> Result<ModelId, GenericError> {
        let model = entities::observation::ActiveModel {
            id: NotSet,
            patient_id: Set(observation.patient_id),
            age: Set(observation.age),
            bmi: Set(observation.bmi),
            systolic_bp: Set(observation.systolic_bp),
            diastolic_bp: Set(observation.diastolic_bp),
            total_cholesterol: Set(observation.total_cholesterol),
            hdl_cholesterol: Set(observation.hdl_cholesterol),
            ldl_cholesterol: Set(observation.ldl_cholesterol),
            triglycerides: Set(observation.triglycerides),
            smoker: Set(observation.smoker),
            physical_activity: Set(observation.physical_activity.clone()),
            created_at: Set(chrono::Utc::now().naive_utc()),
        };
        Ok(model.insert(&self.db).await?.id)
    }

    async fn save_label(&self, label: &OutcomeLabel) -> Result<ModelId, GenericError> {
        use entities::outcome_label::{ActiveModel, Column, Entity};

        let reference_date: SimpleExpr = match label.reference_date {
            Some(date) => Column::ReferenceDate.eq(date),
            None => Column::ReferenceDate.is_null(),
        };
        let horizon: SimpleExpr = match label.horizon_days {
            Some(days) => Column::HorizonDays.eq(days),
            None => Column::HorizonDays.is_null(),
        };
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;
        let existing = Entity::find()
            .filter(Column::PatientId.eq(label.patient_id))
            .filter(reference_date)
            .filter(horizon)
            .one(&txn)
            .await?;

        let saved = match existing {
            Some(current) => {
                let mut model: ActiveModel = current.into();
                model.label = Set(label.label);
                model.updated_at = Set(now);
                model.update(&txn).await?
            }
            None => {
                ActiveModel {
                    id: NotSet,
                    patient_id: Set(label.patient_id),
                    label: Set(label.label),
                    reference_date: Set(label.reference_date),
                    horizon_days: Set(label.horizon_days),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };
        txn.commit().await?;
        Ok(saved.id)
    }
}
