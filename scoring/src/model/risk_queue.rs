use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{ModelId, Patient, RiskScoreRecord};

pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskQueueOrder {
    #[default]
    ScoreDesc,
    ScoreAsc,
    TimeDesc,
    TimeAsc,
}

/// Review-queue query over the current (latest) score of every patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskQueueFilter {
    pub high_only: bool,
    pub min_score: Option<f64>,
    /// Case-insensitive match on first or last name.
    pub search: Option<String>,
    pub order: RiskQueueOrder,
    /// 1-based; clamped into the valid range.
    pub page: usize,
    pub page_size: usize,
}

impl Default for RiskQueueFilter {
    fn default() -> Self {
        Self {
            high_only: false,
            min_score: None,
            search: None,
            order: RiskQueueOrder::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskQueueEntry {
    pub record: RiskScoreRecord,
    pub patient: Patient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskQueuePage {
    pub entries: Vec<RiskQueueEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub num_pages: usize,
}

/// Latest record per patient: highest `scored_at`, ties broken by highest id.
pub fn latest_per_patient<I>(records: I) -> Vec<RiskScoreRecord>
where
    I: IntoIterator<Item = RiskScoreRecord>,
{
    let mut latest: HashMap<ModelId, RiskScoreRecord> = HashMap::new();
    for record in records {
        let newer = latest.get(&record.patient_id).map_or(true, |current| {
            (current.scored_at, current.id) < (record.scored_at, record.id)
        });
        if newer {
            latest.insert(record.patient_id, record);
        }
    }
    latest.into_values().collect()
}

impl RiskQueueFilter {
    fn matches(&self, record: &RiskScoreRecord, patient: &Patient) -> bool {
        if self.high_only && !record.high_risk {
            return false;
        }
        if let Some(min_score) = self.min_score {
            if record.score < min_score {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                patient.first_name.to_lowercase().contains(&needle)
                    || patient.last_name.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    fn compare(&self, a: &RiskScoreRecord, b: &RiskScoreRecord) -> Ordering {
        let by_score = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
        let by_time = a.scored_at.cmp(&b.scored_at);
        let primary = match self.order {
            RiskQueueOrder::ScoreDesc => by_score.reverse(),
            RiskQueueOrder::ScoreAsc => by_score,
            RiskQueueOrder::TimeDesc => by_time.reverse(),
            RiskQueueOrder::TimeAsc => by_time,
        };
        primary.then_with(|| a.patient_id.cmp(&b.patient_id))
    }

    /// Builds one page of the queue from every stored record.
    ///
    /// Records whose patient is unknown are dropped.
    pub fn apply<I>(&self, records: I, patients: &HashMap<ModelId, Patient>) -> RiskQueuePage
    where
        I: IntoIterator<Item = RiskScoreRecord>,
    {
        let mut rows: Vec<RiskQueueEntry> = latest_per_patient(records)
            .into_iter()
            .filter_map(|record| {
                let patient = patients.get(&record.patient_id)?;
                self.matches(&record, patient).then(|| RiskQueueEntry {
                    record,
                    patient: patient.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| self.compare(&a.record, &b.record));

        let page_size = self.page_size.max(1);
        let total = rows.len();
        let num_pages = total.div_ceil(page_size).max(1);
        let page = self.page.clamp(1, num_pages);
        let entries = rows
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();

        RiskQueuePage {
            entries,
            page,
            page_size,
            total,
            num_pages,
        }
    }
}
