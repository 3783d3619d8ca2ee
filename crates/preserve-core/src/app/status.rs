//! Status - 進捗表示用のビュー
//!
//! ジョブの内部構造（map やロック）を見せずに、
//! UI / CLI が JSON で出せる形に詰め直します。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Cpid, JobId, JobState, PreservableKind, PreservationJob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub dataset_name: String,
    pub registry_uid: String,
    pub state: JobState,
    pub completed: usize,
    pub total: usize,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemStatus>,
}

/// One row per item, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub kind: PreservableKind,
    pub name: String,
    /// `None` while pending.
    pub succeeded: Option<bool>,
    pub identifier: Option<Cpid>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn from_job(job: &PreservationJob) -> Self {
        let results = job.item_results();
        let items = job
            .items()
            .iter()
            .map(|preservable| {
                let result = results.get(preservable).and_then(Option::as_ref);
                ItemStatus {
                    kind: preservable.kind(),
                    name: preservable.name().to_string(),
                    succeeded: result.map(|r| r.is_succeeded()),
                    identifier: result
                        .and_then(|r| r.preserved_object())
                        .map(|stored| stored.cpid().clone())
                        .or_else(|| preservable.identifier()),
                    error: result.and_then(|r| r.thrown()).map(ToString::to_string),
                }
            })
            .collect();

        Self {
            job_id: job.job_id(),
            dataset_name: job.dataset_name().to_string(),
            registry_uid: job.registry_uid().to_string(),
            state: job.state(),
            completed: job.completed(),
            total: job.total(),
            created_at: job.created_at(),
            finished_at: job.finished_at(),
            items,
        }
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.succeeded == Some(false))
            .count()
    }
}
