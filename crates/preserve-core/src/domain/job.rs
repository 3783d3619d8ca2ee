//! Preservation job: aggregate state of one run over one dataset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ids::{JobId, SubjectKey};
use super::item::Preservable;
use super::result::JobItemResult;

/// Job lifecycle.
///
/// State transitions:
/// - Running -> Completed (every item has a result, dataset persisted)
/// - Running -> Aborted (unexpected failure, or final persistence failed)
/// - Running -> Cancelled (explicit cancel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Aborted,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Running)
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: JobState,
    finished_at: Option<DateTime<Utc>>,
}

/// One preservation run.
///
/// Design:
/// - The key set of `items` is fixed at construction.
/// - Each value goes pending -> result exactly once, written only by the runner.
/// - `completed` is bumped after the map write, so it never runs ahead of the map.
#[derive(Debug)]
pub struct PreservationJob {
    job_id: JobId,
    subject: SubjectKey,
    dataset_name: String,
    registry_uid: String,

    /// Submission order, for display.
    order: Vec<Preservable>,
    items: RwLock<HashMap<Preservable, Option<JobItemResult>>>,
    completed: AtomicUsize,

    created_at: DateTime<Utc>,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
}

impl PreservationJob {
    pub fn new(
        job_id: JobId,
        dataset_name: impl Into<String>,
        registry_uid: impl Into<String>,
        items: Vec<Preservable>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let dataset_name = dataset_name.into();
        // 同じキーの項目は最初の 1 件だけ残す（order と map のキーを一致させる）
        let mut map = HashMap::with_capacity(items.len());
        let mut order = Vec::with_capacity(items.len());
        for item in items {
            if !map.contains_key(&item) {
                map.insert(item.clone(), None);
                order.push(item);
            }
        }
        Self {
            job_id,
            subject: SubjectKey::new(dataset_name.clone()),
            dataset_name,
            registry_uid: registry_uid.into(),
            order,
            items: RwLock::new(map),
            completed: AtomicUsize::new(0),
            created_at,
            lifecycle: Mutex::new(Lifecycle {
                state: JobState::Running,
                finished_at: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn subject(&self) -> &SubjectKey {
        &self.subject
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn registry_uid(&self) -> &str {
        &self.registry_uid
    }

    /// Items with a result. A liveness hint; the map is the source of truth.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.items.read().len()
    }

    pub fn state(&self) -> JobState {
        self.lifecycle.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().finished_at
    }

    /// Items in the order they were submitted.
    pub fn items(&self) -> &[Preservable] {
        &self.order
    }

    /// Read-only snapshot of the item -> result map (`None` = pending).
    pub fn item_results(&self) -> HashMap<Preservable, Option<JobItemResult>> {
        self.items.read().clone()
    }

    pub fn result_for(&self, preservable: &Preservable) -> Option<JobItemResult> {
        self.items.read().get(preservable).cloned().flatten()
    }

    pub fn pending(&self) -> usize {
        self.items.read().values().filter(|r| r.is_none()).count()
    }

    /// Request cancellation. In-flight tasks are left to finish; their results are dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fill in the result for its item.
    ///
    /// Returns false (and changes nothing) if the item is not part of this job
    /// or already has a result.
    pub(crate) fn record(&self, result: JobItemResult) -> bool {
        {
            let mut items = self.items.write();
            match items.get_mut(result.preservable()) {
                Some(slot) if slot.is_none() => *slot = Some(result),
                _ => return false,
            }
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Move to a terminal state. The first terminal state wins.
    pub(crate) fn finish(&self, state: JobState, at: DateTime<Utc>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_terminal() {
            return;
        }
        lifecycle.state = state;
        lifecycle.finished_at = Some(at);
    }
}
