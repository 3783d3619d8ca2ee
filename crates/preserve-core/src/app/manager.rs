//! PreservationManager - ジョブの受付・一覧・削除
//!
//! # 学習ポイント
//! - グローバル singleton にせず、呼び出し側が 1 つ作って `Arc` で共有する
//! - 「同じデータセットのジョブは同時に 1 つ」は lock 内の check-and-insert で保証
//! - Runner は `tokio::spawn` で切り離す（`preserve()` は完了を待たない）

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::app::config::PreservationConfig;
use crate::app::runner::JobRunner;
use crate::domain::{Dataset, GatewayError, PreservationError, PreservationJob, SubjectKey};
use crate::ports::{Clock, DatasetRepository, IdGenerator, Registry, SystemClock, UlidGenerator};

pub struct PreservationManager {
    repository: Arc<dyn DatasetRepository>,
    config: PreservationConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    jobs: Mutex<BTreeMap<SubjectKey, Arc<PreservationJob>>>,
}

impl PreservationManager {
    pub fn new(repository: Arc<dyn DatasetRepository>, config: PreservationConfig) -> Self {
        Self {
            repository,
            config,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Start preserving `dataset` into `registry`.
    ///
    /// Returns `Ok(false)` without doing anything if a job for the same dataset
    /// is already in the table. The run itself happens in the background.
    ///
    /// # Errors
    /// - `Authorization` if the registry cannot be made writable
    /// - `Setup` for any other failure while preparing the registry
    pub async fn preserve(
        &self,
        dataset: Arc<Dataset>,
        registry: Arc<dyn Registry>,
    ) -> Result<bool, PreservationError> {
        ensure_writable(registry.as_ref()).await?;

        let tasks = JobRunner::enumerate(&dataset);
        let job = Arc::new(PreservationJob::new(
            self.ids.generate_job_id(),
            dataset.name(),
            registry.location_uid(),
            tasks.iter().map(|task| task.preservable()).collect(),
            self.clock.now(),
        ));

        {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(job.subject()) {
                warn!(dataset = dataset.name(), "preservation job already exists");
                return Ok(false);
            }
            jobs.insert(job.subject().clone(), Arc::clone(&job));
        }
        info!(job_id = %job.job_id(), dataset = dataset.name(), "preservation job submitted");

        let runner = JobRunner::new(
            registry,
            Arc::clone(&self.repository),
            self.config.clone(),
            Arc::clone(&self.clock),
        );
        tokio::spawn(async move {
            let job_id = job.job_id();
            match runner.run(job, dataset, tasks).await {
                Ok(state) => debug!(%job_id, ?state, "preservation run finished"),
                Err(err) => debug!(%job_id, error = %err, "preservation run failed"),
            }
        });
        Ok(true)
    }

    /// Snapshot of all jobs, ordered by dataset name.
    pub fn jobs(&self) -> Vec<Arc<PreservationJob>> {
        self.jobs.lock().values().cloned().collect()
    }

    /// # Errors
    /// `NotFound` if no job exists for `subject`.
    pub fn job(&self, subject: &SubjectKey) -> Result<Arc<PreservationJob>, PreservationError> {
        self.jobs
            .lock()
            .get(subject)
            .cloned()
            .ok_or_else(|| PreservationError::NotFound(subject.clone()))
    }

    /// Remove the job from the table. A run still in progress keeps going.
    pub fn delete_job(&self, subject: &SubjectKey) -> bool {
        let removed = self.jobs.lock().remove(subject).is_some();
        if removed {
            info!(dataset = %subject, "preservation job deleted");
        }
        removed
    }

    /// Ask the job's runner to stop. The job stays in the table.
    ///
    /// `true` only means the request was made. A run that has already
    /// collected every result and is persisting the dataset still ends
    /// `Completed`.
    pub fn cancel(&self, subject: &SubjectKey) -> bool {
        match self.jobs.lock().get(subject) {
            Some(job) if !job.is_terminal() => {
                job.cancel();
                info!(dataset = %subject, "preservation job cancellation requested");
                true
            }
            _ => false,
        }
    }
}

async fn ensure_writable(registry: &dyn Registry) -> Result<(), PreservationError> {
    if registry.is_writable().await {
        return Ok(());
    }
    debug!(registry = registry.location_uid(), "registry not writable, authorising");
    registry
        .authorise_for_read_write()
        .await
        .map_err(|source| match source {
            GatewayError::Unauthorized(_) => PreservationError::Authorization {
                registry: registry.location_uid().to_string(),
                source,
            },
            other => PreservationError::Setup(other),
        })?;

    if registry.is_writable().await {
        Ok(())
    } else {
        Err(PreservationError::Authorization {
            registry: registry.location_uid().to_string(),
            source: GatewayError::Unauthorized("still read-only after authorisation".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::domain::{ContentHolder, Cpid, DatasetLabel, FormItem, JobState};
    use crate::impls::{InMemoryDatasetRepository, InMemoryRegistry};
    use crate::ports::FixedClock;

    fn manager(repository: Arc<InMemoryDatasetRepository>) -> PreservationManager {
        PreservationManager::new(
            repository,
            PreservationConfig::default().with_settle_delay(Duration::ZERO),
        )
    }

    fn dataset(name: &str) -> Arc<Dataset> {
        Arc::new(
            Dataset::new(name)
                .with_form(FormItem::new(
                    "scan",
                    Cpid::new(format!("ril-{name}-scan")),
                    ContentHolder::embedded(b"data".to_vec(), "scan.txt", "text/plain"),
                ))
                .with_label(DatasetLabel::new(Cpid::new(format!("ril-{name}")), "structure")),
        )
    }

    async fn wait_terminal(job: &PreservationJob) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !job.is_terminal() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let repository = Arc::new(InMemoryDatasetRepository::new());
        let manager = manager(Arc::clone(&repository));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));

        assert!(manager.preserve(dataset("DS1"), registry).await.unwrap());

        let job = manager.job(&SubjectKey::new("DS1")).unwrap();
        assert_eq!(job.registry_uid(), "reg-a");
        wait_terminal(&job).await;

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.completed(), 2);
        assert_eq!(repository.saves().len(), 1);
    }

    #[tokio::test]
    async fn second_submit_for_same_dataset_is_refused() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));

        assert!(manager.preserve(dataset("DS1"), registry.clone()).await.unwrap());
        assert!(!manager.preserve(dataset("DS1"), registry.clone()).await.unwrap());

        assert_eq!(manager.jobs().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_existing_job_only() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));
        manager.preserve(dataset("DS1"), registry.clone()).await.unwrap();

        assert!(!manager.delete_job(&SubjectKey::new("missing")));
        assert!(manager.delete_job(&SubjectKey::new("DS1")));
        assert!(manager.jobs().is_empty());

        // 削除後は同じデータセットを再投入できる
        assert!(manager.preserve(dataset("DS1"), registry).await.unwrap());
    }

    #[tokio::test]
    async fn refused_authorisation_creates_no_job() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::read_only("reg-ro"));
        registry.deny_authorisation();

        let err = manager.preserve(dataset("DS1"), registry).await.unwrap_err();

        assert!(matches!(
            err,
            PreservationError::Authorization { ref registry, .. } if registry == "reg-ro"
        ));
        assert!(manager.jobs().is_empty());
    }

    #[tokio::test]
    async fn read_only_registry_is_authorised_before_the_run() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::read_only("reg-ro"));

        assert!(manager.preserve(dataset("DS1"), registry.clone()).await.unwrap());
        assert!(registry.is_writable().await);

        let job = manager.job(&SubjectKey::new("DS1")).unwrap();
        wait_terminal(&job).await;
        assert_eq!(job.state(), JobState::Completed);
    }

    #[tokio::test]
    async fn jobs_are_listed_by_dataset_name() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));
        for name in ["gamma", "alpha", "beta"] {
            manager.preserve(dataset(name), registry.clone()).await.unwrap();
        }

        let names: Vec<_> = manager
            .jobs()
            .iter()
            .map(|job| job.dataset_name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn job_timestamps_come_from_the_clock() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()))
            .with_clock(Arc::new(FixedClock::new(at)));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));

        manager.preserve(dataset("DS1"), registry).await.unwrap();
        let job = manager.job(&SubjectKey::new("DS1")).unwrap();
        wait_terminal(&job).await;

        assert_eq!(job.created_at(), at);
        assert_eq!(job.finished_at(), Some(at));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));

        let err = manager.job(&SubjectKey::new("nope")).unwrap_err();
        assert!(matches!(err, PreservationError::NotFound(ref key) if key.as_str() == "nope"));
        assert!(!manager.cancel(&SubjectKey::new("nope")));
    }

    #[tokio::test]
    async fn cancel_stops_a_running_job() {
        let manager = manager(Arc::new(InMemoryDatasetRepository::new()));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));
        registry.delay_upload_of("scan.txt", Duration::from_secs(30));

        manager.preserve(dataset("DS1"), registry).await.unwrap();
        let subject = SubjectKey::new("DS1");
        assert!(manager.cancel(&subject));

        let job = manager.job(&subject).unwrap();
        wait_terminal(&job).await;
        assert_eq!(job.state(), JobState::Cancelled);
        // 終了済みのジョブは再度キャンセルできない
        assert!(!manager.cancel(&subject));
    }

    #[tokio::test]
    async fn cancel_during_persisting_is_requested_but_run_completes() {
        let repository = Arc::new(InMemoryDatasetRepository::new());
        repository.delay_saves(Duration::from_millis(200));
        let manager = manager(Arc::clone(&repository));
        let registry = Arc::new(InMemoryRegistry::new("reg-a"));

        manager.preserve(dataset("DS1"), registry).await.unwrap();
        let subject = SubjectKey::new("DS1");
        let job = manager.job(&subject).unwrap();
        // ラベル更新が記録されたら save の途中
        tokio::time::timeout(Duration::from_secs(5), async {
            while repository.label_updates().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(manager.cancel(&subject));
        wait_terminal(&job).await;

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.completed(), job.total());
        assert_eq!(repository.saves().len(), 1);
    }
}
