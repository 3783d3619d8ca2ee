//! JobRunner - 1 ジョブ分のタスクを並行実行し、完了順に結果を取り込む
//!
//! # フロー
//! 1. `enumerate()` で準備済みのフォームと全ラベルをタスク化
//! 2. JoinSet に全タスクを spawn（上限があれば Semaphore で絞る）
//! 3. `join_next()` で完了順に取り出し、ジョブの map に記録
//! 4. 全件そろったらラベル更新 → データセット保存（ここだけ直列）
//!
//! StorageFailure は失敗結果として記録するだけで、ほかのタスクには波及しません。
//! それ以外（panic など）は run 全体を Aborted にします。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::config::PreservationConfig;
use crate::app::task::PreservationTask;
use crate::domain::{
    Dataset, GatewayError, JobItemResult, JobState, PreservationError, PreservationJob,
    StorageFailure,
};
use crate::ports::{Clock, DatasetRepository, Registry};

/// `None` = the task never started because the job was cancelled first.
type TaskOutput = Option<Result<JobItemResult, StorageFailure>>;

pub struct JobRunner {
    registry: Arc<dyn Registry>,
    repository: Arc<dyn DatasetRepository>,
    config: PreservationConfig,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(
        registry: Arc<dyn Registry>,
        repository: Arc<dyn DatasetRepository>,
        config: PreservationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            repository,
            config,
            clock,
        }
    }

    /// Forms with content (in dataset order), then every label.
    ///
    /// A form with nothing attached is not ready and is left out silently.
    /// Items sharing a key (e.g. two labels with the same cpid) are taken once.
    pub fn enumerate(dataset: &Dataset) -> Vec<PreservationTask> {
        let forms = dataset
            .forms()
            .iter()
            .filter(|form| form.content().is_ready())
            .map(|form| PreservationTask::manifest(dataset.name(), Arc::clone(form)));
        let labels = dataset
            .labels()
            .iter()
            .map(|label| PreservationTask::label(Arc::clone(label)));

        let mut seen = HashSet::new();
        forms
            .chain(labels)
            .filter(|task| {
                let fresh = seen.insert(task.preservable().key());
                if !fresh {
                    warn!(
                        dataset = dataset.name(),
                        item = %task.preservable(),
                        "duplicate item skipped"
                    );
                }
                fresh
            })
            .collect()
    }

    /// Drive `job` to a terminal state and return it.
    ///
    /// # Errors
    /// - `Unexpected` if a task panicked or was aborted
    /// - `Persistence` if the final label update or dataset save failed
    pub async fn run(
        &self,
        job: Arc<PreservationJob>,
        dataset: Arc<Dataset>,
        tasks: Vec<PreservationTask>,
    ) -> Result<JobState, PreservationError> {
        info!(
            job_id = %job.job_id(),
            dataset = job.dataset_name(),
            registry = job.registry_uid(),
            items = tasks.len(),
            "preservation job started"
        );

        let token = job.cancellation_token();
        let semaphore = self
            .config
            .max_concurrent_tasks()
            .map(|max| Arc::new(Semaphore::new(max.get())));

        let mut set: JoinSet<TaskOutput> = JoinSet::new();
        for task in tasks {
            let registry = Arc::clone(&self.registry);
            let semaphore = semaphore.clone();
            let token = token.clone();
            let settle_delay = self.config.settle_delay();

            set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => tokio::select! {
                        biased;
                        () = token.cancelled() => return None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };
                if token.is_cancelled() {
                    return None;
                }
                Some(task.execute(registry.as_ref(), settle_delay).await)
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                () = token.cancelled() => {
                    set.detach_all();
                    job.finish(JobState::Cancelled, self.clock.now());
                    warn!(
                        job_id = %job.job_id(),
                        completed = job.completed(),
                        total = job.total(),
                        "preservation job cancelled"
                    );
                    return Ok(JobState::Cancelled);
                }
                joined = set.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok(Some(Ok(result)))) => {
                    debug!(job_id = %job.job_id(), %result, "item preserved");
                    record(&job, result);
                }
                Some(Ok(Some(Err(failure)))) => {
                    error!(job_id = %job.job_id(), error = %failure, "item could not be preserved");
                    record(&job, JobItemResult::from(failure));
                }
                // cancelled before it started; the next iteration sees the token
                Some(Ok(None)) => {}
                Some(Err(join_error)) => {
                    set.detach_all();
                    job.finish(JobState::Aborted, self.clock.now());
                    error!(job_id = %job.job_id(), error = %join_error, "preservation run aborted");
                    return Err(PreservationError::Unexpected(join_error.to_string()));
                }
            }
        }

        if let Err(source) = self.reconcile(&dataset).await {
            job.finish(JobState::Aborted, self.clock.now());
            error!(job_id = %job.job_id(), error = %source, "persisting dataset failed");
            return Err(PreservationError::Persistence {
                dataset: dataset.name().to_string(),
                source,
            });
        }

        job.finish(JobState::Completed, self.clock.now());
        info!(
            job_id = %job.job_id(),
            dataset = job.dataset_name(),
            completed = job.completed(),
            total = job.total(),
            "preservation job completed"
        );
        Ok(JobState::Completed)
    }

    async fn reconcile(&self, dataset: &Dataset) -> Result<(), GatewayError> {
        for label in dataset.labels() {
            self.repository
                .update_dataset_label(&label.to_rep_info_label(), label.cpid())
                .await?;
        }
        self.repository.save(dataset).await
    }
}

fn record(job: &PreservationJob, result: JobItemResult) {
    let preservable = result.preservable().clone();
    if !job.record(result) {
        warn!(
            job_id = %job.job_id(),
            item = %preservable,
            "result not recorded, item is not pending"
        );
    }
}
