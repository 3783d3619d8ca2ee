//! InMemoryDatasetRepository - 開発・テスト用の永続化
//!
//! 呼ばれた内容を記録するだけです。save 時点の preserved フラグを
//! スナップショットとして残すので、「全項目完了後に一度だけ保存」を検証できます。

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Cpid, Dataset, GatewayError, RepInfoLabel};
use crate::ports::DatasetRepository;

/// State of a dataset at the moment it was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDataset {
    pub name: String,
    pub preserved_forms: usize,
    pub preserved_labels: usize,
    pub manifest_cpids: Vec<Option<Cpid>>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    label_updates: Vec<(Cpid, RepInfoLabel)>,
    saves: Vec<SavedDataset>,
    fail_saves: bool,
    save_delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct InMemoryDatasetRepository {
    state: Mutex<RepositoryState>,
}

impl InMemoryDatasetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self) {
        self.state.lock().fail_saves = true;
    }

    /// `save` sleeps for `delay` before recording (outside the lock).
    pub fn delay_saves(&self, delay: Duration) {
        self.state.lock().save_delay = Some(delay);
    }

    pub fn label_updates(&self) -> Vec<(Cpid, RepInfoLabel)> {
        self.state.lock().label_updates.clone()
    }

    pub fn saves(&self) -> Vec<SavedDataset> {
        self.state.lock().saves.clone()
    }
}

#[async_trait]
impl DatasetRepository for InMemoryDatasetRepository {
    async fn update_dataset_label(
        &self,
        label: &RepInfoLabel,
        cpid: &Cpid,
    ) -> Result<(), GatewayError> {
        self.state
            .lock()
            .label_updates
            .push((cpid.clone(), label.clone()));
        Ok(())
    }

    async fn save(&self, dataset: &Dataset) -> Result<(), GatewayError> {
        let delay = self.state.lock().save_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.fail_saves {
            return Err(GatewayError::Transport("database unavailable".into()));
        }
        state.saves.push(SavedDataset {
            name: dataset.name().to_string(),
            preserved_forms: dataset.forms().iter().filter(|f| f.is_preserved()).count(),
            preserved_labels: dataset.labels().iter().filter(|l| l.is_preserved()).count(),
            manifest_cpids: dataset.forms().iter().map(|f| f.manifest_cpid()).collect(),
        });
        Ok(())
    }
}
