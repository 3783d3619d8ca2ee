//! Preservation tasks - 1 項目を 1 レジストリへ保存する単位
//!
//! 2 種類のタスクは状態を共有しないので、基底クラスではなく enum で表します。
//! どちらも失敗は `StorageFailure`（元の項目つき）で返し、panic しません。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace};
use url::Url;

use crate::app::packaging;
use crate::domain::{
    ContentHolder, DatasetLabel, FormItem, JobItemResult, Manifest, Preservable, RegistryObject,
    StorageCause, StorageFailure,
};
use crate::ports::Registry;

#[derive(Debug, Clone)]
pub enum PreservationTask {
    Manifest(ManifestTask),
    Label(LabelTask),
}

impl PreservationTask {
    pub fn manifest(dataset_name: impl Into<String>, form: Arc<FormItem>) -> Self {
        Self::Manifest(ManifestTask {
            dataset_name: dataset_name.into(),
            form,
        })
    }

    pub fn label(label: Arc<DatasetLabel>) -> Self {
        Self::Label(LabelTask { label })
    }

    pub fn preservable(&self) -> Preservable {
        match self {
            PreservationTask::Manifest(task) => Preservable::Manifest(Arc::clone(&task.form)),
            PreservationTask::Label(task) => Preservable::Label(Arc::clone(&task.label)),
        }
    }

    /// Preserve the item.
    ///
    /// # Errors
    /// Any packaging, upload, submit or confirmation failure, tied to this item.
    pub async fn execute(
        self,
        registry: &dyn Registry,
        settle_delay: Duration,
    ) -> Result<JobItemResult, StorageFailure> {
        let preservable = self.preservable();
        let outcome = match &self {
            PreservationTask::Manifest(task) => task.run(registry, settle_delay).await,
            PreservationTask::Label(task) => task.run(registry, settle_delay).await,
        };
        match outcome {
            Ok(stored) => Ok(JobItemResult::preserved(preservable, stored)),
            Err(cause) => Err(StorageFailure::new(preservable, cause)),
        }
    }
}

/// Upload (if needed) a form's content and register its manifest.
#[derive(Debug, Clone)]
pub struct ManifestTask {
    dataset_name: String,
    form: Arc<FormItem>,
}

impl ManifestTask {
    /// `<dataset>-<form>[-<item file name>]`
    pub fn manifest_name(&self) -> String {
        let mut name = format!("{}-{}", self.dataset_name, self.form.name());
        if let Some(item_file_name) = self.form.item_file_name()
            && !item_file_name.trim().is_empty()
        {
            name.push('-');
            name.push_str(item_file_name.trim());
        }
        name
    }

    #[instrument(skip_all, fields(form = self.form.name()))]
    async fn run(
        &self,
        registry: &dyn Registry,
        settle_delay: Duration,
    ) -> Result<RegistryObject, StorageCause> {
        trace!("manifest task started");

        let (location, ril_cpid) = match self.form.content() {
            ContentHolder::Embedded { .. } => {
                trace!("content is a bytestream");
                let upload = packaging::prepare_upload(&self.form)?;
                let location = registry
                    .store_content(upload.bytes, &upload.file_name, &upload.content_type)
                    .await?;
                (location, upload.ril_cpid)
            }
            ContentHolder::Reference { uri } => {
                trace!("content is a reference");
                (uri.clone(), self.form.ril_cpid().clone())
            }
            ContentHolder::Empty => return Err(StorageCause::NoContent),
        };

        let location_url = Url::parse(&location).map_err(|source| StorageCause::InvalidLocation {
            location: location.clone(),
            source,
        })?;

        // 以前の試行で割り当て済みの ID があれば再利用する
        let mut manifest = match self.form.manifest_cpid() {
            Some(existing) => Manifest::new(existing, self.form.ril_cpid().clone()),
            None => Manifest::new(registry.allocate_identifier().await?, ril_cpid),
        };
        let manifest_name = self.manifest_name();
        debug!(manifest = %manifest_name, %location, "creating manifest");
        manifest.resource_name = Some(manifest_name);
        manifest.location = Some(location_url);
        manifest
            .categories
            .extend(self.form.categories().iter().cloned());

        debug!(
            cpid = %manifest.manifest_cpid,
            registry = registry.location_uid(),
            "storing manifest"
        );
        registry.submit_manifest(&manifest).await?;
        settle(settle_delay).await;
        let stored = registry.fetch_manifest(&manifest.manifest_cpid).await?;

        self.form.record_preserved(&stored.manifest_cpid);
        trace!("manifest task finished");
        Ok(RegistryObject::Manifest(stored))
    }
}

/// Submit a descriptive label and copy back its confirmed version.
#[derive(Debug, Clone)]
pub struct LabelTask {
    label: Arc<DatasetLabel>,
}

impl LabelTask {
    #[instrument(skip_all, fields(label = %self.label.cpid()))]
    async fn run(
        &self,
        registry: &dyn Registry,
        settle_delay: Duration,
    ) -> Result<RegistryObject, StorageCause> {
        trace!("label task started");
        registry
            .submit_label(&self.label.to_rep_info_label())
            .await?;
        settle(settle_delay).await;
        let stored = registry.fetch_label(self.label.cpid()).await?;

        self.label.record_preserved(stored.version);
        debug!(registry = registry.location_uid(), "preserved label");
        Ok(RegistryObject::Label(stored))
    }
}

/// Read-after-write workaround; not a correctness bound.
async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
