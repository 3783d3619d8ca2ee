//! InMemoryRegistry - 開発・テスト用のレジストリ
//!
//! # 学習ポイント
//! - `&self` のままで故障注入できるよう、状態は Mutex の中に置く
//! - 遅延は lock の外で sleep（ロック跨ぎ await しない）

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{Cpid, GatewayError, Manifest, RepInfoLabel};
use crate::ports::{IdGenerator, Registry, SystemClock, UlidGenerator};

/// One uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub location: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct RegistryState {
    writable: bool,
    deny_authorisation: bool,

    contents: Vec<StoredContent>,
    manifests: HashMap<Cpid, Manifest>,
    labels: HashMap<Cpid, RepInfoLabel>,

    allocations: usize,
    manifest_submits: usize,
    label_submits: usize,

    failing_uploads: HashSet<String>,
    failing_manifests: HashSet<String>,
    failing_labels: HashSet<Cpid>,
    unreadable_manifests: HashSet<Cpid>,
    upload_delays: HashMap<String, Duration>,
}

/// In-memory `Registry` with failure injection and call recording.
pub struct InMemoryRegistry {
    uid: String,
    ids: Box<dyn IdGenerator>,
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    /// Writable registry. `uid` must be usable as a URL host (it appears in locations).
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ids: Box::new(UlidGenerator::new(SystemClock)),
            state: Mutex::new(RegistryState {
                writable: true,
                ..RegistryState::default()
            }),
        }
    }

    /// Registry that needs `authorise_for_read_write` before it accepts writes.
    pub fn read_only(uid: impl Into<String>) -> Self {
        let registry = Self::new(uid);
        registry.state.lock().writable = false;
        registry
    }

    pub fn deny_authorisation(&self) {
        self.state.lock().deny_authorisation = true;
    }

    pub fn fail_upload_of(&self, file_name: impl Into<String>) {
        self.state.lock().failing_uploads.insert(file_name.into());
    }

    /// Reject manifests whose resource name equals `resource_name`.
    pub fn fail_manifest_named(&self, resource_name: impl Into<String>) {
        self.state
            .lock()
            .failing_manifests
            .insert(resource_name.into());
    }

    /// Accept submits for `cpid` but never show them to `fetch_manifest`.
    pub fn lose_manifest_reads(&self, cpid: Cpid) {
        self.state.lock().unreadable_manifests.insert(cpid);
    }

    pub fn fail_label(&self, cpid: Cpid) {
        self.state.lock().failing_labels.insert(cpid);
    }

    pub fn delay_upload_of(&self, file_name: impl Into<String>, delay: Duration) {
        self.state
            .lock()
            .upload_delays
            .insert(file_name.into(), delay);
    }

    pub fn contents(&self) -> Vec<StoredContent> {
        self.state.lock().contents.clone()
    }

    pub fn manifest(&self, cpid: &Cpid) -> Option<Manifest> {
        self.state.lock().manifests.get(cpid).cloned()
    }

    pub fn manifests(&self) -> Vec<Manifest> {
        self.state.lock().manifests.values().cloned().collect()
    }

    pub fn label(&self, cpid: &Cpid) -> Option<RepInfoLabel> {
        self.state.lock().labels.get(cpid).cloned()
    }

    pub fn allocations(&self) -> usize {
        self.state.lock().allocations
    }

    pub fn manifest_submits(&self) -> usize {
        self.state.lock().manifest_submits
    }

    pub fn label_submits(&self) -> usize {
        self.state.lock().label_submits
    }

    fn ensure_writable(state: &RegistryState) -> Result<(), GatewayError> {
        if state.writable {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized("registry is read-only".into()))
        }
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    fn location_uid(&self) -> &str {
        &self.uid
    }

    async fn is_writable(&self) -> bool {
        self.state.lock().writable
    }

    async fn authorise_for_read_write(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.deny_authorisation {
            return Err(GatewayError::Unauthorized(format!(
                "write access to '{}' refused",
                self.uid
            )));
        }
        state.writable = true;
        Ok(())
    }

    async fn store_content(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        let delay = self.state.lock().upload_delays.get(file_name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        Self::ensure_writable(&state)?;
        if state.failing_uploads.contains(file_name) {
            return Err(GatewayError::Transport(format!(
                "upload of '{file_name}' interrupted"
            )));
        }
        let location = format!("mem://{}/content/{}", self.uid, state.contents.len() + 1);
        state.contents.push(StoredContent {
            location: location.clone(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(location)
    }

    async fn allocate_identifier(&self) -> Result<Cpid, GatewayError> {
        let cpid = self.ids.generate_cpid();
        self.state.lock().allocations += 1;
        Ok(cpid)
    }

    async fn submit_manifest(&self, manifest: &Manifest) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        Self::ensure_writable(&state)?;
        state.manifest_submits += 1;
        if let Some(name) = &manifest.resource_name
            && state.failing_manifests.contains(name)
        {
            return Err(GatewayError::Rejected(format!("manifest '{name}' rejected")));
        }
        let version = state
            .manifests
            .get(&manifest.manifest_cpid)
            .map_or(1, |prev| prev.version + 1);
        let mut stored = manifest.clone();
        stored.version = version;
        state.manifests.insert(stored.manifest_cpid.clone(), stored);
        Ok(())
    }

    async fn fetch_manifest(&self, cpid: &Cpid) -> Result<Manifest, GatewayError> {
        let state = self.state.lock();
        if state.unreadable_manifests.contains(cpid) {
            return Err(GatewayError::NotFound(cpid.to_string()));
        }
        state
            .manifests
            .get(cpid)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(cpid.to_string()))
    }

    async fn submit_label(&self, label: &RepInfoLabel) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        Self::ensure_writable(&state)?;
        state.label_submits += 1;
        if state.failing_labels.contains(&label.cpid) {
            return Err(GatewayError::Transport(format!(
                "label '{}' lost in transit",
                label.cpid
            )));
        }
        let version = state
            .labels
            .get(&label.cpid)
            .and_then(|prev| prev.version)
            .map_or(1, |v| v + 1);
        let mut stored = label.clone();
        stored.version = Some(version);
        state.labels.insert(stored.cpid.clone(), stored);
        Ok(())
    }

    async fn fetch_label(&self, cpid: &Cpid) -> Result<RepInfoLabel, GatewayError> {
        self.state
            .lock()
            .labels
            .get(cpid)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(cpid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_fetch_manifest() {
        let registry = InMemoryRegistry::new("test-registry");
        let location = registry
            .store_content(b"abc".to_vec(), "a.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(location, "mem://test-registry/content/1");

        let cpid = registry.allocate_identifier().await.unwrap();
        let manifest = Manifest::new(cpid.clone(), Cpid::new("ril-1"));
        registry.submit_manifest(&manifest).await.unwrap();
        registry.submit_manifest(&manifest).await.unwrap();

        let stored = registry.fetch_manifest(&cpid).await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(registry.allocations(), 1);
        assert_eq!(registry.contents()[0].file_name, "a.txt");
    }

    #[tokio::test]
    async fn read_only_registry_refuses_writes_until_authorised() {
        let registry = InMemoryRegistry::read_only("test-registry");
        assert!(!registry.is_writable().await);

        let err = registry
            .store_content(b"abc".to_vec(), "a.txt", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));

        registry.authorise_for_read_write().await.unwrap();
        assert!(registry.is_writable().await);
    }

    #[tokio::test]
    async fn denied_authorisation_is_unauthorized() {
        let registry = InMemoryRegistry::read_only("test-registry");
        registry.deny_authorisation();

        let err = registry.authorise_for_read_write().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        assert!(!registry.is_writable().await);
    }

    #[tokio::test]
    async fn fetch_of_unknown_label_is_not_found() {
        let registry = InMemoryRegistry::new("test-registry");
        let err = registry.fetch_label(&Cpid::new("nope")).await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound("nope".into()));
    }
}
