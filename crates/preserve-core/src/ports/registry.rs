//! Registry port - 外部レジストリ／リポジトリ
//!
//! ネットワーク越しの不安定なサービスを想定しています。
//! すべての失敗は `GatewayError` で返し、panic しないこと。

use async_trait::async_trait;

use crate::domain::{Cpid, GatewayError, Manifest, RepInfoLabel};

/// Registry stores content, manifests and labels and allocates identifiers.
///
/// # Read-after-write
/// `fetch_*` right after `submit_*` may not see the new record yet. Callers
/// wait a short settle delay before the confirmatory read.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Identifier of this registry (shown on jobs).
    fn location_uid(&self) -> &str;

    async fn is_writable(&self) -> bool;

    /// Establish write access. Fails with `GatewayError::Unauthorized` when refused.
    async fn authorise_for_read_write(&self) -> Result<(), GatewayError>;

    /// Upload bytes; returns the location of the stored content.
    async fn store_content(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, GatewayError>;

    async fn allocate_identifier(&self) -> Result<Cpid, GatewayError>;

    async fn submit_manifest(&self, manifest: &Manifest) -> Result<(), GatewayError>;

    async fn fetch_manifest(&self, cpid: &Cpid) -> Result<Manifest, GatewayError>;

    async fn submit_label(&self, label: &RepInfoLabel) -> Result<(), GatewayError>;

    async fn fetch_label(&self, cpid: &Cpid) -> Result<RepInfoLabel, GatewayError>;
}
