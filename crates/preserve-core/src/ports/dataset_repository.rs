//! DatasetRepository port - データセットの永続化（ORM 側）
//!
//! run の最後に一度だけ、単一スレッドで呼ばれます。

use async_trait::async_trait;

use crate::domain::{Cpid, Dataset, GatewayError, RepInfoLabel};

#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Persist the label's current state under its identifier.
    async fn update_dataset_label(
        &self,
        label: &RepInfoLabel,
        cpid: &Cpid,
    ) -> Result<(), GatewayError>;

    /// Persist the dataset (manifest identifiers, preserved flags).
    async fn save(&self, dataset: &Dataset) -> Result<(), GatewayError>;
}
