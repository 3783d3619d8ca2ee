//! Per-item result of a preservation run.

use std::fmt;
use std::sync::Arc;

use super::errors::{StorageCause, StorageFailure};
use super::item::Preservable;
use super::record::RegistryObject;

/// Either the confirmed record or the reason it could not be stored.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Preserved(RegistryObject),
    Failed(Arc<StorageCause>),
}

/// Result attributed to one preservable item. Immutable once built.
#[derive(Debug, Clone)]
pub struct JobItemResult {
    preservable: Preservable,
    outcome: ItemOutcome,
}

impl JobItemResult {
    pub fn preserved(preservable: Preservable, stored: RegistryObject) -> Self {
        Self {
            preservable,
            outcome: ItemOutcome::Preserved(stored),
        }
    }

    pub fn failed(preservable: Preservable, cause: StorageCause) -> Self {
        Self {
            preservable,
            outcome: ItemOutcome::Failed(Arc::new(cause)),
        }
    }

    pub fn preservable(&self) -> &Preservable {
        &self.preservable
    }

    pub fn outcome(&self) -> &ItemOutcome {
        &self.outcome
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Preserved(_))
    }

    pub fn preserved_object(&self) -> Option<&RegistryObject> {
        match &self.outcome {
            ItemOutcome::Preserved(stored) => Some(stored),
            ItemOutcome::Failed(_) => None,
        }
    }

    pub fn thrown(&self) -> Option<&StorageCause> {
        match &self.outcome {
            ItemOutcome::Preserved(_) => None,
            ItemOutcome::Failed(cause) => Some(cause),
        }
    }
}

impl From<StorageFailure> for JobItemResult {
    fn from(failure: StorageFailure) -> Self {
        let (preservable, cause) = failure.into_parts();
        Self::failed(preservable, cause)
    }
}

impl fmt::Display for JobItemResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ItemOutcome::Preserved(stored) => {
                write!(f, "{} preserved as {}", self.preservable, stored.cpid())
            }
            ItemOutcome::Failed(cause) => write!(f, "{} failed: {}", self.preservable, cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cpid, DatasetLabel, GatewayError, RepInfoLabel};

    fn label() -> Preservable {
        Preservable::Label(Arc::new(DatasetLabel::new(Cpid::new("ril-1"), "structure")))
    }

    #[test]
    fn preserved_result_exposes_only_the_record() {
        let stored = RegistryObject::Label(RepInfoLabel {
            cpid: Cpid::new("ril-1"),
            name: "structure".into(),
            description: None,
            version: Some(1),
        });
        let result = JobItemResult::preserved(label(), stored.clone());

        assert!(result.is_succeeded());
        assert_eq!(result.preserved_object(), Some(&stored));
        assert!(result.thrown().is_none());
        assert_eq!(result.to_string(), "label 'ril-1' preserved as ril-1");
    }

    #[test]
    fn failure_converts_into_failed_result() {
        let failure = StorageFailure::new(label(), GatewayError::Rejected("schema".into()));
        let result = JobItemResult::from(failure);

        assert!(!result.is_succeeded());
        assert!(result.preserved_object().is_none());
        assert!(result.thrown().unwrap().to_string().contains("schema"));
    }
}
