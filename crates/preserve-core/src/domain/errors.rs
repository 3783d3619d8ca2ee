//! Errors - エラー型と分類
//!
//! - `GatewayError`: 外部コラボレータ（レジストリ・永続化）が返すエラー
//! - `StorageFailure`: 項目単位の失敗。ジョブのマップに回収され、run は止まらない
//! - `PreservationError`: submit の失敗、または run 全体を止める失敗

use thiserror::Error;

use super::ids::SubjectKey;
use super::item::Preservable;

/// Failure reported by a registry or a persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not authorised: {0}")]
    Unauthorized(String),
}

/// Why a single item could not be preserved.
#[derive(Debug, Error)]
pub enum StorageCause {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("invalid location '{location}': {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no content to preserve")]
    NoContent,
}

impl From<zip::result::ZipError> for StorageCause {
    fn from(e: zip::result::ZipError) -> Self {
        StorageCause::Packaging(e.to_string())
    }
}

impl From<std::io::Error> for StorageCause {
    fn from(e: std::io::Error) -> Self {
        StorageCause::Packaging(e.to_string())
    }
}

/// A storage-kind failure tied to the item that caused it.
#[derive(Debug, Error)]
#[error("failed to preserve {preservable}: {cause}")]
pub struct StorageFailure {
    preservable: Preservable,
    #[source]
    cause: StorageCause,
}

impl StorageFailure {
    pub fn new(preservable: Preservable, cause: impl Into<StorageCause>) -> Self {
        Self {
            preservable,
            cause: cause.into(),
        }
    }

    pub fn preservable(&self) -> &Preservable {
        &self.preservable
    }

    pub fn cause(&self) -> &StorageCause {
        &self.cause
    }

    pub fn into_parts(self) -> (Preservable, StorageCause) {
        (self.preservable, self.cause)
    }
}

#[derive(Debug, Error)]
pub enum PreservationError {
    #[error("registry '{registry}' could not be authorised for writing: {source}")]
    Authorization {
        registry: String,
        #[source]
        source: GatewayError,
    },

    #[error("preservation setup failed: {0}")]
    Setup(#[source] GatewayError),

    #[error("no preservation job for dataset '{0}'")]
    NotFound(SubjectKey),

    #[error("persisting dataset '{dataset}' failed: {source}")]
    Persistence {
        dataset: String,
        #[source]
        source: GatewayError,
    },

    #[error("unexpected failure in preservation run: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentHolder, Cpid, FormItem};
    use std::error::Error as _;
    use std::sync::Arc;

    #[test]
    fn storage_failure_keeps_item_and_cause() {
        let form = Arc::new(FormItem::new("scan", Cpid::new("ril-1"), ContentHolder::Empty));
        let failure = StorageFailure::new(
            Preservable::Manifest(form),
            GatewayError::Transport("connection reset".into()),
        );

        assert_eq!(failure.preservable().name(), "scan");
        assert!(failure.to_string().contains("form 'scan'"));
        assert!(failure.source().is_some());
    }

    #[test]
    fn authorization_error_names_registry() {
        let err = PreservationError::Authorization {
            registry: "reg-a".into(),
            source: GatewayError::Unauthorized("bad token".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("reg-a"));
        assert!(msg.contains("bad token"));
    }
}
