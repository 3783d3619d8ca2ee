//! Domain identifiers.
//!
//! # ULID ベースの ID
//! ジョブ・フォーム項目の内部 ID は ULID を使い、Phantom type で型を分けます。
//! `JobId` と `ItemId` は同じ表現ですが、混同するとコンパイルエラーになります。
//!
//! レジストリ側の識別子（`Cpid`）とデータセットのキー（`SubjectKey`）は
//! 外部から与えられる文字列なので newtype で包むだけにしています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"job-", "item-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは `Ulid` と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Identifier of one preservation run.
pub type JobId = Id<Job>;

/// Identifier of a form item inside a dataset.
pub type ItemId = Id<Item>;

/// Stable key of the dataset a job preserves. At most one job per key is active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Curation persistent identifier, allocated by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cpid(String);

impl Cpid {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Variant identifier, e.g. `ril-1` + `-Z` -> `ril-1-Z`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}{}", self.0, suffix))
    }
}

impl fmt::Display for Cpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let job = JobId::from_ulid(ulid1);
        let item = ItemId::from_ulid(ulid2);

        assert_eq!(job.as_ulid(), ulid1);
        assert_eq!(item.as_ulid(), ulid2);

        assert!(job.to_string().starts_with("job-"));
        assert!(item.to_string().starts_with("item-"));

        // let _: JobId = item; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ulid_ids_can_be_serialized() {
        let job_id = JobId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&job_id).unwrap();
        let deserialized: JobId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(job_id, deserialized);
    }

    #[test]
    fn cpid_suffix_builds_variant() {
        let cpid = Cpid::new("ril-42");
        assert_eq!(cpid.with_suffix("-Z").as_str(), "ril-42-Z");
        // 元の識別子は変わらない
        assert_eq!(cpid.as_str(), "ril-42");
    }

    #[test]
    fn subject_key_serializes_as_plain_string() {
        let key = SubjectKey::new("DS1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"DS1\"");
    }
}
