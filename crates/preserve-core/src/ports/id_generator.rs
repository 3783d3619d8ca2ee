//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock から timestamp を取る）

use crate::domain::{Cpid, JobId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は job ID とレジストリ側の識別子を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    /// Fresh curation persistent identifier (`cpid-<ulid>`).
    fn generate_cpid(&self) -> Cpid;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_cpid(&self) -> Cpid {
        Cpid::new(format!("cpid-{}", self.next_ulid()))
    }
}
