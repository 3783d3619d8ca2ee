//! Domain model (IDs, preservable items, registry records, results, jobs, errors).

pub mod errors;
pub mod ids;
pub mod item;
pub mod job;
pub mod record;
pub mod result;

pub use errors::{GatewayError, PreservationError, StorageCause, StorageFailure};
pub use ids::{Cpid, ItemId, JobId, SubjectKey};
pub use item::{
    ContentHolder, Dataset, DatasetLabel, FormField, FormItem, Preservable, PreservableKey,
    PreservableKind,
};
pub use job::{JobState, PreservationJob};
pub use record::{Manifest, RegistryObject, RepInfoLabel};
pub use result::{ItemOutcome, JobItemResult};
