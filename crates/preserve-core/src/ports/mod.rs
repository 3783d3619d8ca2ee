//! Ports - 抽象化レイヤー
//!
//! 外部システム（レジストリ、ORM 側の永続化）へのインターフェースです。
//! コアはこの trait だけに依存し、実装の詳細は知りません。

pub mod clock;
pub mod dataset_repository;
pub mod id_generator;
pub mod registry;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dataset_repository::DatasetRepository;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::registry::Registry;
