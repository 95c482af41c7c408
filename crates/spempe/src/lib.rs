//! Sync registry and master/dummy replication engine on top of `rigelnet`.

pub mod buffering;
pub mod engine;
pub mod error;
pub mod filter;
pub mod flags;
pub mod registry;
pub mod sync_id;

pub use buffering::{Interpolate, StateBuffer};
pub use engine::{MessageKind, SyncEngine, SyncMessage};
pub use error::SyncError;
pub use filter::{FilterResult, SyncConfig};
pub use flags::SyncFlags;
pub use registry::{ChangeSets, Registry};
pub use sync_id::{SyncId, SYNC_ID_NEW};
