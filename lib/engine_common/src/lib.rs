//! Shared ambient stack used by every core crate: a type-alias prelude,
//! a cheap-read/rare-write config handle, a cross-thread promise type,
//! and the error-handling conventions the rest of the engine builds on.

pub mod concurrency;
pub mod error;
pub mod prelude;
pub mod promises;

pub use concurrency::VersionedArc;
pub use error::CoreError;
pub use promises::{AsyncResult, GenericAsyncResult};
