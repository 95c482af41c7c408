//! QAO — the object lifecycle, identity, and event-scheduling runtime.
//!
//! A single-threaded, cooperative scheduler: objects are attached through a
//! factory that hands out tri-state [`Handle`]s, kept in a stable priority
//! order, and driven through twelve fixed per-step event callbacks.

pub mod error;
pub mod handle;
pub mod id;
pub mod object;
pub mod orderer;
pub mod priority_resolver;
pub mod runtime;

pub use error::QaoError;
pub use handle::{Handle, NonOwningHandle};
pub use id::ObjectId;
pub use object::{Event, EventMask, InstantiationGuard, QaoObject, EVENT_ORDER};
pub use priority_resolver::{PriorityResolver, ResolverMode};
pub use runtime::{Runtime, RuntimeRef};
