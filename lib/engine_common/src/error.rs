//! Shared error vocabulary. Each subsystem crate defines its own `thiserror`
//! enum (`QaoError`, `NetError`, `SyncError`, `ChunkError`); this module holds
//! the handful of kinds that recur verbatim across all of them so they can
//! `#[from]`-convert into a common shape instead of redeclaring it per crate.

use thiserror::Error;

/// Kinds of failure shared by every subsystem's own error enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A precondition violation at an API boundary (bad argument).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal-state mismatch, e.g. double-attach or double-register.
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// A cycle was detected where a DAG was required.
    #[error("cyclic dependency detected: {0}")]
    CyclicDependencies(String),
}
