//! Scheduler error vocabulary.

use engine_common::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QaoError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("object {0:?} is not attached to this runtime")]
    NotAttached(crate::id::ObjectId),

    #[error("object construction failed: {0}")]
    ConstructionFailed(String),
}
