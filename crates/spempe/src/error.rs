use engine_common::CoreError;
use thiserror::Error;

use crate::sync_id::SyncId;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("SyncId {0} is already registered")]
    AlreadyRegistered(SyncId),
    #[error("no registered object for SyncId {0}")]
    UnknownSyncId(SyncId),
    #[error("protocol violation: {0}")]
    IllegalMessage(String),
    #[error("FullSyncWithDelay requires SyncConfig::allow_delay_override")]
    DelayOverrideNotAllowed,
}
