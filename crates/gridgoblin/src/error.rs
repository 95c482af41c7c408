use engine_common::CoreError;
use thiserror::Error;

use crate::chunk_id::ChunkId;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("chunk {0} building-block mask {1:#04x} does not match configured mask {2:#04x}")]
    BuildingBlockMismatch(ChunkId, u8, u8),
    #[error("failed to parse chunk {0} at {1}: {2}")]
    JsonParse(ChunkId, std::path::PathBuf, String),
    #[error("I/O error for chunk {0}: {1}")]
    Io(ChunkId, String),
    #[error("storage directory config mismatch: {0}")]
    ConfigMismatch(String),
    #[error("chunk {0} is not loaded")]
    NotLoaded(ChunkId),
}
