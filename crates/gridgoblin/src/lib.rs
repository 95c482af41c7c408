//! Chunked structure-of-arrays tile storage: addressing, per-cell building
//! blocks, openness, active-area pinning, a spooled two-tier disk cache, and
//! JSON serialization.

pub mod active_area;
pub mod building_block;
pub mod chunk;
pub mod chunk_id;
pub mod config;
pub mod error;
pub mod openness;
pub mod serialization;
pub mod spooler;
pub mod store;

pub use active_area::{ActiveArea, AreaDelta, PinTable};
pub use building_block::{BuildingBlockMask, SpatialInfo};
pub use chunk::{Chunk, ChunkExtension, ChunkMemoryLayoutInfo};
pub use chunk_id::{decompose, CellAddress, ChunkId};
pub use config::{WorldConfig, WorldFlags};
pub use error::ChunkError;
pub use openness::{recompute_chunk_openness, set_wall_shape};
pub use serialization::{chunk_from_json, chunk_to_json};
pub use store::{
    CellEditInfo, ChunkBinder, ChunkLoadHandle, ChunkStore, EditPermit, LoadPolicy, LoadPriority, PRIORITY_BACKGROUND,
    PRIORITY_BLOCKING,
};
