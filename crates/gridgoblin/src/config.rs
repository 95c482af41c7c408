//! World/contents configuration, persisted at `<storageDir>/contents_config.json`.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::building_block::BuildingBlockMask;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct WorldFlags: u32 {
        /// Overwrite an on-disk config that doesn't match instead of failing.
        const ALLOW_RECONFIG = 1 << 0;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
pub struct WorldConfig {
    #[default = 16]
    pub chunk_count_x: u16,
    #[default = 16]
    pub chunk_count_y: u16,
    #[default = 32]
    pub cells_per_chunk_x: u16,
    #[default = 32]
    pub cells_per_chunk_y: u16,
    /// World-space size of one cell, in the host's length units.
    #[default = 1.0]
    pub cell_resolution: f32,
    /// Renderer-facing, opaque to chunk storage/openness/eviction; carried
    /// alongside `cell_resolution` purely for round-trip fidelity.
    #[default = 2.0]
    pub wall_height: f32,
    #[default(BuildingBlockMask::all())]
    pub building_blocks: BuildingBlockMask,
    /// `0` disables openness tracking; otherwise must be odd, `1..=15`.
    #[default = 5]
    pub max_cell_openness: u8,
    #[default = 256]
    pub max_loaded_nonessential_chunks: usize,
    #[default(String::from("./world_data"))]
    pub storage_directory: String,
    #[default(WorldFlags::empty())]
    pub flags: WorldFlags,
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cell_openness != 0 && (self.max_cell_openness > 15 || self.max_cell_openness % 2 == 0) {
            return Err(format!(
                "max_cell_openness must be 0 or an odd number in 1..=15, got {}",
                self.max_cell_openness
            ));
        }
        if self.chunk_count_x == 0 || self.chunk_count_y == 0 {
            return Err("chunk_count_x/y must be nonzero".into());
        }
        if self.cells_per_chunk_x == 0 || self.cells_per_chunk_y == 0 {
            return Err("cells_per_chunk_x/y must be nonzero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(WorldConfig::default().validate().is_ok());
    }

    #[test]
    fn even_openness_is_rejected() {
        let mut cfg = WorldConfig::default();
        cfg.max_cell_openness = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_openness_is_allowed() {
        let mut cfg = WorldConfig::default();
        cfg.max_cell_openness = 0;
        assert!(cfg.validate().is_ok());
    }
}
