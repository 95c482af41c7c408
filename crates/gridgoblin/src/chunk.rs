//! Chunked SoA cell storage: one independently-allocated `Vec<T>` per
//! present building block, plus an optional extension object.

use hashbrown::HashMap;

use crate::building_block::{BuildingBlockMask, SpatialInfo};

/// A user-supplied payload attached to a loaded chunk, created on demand
/// by the store's binder callback.
pub trait ChunkExtension: Send {
    fn to_json(&self) -> serde_json::Value;
}

/// Descriptive metadata mirroring the original engine's single-buffer,
/// manual-offset chunk layout. The Rust representation below does not use
/// this for addressing — each block is its own `Vec<T>` — but keeps the
/// struct available for diagnostics and on-disk-compatibility notes.
#[derive(Debug, Clone, Default)]
pub struct ChunkMemoryLayoutInfo {
    pub offsets: HashMap<&'static str, usize>,
    pub total_size: usize,
}

impl ChunkMemoryLayoutInfo {
    pub fn compute(mask: BuildingBlockMask, cell_count: usize) -> Self {
        let sizes: [(&'static str, BuildingBlockMask, usize); 6] = [
            ("CELL_KIND_ID", BuildingBlockMask::CELL_KIND_ID, 2),
            ("FLOOR_SPRITE", BuildingBlockMask::FLOOR_SPRITE, 2),
            ("WALL_SPRITE", BuildingBlockMask::WALL_SPRITE, 4),
            ("SPATIAL_INFO", BuildingBlockMask::SPATIAL_INFO, 3),
            ("RENDERER_AUX_DATA", BuildingBlockMask::RENDERER_AUX_DATA, 4),
            ("USER_DATA", BuildingBlockMask::USER_DATA, 8),
        ];
        let mut offsets = HashMap::new();
        let mut total_size = 0usize;
        for (name, flag, per_cell) in sizes {
            if mask.contains(flag) {
                offsets.insert(name, total_size);
                total_size += per_cell * cell_count;
            }
        }
        Self { offsets, total_size }
    }
}

/// A loaded, fixed-size chunk. `width`/`height` are the configured
/// `cellsPerChunkX/Y`; a chunk's slot is "null" when no [`Chunk`] is present.
pub struct Chunk {
    pub width: u16,
    pub height: u16,
    pub cell_kind_id: Option<Vec<u16>>,
    pub floor_sprite: Option<Vec<u16>>,
    pub wall_sprite: Option<Vec<[u16; 2]>>,
    pub spatial_info: Option<Vec<SpatialInfo>>,
    pub renderer_aux_data: Option<Vec<[u16; 2]>>,
    pub user_data: Option<Vec<[u8; 8]>>,
    pub extension: Option<Box<dyn ChunkExtension>>,
}

impl Chunk {
    pub fn new_default(mask: BuildingBlockMask, width: u16, height: u16) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            cell_kind_id: mask.contains(BuildingBlockMask::CELL_KIND_ID).then(|| vec![0u16; n]),
            floor_sprite: mask.contains(BuildingBlockMask::FLOOR_SPRITE).then(|| vec![0u16; n]),
            wall_sprite: mask.contains(BuildingBlockMask::WALL_SPRITE).then(|| vec![[0u16; 2]; n]),
            spatial_info: mask
                .contains(BuildingBlockMask::SPATIAL_INFO)
                .then(|| vec![SpatialInfo::default(); n]),
            renderer_aux_data: mask
                .contains(BuildingBlockMask::RENDERER_AUX_DATA)
                .then(|| vec![[0u16; 2]; n]),
            user_data: mask.contains(BuildingBlockMask::USER_DATA).then(|| vec![[0u8; 8]; n]),
            extension: None,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn index(&self, local_x: u16, local_y: u16) -> usize {
        local_y as usize * self.width as usize + local_x as usize
    }

    pub fn present_mask(&self) -> BuildingBlockMask {
        let mut mask = BuildingBlockMask::empty();
        if self.cell_kind_id.is_some() {
            mask |= BuildingBlockMask::CELL_KIND_ID;
        }
        if self.floor_sprite.is_some() {
            mask |= BuildingBlockMask::FLOOR_SPRITE;
        }
        if self.wall_sprite.is_some() {
            mask |= BuildingBlockMask::WALL_SPRITE;
        }
        if self.spatial_info.is_some() {
            mask |= BuildingBlockMask::SPATIAL_INFO;
        }
        if self.renderer_aux_data.is_some() {
            mask |= BuildingBlockMask::RENDERER_AUX_DATA;
        }
        if self.user_data.is_some() {
            mask |= BuildingBlockMask::USER_DATA;
        }
        mask
    }

    pub fn spatial_info_at(&self, local_x: u16, local_y: u16) -> Option<SpatialInfo> {
        let idx = self.index(local_x, local_y);
        self.spatial_info.as_ref().map(|v| v[idx])
    }

    pub fn set_spatial_info_at(&mut self, local_x: u16, local_y: u16, info: SpatialInfo) {
        let idx = self.index(local_x, local_y);
        if let Some(v) = self.spatial_info.as_mut() {
            v[idx] = info;
        }
    }

    pub fn memory_layout_info(&self) -> ChunkMemoryLayoutInfo {
        ChunkMemoryLayoutInfo::compute(self.present_mask(), self.cell_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chunk_allocates_exactly_the_configured_blocks() {
        let mask = BuildingBlockMask::FLOOR_SPRITE | BuildingBlockMask::SPATIAL_INFO;
        let chunk = Chunk::new_default(mask, 4, 4);
        assert!(chunk.floor_sprite.is_some());
        assert!(chunk.spatial_info.is_some());
        assert!(chunk.cell_kind_id.is_none());
        assert_eq!(chunk.present_mask(), mask);
    }

    #[test]
    fn memory_layout_info_covers_every_present_block() {
        let mask = BuildingBlockMask::all();
        let chunk = Chunk::new_default(mask, 2, 2);
        let layout = chunk.memory_layout_info();
        assert_eq!(layout.offsets.len(), 6);
        assert!(layout.total_size > 0);
    }
}
