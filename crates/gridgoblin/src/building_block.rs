//! The typed per-cell arrays a chunk may carry, and the bitmask selecting
//! which of them are present for a given world configuration.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct BuildingBlockMask: u8 {
        const CELL_KIND_ID      = 1 << 0;
        const FLOOR_SPRITE      = 1 << 1;
        const WALL_SPRITE       = 1 << 2;
        const SPATIAL_INFO      = 1 << 3;
        const RENDERER_AUX_DATA = 1 << 4;
        const USER_DATA         = 1 << 5;
    }
}

impl BuildingBlockMask {
    /// The pipe-separated tag string written as `"buildingBlocks"` on disk.
    pub fn to_tag_string(self) -> String {
        let mut names = Vec::new();
        for (name, flag) in Self::named_entries() {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names.join("|")
    }

    pub fn from_tag_string(s: &str) -> Self {
        let mut mask = Self::empty();
        if s.is_empty() {
            return mask;
        }
        for part in s.split('|') {
            for (name, flag) in Self::named_entries() {
                if name == part {
                    mask |= flag;
                }
            }
        }
        mask
    }

    fn named_entries() -> [(&'static str, BuildingBlockMask); 6] {
        [
            ("CELL_KIND_ID", Self::CELL_KIND_ID),
            ("FLOOR_SPRITE", Self::FLOOR_SPRITE),
            ("WALL_SPRITE", Self::WALL_SPRITE),
            ("SPATIAL_INFO", Self::SPATIAL_INFO),
            ("RENDERER_AUX_DATA", Self::RENDERER_AUX_DATA),
            ("USER_DATA", Self::USER_DATA),
        ]
    }
}

/// Per-cell shape/obstruction/openness triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpatialInfo {
    pub shape: u8,
    pub ob_flags: u8,
    pub openness: u8,
}

impl SpatialInfo {
    pub fn is_wall(self) -> bool {
        self.shape != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_string_round_trips() {
        let mask = BuildingBlockMask::FLOOR_SPRITE | BuildingBlockMask::SPATIAL_INFO;
        let tag = mask.to_tag_string();
        assert_eq!(BuildingBlockMask::from_tag_string(&tag), mask);
    }

    #[test]
    fn empty_mask_round_trips_to_empty_string() {
        assert_eq!(BuildingBlockMask::empty().to_tag_string(), "");
        assert_eq!(BuildingBlockMask::from_tag_string(""), BuildingBlockMask::empty());
    }
}
