//! Active areas: caller-owned sets of chunks that must stay loaded.
//!
//! The store holds only a weak, refcounted view of these — an
//! [`ActiveArea`] itself is cheap to drop, and dropping it (or calling
//! [`ActiveArea::clear`]) releases its pins on the next `prune()`.

use hashbrown::{HashMap, HashSet};

use crate::building_block::BuildingBlockMask;
use crate::chunk_id::ChunkId;

/// A caller's region of interest: the chunks it needs loaded, and which
/// building blocks it needs populated on each of them.
#[derive(Debug, Clone, Default)]
pub struct ActiveArea {
    chunks: HashMap<ChunkId, BuildingBlockMask>,
}

impl ActiveArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> impl Iterator<Item = (ChunkId, BuildingBlockMask)> + '_ {
        self.chunks.iter().map(|(id, mask)| (*id, *mask))
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Replaces the area's contents, returning the chunks that left and
    /// the chunks that newly entered so the caller (the store) can adjust
    /// pin counts incrementally rather than re-pinning everything.
    pub fn set_chunks(&mut self, new_chunks: impl IntoIterator<Item = (ChunkId, BuildingBlockMask)>) -> AreaDelta {
        let new_map: HashMap<ChunkId, BuildingBlockMask> = new_chunks.into_iter().collect();
        let old_keys: HashSet<ChunkId> = self.chunks.keys().copied().collect();
        let new_keys: HashSet<ChunkId> = new_map.keys().copied().collect();

        let removed: Vec<ChunkId> = old_keys.difference(&new_keys).copied().collect();
        let added: Vec<ChunkId> = new_keys.difference(&old_keys).copied().collect();

        self.chunks = new_map;
        AreaDelta { added, removed }
    }

    pub fn clear(&mut self) -> Vec<ChunkId> {
        self.chunks.drain().map(|(id, _)| id).collect()
    }

    /// Like [`Self::clear`], but shaped as an [`AreaDelta`] so the caller
    /// can feed it straight into [`super::store::ChunkStore::apply_active_area_delta`].
    pub fn clear_as_delta(&mut self) -> AreaDelta {
        AreaDelta {
            added: Vec::new(),
            removed: self.clear(),
        }
    }
}

/// The chunks that entered and left an [`ActiveArea`] on the last
/// [`ActiveArea::set_chunks`] call.
#[derive(Debug, Clone, Default)]
pub struct AreaDelta {
    pub added: Vec<ChunkId>,
    pub removed: Vec<ChunkId>,
}

/// Per-chunk pin counter: how many active areas currently list a chunk.
/// A chunk with a nonzero count is never evicted.
#[derive(Debug, Default)]
pub struct PinTable {
    counts: HashMap<ChunkId, u32>,
}

impl PinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pinned(&self, id: ChunkId) -> bool {
        self.counts.get(&id).is_some_and(|&c| c > 0)
    }

    pub fn pin(&mut self, id: ChunkId) {
        *self.counts.entry(id).or_insert(0) += 1;
    }

    /// Unpins one reference, returning `true` if the count just dropped
    /// to zero (the caller should move the chunk into the free-chunks
    /// index with a fresh timestamp).
    pub fn unpin(&mut self, id: ChunkId) -> bool {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn apply_delta(&mut self, delta: &AreaDelta) -> (Vec<ChunkId>, Vec<ChunkId>) {
        for &id in &delta.added {
            self.pin(id);
        }
        let newly_free = delta.removed.iter().copied().filter(|&id| self.unpin(id)).collect();
        (delta.added.clone(), newly_free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_chunks_reports_added_and_removed() {
        let mut area = ActiveArea::new();
        let delta = area.set_chunks([(ChunkId::new(0, 0), BuildingBlockMask::all())]);
        assert_eq!(delta.added, vec![ChunkId::new(0, 0)]);
        assert!(delta.removed.is_empty());

        let delta = area.set_chunks([(ChunkId::new(1, 0), BuildingBlockMask::all())]);
        assert_eq!(delta.added, vec![ChunkId::new(1, 0)]);
        assert_eq!(delta.removed, vec![ChunkId::new(0, 0)]);
    }

    #[test]
    fn pin_table_only_frees_a_chunk_when_every_reference_is_gone() {
        let mut pins = PinTable::new();
        let id = ChunkId::new(2, 2);
        pins.pin(id);
        pins.pin(id);
        assert!(!pins.unpin(id));
        assert!(pins.is_pinned(id));
        assert!(pins.unpin(id));
        assert!(!pins.is_pinned(id));
    }

    #[test]
    fn apply_delta_pins_additions_and_frees_unreferenced_removals() {
        let mut pins = PinTable::new();
        let id = ChunkId::new(3, 3);
        pins.pin(id);

        let delta = AreaDelta {
            added: vec![],
            removed: vec![id],
        };
        let (_, freed) = pins.apply_delta(&delta);
        assert_eq!(freed, vec![id]);
        assert!(!pins.is_pinned(id));
    }
}
