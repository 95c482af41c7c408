//! The chunk engine's synchronous surface: a RAM index of chunks backed by
//! the spooler, refcounted active-area pins, and timestamp-ordered eviction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use engine_common::prelude::*;
use tracing::{info, instrument, warn};

use crate::active_area::{AreaDelta, PinTable};
use crate::building_block::BuildingBlockMask;
use crate::chunk::{Chunk, ChunkExtension};
use crate::chunk_id::ChunkId;
use crate::config::WorldConfig;
use crate::error::ChunkError;
use crate::spooler::{self, SpoolerCompletion, SpoolerHandle};

/// Per-call load priority passed through to the spooler.
pub type LoadPriority = i32;
pub const PRIORITY_BACKGROUND: LoadPriority = 0;
pub const PRIORITY_BLOCKING: LoadPriority = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    None,
    LoadIfMissing,
}

/// A single cell edit, batched with others into one binder notification per
/// edit transaction.
#[derive(Debug, Clone, Copy)]
pub struct CellEditInfo {
    pub local_x: u16,
    pub local_y: u16,
}

/// Host hook-ins: extension construction and edit notification.
pub trait ChunkBinder: Send {
    fn create_extension(&self, _id: ChunkId) -> Option<Box<dyn ChunkExtension>> {
        None
    }
    fn on_edit_transaction(&self, _id: ChunkId, _edits: &[CellEditInfo]) {}
}

/// Proof that the caller is inside a tick's edit window. Issued by
/// [`ChunkStore::begin_tick_edits`] and required by [`ChunkStore::edit_cells`].
pub struct EditPermit {
    _private: (),
}

pub type ChunkLoadHandle = AsyncResult<()>;

pub struct ChunkStore {
    config: WorldConfig,
    storage_dir: PathBuf,
    grid: Vec<Option<Chunk>>,
    pins: PinTable,
    free_chunks: BTreeMap<u64, ChunkId>,
    free_timestamps: HashMap<ChunkId, u64>,
    clock: u64,
    spooler: SpoolerHandle,
    inflight: HashSet<ChunkId>,
    pending: HashMap<ChunkId, Vec<AsyncOneshotSender<Result<()>>>>,
    binder: Option<Box<dyn ChunkBinder>>,
    edit_tick_open: bool,
}

impl ChunkStore {
    /// Opens (or initializes) a world's storage directory. Fails if an
    /// existing config mismatches and `ALLOW_RECONFIG` isn't set.
    #[instrument(skip(config, binder), fields(dir = %storage_dir.display()))]
    pub fn open(
        config: WorldConfig,
        storage_dir: PathBuf,
        binder: Option<Box<dyn ChunkBinder>>,
    ) -> Result<Self, ChunkError> {
        config.validate().map_err(ChunkError::ConfigMismatch)?;
        std::fs::create_dir_all(&storage_dir).map_err(|e| ChunkError::Io(ChunkId::new(0, 0), e.to_string()))?;

        let config_path = storage_dir.join("contents_config.json");
        if config_path.exists() {
            let text = std::fs::read_to_string(&config_path).map_err(|e| ChunkError::Io(ChunkId::new(0, 0), e.to_string()))?;
            let on_disk: WorldConfig =
                serde_json::from_str(&text).map_err(|e| ChunkError::ConfigMismatch(e.to_string()))?;
            if on_disk != config && !config.flags.contains(crate::config::WorldFlags::ALLOW_RECONFIG) {
                return Err(ChunkError::ConfigMismatch(
                    "on-disk contents_config.json does not match the live configuration".into(),
                ));
            }
        }
        let text = serde_json::to_string_pretty(&config).map_err(|e| ChunkError::ConfigMismatch(e.to_string()))?;
        std::fs::write(&config_path, text).map_err(|e| ChunkError::Io(ChunkId::new(0, 0), e.to_string()))?;

        if let Err(e) = spooler::clear_runtime_cache(&storage_dir) {
            warn!(error = %e, "failed to clear stale runtime cache");
        }

        let cell_count = config.chunk_count_x as usize * config.chunk_count_y as usize;
        let spooler = SpoolerHandle::spawn(
            storage_dir.clone(),
            config.building_blocks,
            config.cells_per_chunk_x,
            config.cells_per_chunk_y,
        );

        Ok(Self {
            grid: (0..cell_count).map(|_| None).collect(),
            pins: PinTable::new(),
            free_chunks: BTreeMap::new(),
            free_timestamps: HashMap::new(),
            clock: 0,
            spooler,
            inflight: HashSet::new(),
            pending: HashMap::new(),
            binder,
            edit_tick_open: false,
            config,
            storage_dir,
        })
    }

    pub fn building_block_mask(&self) -> BuildingBlockMask {
        self.config.building_blocks
    }

    fn slot_index(&self, id: ChunkId) -> usize {
        id.y as usize * self.config.chunk_count_x as usize + id.x as usize
    }

    pub fn is_resident(&self, id: ChunkId) -> bool {
        self.grid.get(self.slot_index(id)).is_some_and(Option::is_some)
    }

    pub fn get_chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.grid.get(self.slot_index(id)).and_then(Option::as_ref)
    }

    /// Synchronous, blocking load-if-missing. The only chunk API allowed to
    /// block the caller, and only for the single requested chunk.
    #[instrument(skip(self))]
    pub fn get_chunk_at_id_unchecked(&mut self, id: ChunkId, policy: LoadPolicy) -> Option<&Chunk> {
        if self.is_resident(id) {
            return self.get_chunk(id);
        }
        if policy == LoadPolicy::None {
            return None;
        }
        if self.inflight.insert(id) {
            self.spooler.request_load(id, PRIORITY_BLOCKING);
        }
        while !self.is_resident(id) {
            match self.spooler.blocking_recv_completion() {
                Some(completion) => self.apply_completion(completion),
                None => return None, // worker gone
            }
        }
        self.get_chunk(id)
    }

    /// Queues a non-blocking load, returning a handle that resolves once the
    /// chunk is RAM-resident (or already is).
    pub fn request_load(&mut self, id: ChunkId, priority: LoadPriority) -> ChunkLoadHandle {
        if self.is_resident(id) {
            return AsyncResult::new_ok(());
        }
        let (result, tx) = AsyncResult::new_pair();
        self.pending.entry(id).or_default().push(tx);
        if self.inflight.insert(id) {
            self.spooler.request_load(id, priority);
        }
        result
    }

    pub fn cancel_load(&mut self, id: ChunkId) {
        if self.inflight.remove(&id) {
            self.spooler.cancel(id);
            self.pending.remove(&id);
        }
    }

    /// Drains everything the spooler has finished since the last call.
    /// Must run once per main-thread step.
    #[instrument(skip(self))]
    pub fn update(&mut self) {
        while let Some(completion) = self.spooler.try_recv_completion() {
            self.apply_completion(completion);
        }
    }

    fn apply_completion(&mut self, completion: SpoolerCompletion) {
        let SpoolerCompletion { id, result, extension_json } = completion;
        self.inflight.remove(&id);
        match result {
            Ok(mut chunk) => {
                if chunk.extension.is_none() {
                    if let Some(binder) = &self.binder {
                        chunk.extension = binder.create_extension(id);
                    }
                }
                let _ = extension_json; // host-specific reconstruction is the binder's job
                let idx = self.slot_index(id);
                self.grid[idx] = Some(chunk);
                if let Some(senders) = self.pending.remove(&id) {
                    for tx in senders {
                        let _ = tx.send(Ok(()));
                    }
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "chunk load failed");
                if let Some(senders) = self.pending.remove(&id) {
                    for tx in senders {
                        let _ = tx.send(Err(anyhow::anyhow!("{e}")));
                    }
                }
            }
        }
    }

    /// Applies an active area's chunk-list delta: pins additions (requesting
    /// a background load for any that aren't resident) and, for removals
    /// that drop to zero references, marks the chunk free as of now.
    pub fn apply_active_area_delta(&mut self, delta: &AreaDelta) {
        for &id in &delta.added {
            self.pins.pin(id);
            if !self.is_resident(id) && self.inflight.insert(id) {
                self.spooler.request_load(id, PRIORITY_BACKGROUND);
            }
        }
        for &id in &delta.removed {
            if self.pins.unpin(id) && self.is_resident(id) {
                self.mark_free(id);
            }
        }
    }

    fn mark_free(&mut self, id: ChunkId) {
        self.clock += 1;
        self.free_chunks.insert(self.clock, id);
        self.free_timestamps.insert(id, self.clock);
    }

    fn unmark_free(&mut self, id: ChunkId) {
        if let Some(ts) = self.free_timestamps.remove(&id) {
            self.free_chunks.remove(&ts);
        }
    }

    pub fn free_chunk_count(&self) -> usize {
        self.free_chunks.len()
    }

    /// Evicts the oldest free chunks down to `maxLoadedNonessentialChunks`,
    /// serializing each to the runtime cache before nulling its RAM slot.
    #[instrument(skip(self))]
    pub fn prune(&mut self) {
        while self.free_chunks.len() > self.config.max_loaded_nonessential_chunks {
            let (&ts, &id) = self.free_chunks.iter().next().expect("checked non-empty above");
            self.free_chunks.remove(&ts);
            self.free_timestamps.remove(&id);

            let idx = self.slot_index(id);
            if let Some(chunk) = self.grid[idx].take() {
                if let Err(e) = spooler::write_chunk_to_disk(&self.storage_dir, "runtime_cache", &chunk, id) {
                    warn!(%id, error = %e, "failed to spool evicted chunk to the runtime cache");
                }
                info!(%id, "evicted chunk to runtime cache");
            }
        }
    }

    pub fn begin_tick_edits(&mut self) -> EditPermit {
        self.edit_tick_open = true;
        EditPermit { _private: () }
    }

    pub fn end_tick_edits(&mut self, _permit: EditPermit) {
        self.edit_tick_open = false;
    }

    /// Applies a batch of edits belonging to one transaction and notifies
    /// the binder once. Requires an open [`EditPermit`] for the current tick.
    pub fn edit_cells(&mut self, _permit: &EditPermit, id: ChunkId, edits: &[CellEditInfo]) {
        debug_assert!(self.edit_tick_open, "edit_cells called outside a tick's edit window");
        if !self.is_resident(id) {
            return;
        }
        if let Some(binder) = &self.binder {
            binder.on_edit_transaction(id, edits);
        }
        // Touching a chunk via edits counts as activity; if it happens to be
        // on the free list (unpinned but still resident) refresh its slot so
        // the next prune doesn't evict something just edited.
        if self.free_timestamps.contains_key(&id) {
            self.unmark_free(id);
            self.mark_free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active_area::ActiveArea;

    fn test_config(max_nonessential: usize) -> WorldConfig {
        WorldConfig {
            chunk_count_x: 8,
            chunk_count_y: 8,
            cells_per_chunk_x: 4,
            cells_per_chunk_y: 4,
            max_loaded_nonessential_chunks: max_nonessential,
            building_blocks: BuildingBlockMask::FLOOR_SPRITE,
            ..Default::default()
        }
    }

    #[test]
    fn load_if_missing_blocks_until_resident() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ChunkStore::open(test_config(4), dir.path().to_path_buf(), None).unwrap();
        let id = ChunkId::new(0, 0);
        assert!(!store.is_resident(id));
        let chunk = store.get_chunk_at_id_unchecked(id, LoadPolicy::LoadIfMissing);
        assert!(chunk.is_some());
        assert!(store.is_resident(id));
    }

    #[test]
    fn eviction_keeps_exactly_the_configured_number_of_free_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ChunkStore::open(test_config(2), dir.path().to_path_buf(), None).unwrap();

        let mut area = ActiveArea::new();
        let ids: Vec<ChunkId> = (0..4).map(|x| ChunkId::new(x, 0)).collect();
        let delta = area.set_chunks(ids.iter().map(|&id| (id, BuildingBlockMask::FLOOR_SPRITE)));
        store.apply_active_area_delta(&delta);

        // Drain loads triggered by the active area.
        for _ in 0..16 {
            store.update();
            if ids.iter().all(|&id| store.is_resident(id)) {
                break;
            }
            std::thread::yield_now();
        }
        assert!(ids.iter().all(|&id| store.is_resident(id)));

        let delta = area.clear_as_delta();
        store.apply_active_area_delta(&delta);
        store.update();
        assert_eq!(store.free_chunk_count(), 4);

        store.prune();
        assert_eq!(store.free_chunk_count(), 2);
        let resident_count = ids.iter().filter(|&&id| store.is_resident(id)).count();
        assert_eq!(resident_count, 2);

        for id in &ids {
            if !store.is_resident(*id) {
                let path = spooler::chunk_path(dir.path(), "runtime_cache", *id);
                assert!(path.exists(), "expected {id} to be spooled to the runtime cache");
            }
        }
    }
}
