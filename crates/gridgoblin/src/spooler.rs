//! Background chunk loader: one worker thread, two bounded MPSC queues.
//! The worker never touches the in-RAM index; ownership of a `Chunk`
//! transfers to the caller only once it arrives on the output queue.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use engine_common::prelude::*;
use tracing::{info, warn};

use crate::building_block::BuildingBlockMask;
use crate::chunk::Chunk;
use crate::chunk_id::ChunkId;
use crate::error::ChunkError;
use crate::serialization::chunk_from_json;

const REQUEST_QUEUE_CAPACITY: usize = 256;
const COMPLETION_QUEUE_CAPACITY: usize = 256;

struct LoadRequest {
    id: ChunkId,
    priority: i32,
    seq: u64,
}

pub struct SpoolerCompletion {
    pub id: ChunkId,
    pub result: Result<Chunk, ChunkError>,
    pub extension_json: Option<serde_json::Value>,
}

/// A live background loader. Dropping it stops the worker once the input
/// channel closes.
pub struct SpoolerHandle {
    input: StdBoundedSender<LoadRequest>,
    output: StdUnboundedReceiver<SpoolerCompletion>,
    cancelled: Arc<Mutex<HashSet<ChunkId>>>,
    next_seq: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl SpoolerHandle {
    pub fn spawn(storage_dir: PathBuf, mask: BuildingBlockMask, cells_x: u16, cells_y: u16) -> Self {
        let (input_tx, input_rx) = std_bounded_channel::<LoadRequest>(REQUEST_QUEUE_CAPACITY);
        let (output_tx, output_rx) = std_bounded_channel::<SpoolerCompletion>(COMPLETION_QUEUE_CAPACITY);
        let cancelled = Arc::new(Mutex::new(HashSet::new()));
        let worker_cancelled = cancelled.clone();

        let worker = std::thread::Builder::new()
            .name("gridgoblin-spooler".into())
            .spawn(move || {
                worker_loop(input_rx, output_tx, worker_cancelled, storage_dir, mask, cells_x, cells_y);
            })
            .expect("failed to spawn chunk spooler thread");

        Self {
            input: input_tx,
            output: output_rx,
            cancelled,
            next_seq: AtomicU64::new(0),
            worker: Some(worker),
        }
    }

    /// Queues a load request. Silently dropped if the worker has already
    /// shut down (e.g. during engine teardown).
    pub fn request_load(&self, id: ChunkId, priority: i32) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.input.send(LoadRequest { id, priority, seq });
    }

    /// Removes `id` from consideration. A request already in flight still
    /// completes on the worker side but its result is discarded on return.
    pub fn cancel(&self, id: ChunkId) {
        self.cancelled.lock().unwrap().insert(id);
    }

    pub fn try_recv_completion(&self) -> Option<SpoolerCompletion> {
        self.output.try_recv().ok()
    }

    /// Blocks until the next completion arrives, for `get_chunk_at_id_unchecked`'s
    /// load-if-missing path. The caller applies every completion it receives,
    /// not only the one it was waiting for, since the queue is FIFO-by-priority
    /// across every in-flight request.
    pub fn blocking_recv_completion(&self) -> Option<SpoolerCompletion> {
        self.output.recv().ok()
    }
}

impl Drop for SpoolerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    input: StdUnboundedReceiver<LoadRequest>,
    output: StdBoundedSender<SpoolerCompletion>,
    cancelled: Arc<Mutex<HashSet<ChunkId>>>,
    storage_dir: PathBuf,
    mask: BuildingBlockMask,
    cells_x: u16,
    cells_y: u16,
) {
    let mut backlog: Vec<LoadRequest> = Vec::new();
    loop {
        let first = match backlog.pop().or_else(|| input.recv().ok()) {
            Some(req) => req,
            None => return, // input channel closed, engine shutting down
        };
        backlog.push(first);
        // Drain whatever else is already queued so priority can be honored
        // across everything currently pending, not just FIFO arrival order.
        while let Ok(req) = input.try_recv() {
            backlog.push(req);
        }
        backlog.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        let request = backlog.remove(0);

        if cancelled.lock().unwrap().remove(&request.id) {
            continue;
        }

        let (result, extension_json) = load_chunk_from_disk(&storage_dir, request.id, mask, cells_x, cells_y);

        if cancelled.lock().unwrap().remove(&request.id) {
            continue; // cancelled while this load was in flight
        }
        if output
            .send(SpoolerCompletion {
                id: request.id,
                result,
                extension_json,
            })
            .is_err()
        {
            return; // store dropped its output receiver
        }
    }
}

fn load_chunk_from_disk(
    storage_dir: &Path,
    id: ChunkId,
    mask: BuildingBlockMask,
    cells_x: u16,
    cells_y: u16,
) -> (Result<Chunk, ChunkError>, Option<serde_json::Value>) {
    for tier in ["runtime_cache", "persistent_cache"] {
        let path = chunk_path(storage_dir, tier, id);
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(value) => match chunk_from_json(id, &value, mask, cells_x, cells_y) {
                        Ok((chunk, ext)) => {
                            info!(%id, tier, "loaded chunk from disk");
                            return (Ok(chunk), ext);
                        }
                        Err(e) => return (Err(e), None),
                    },
                    Err(e) => return (Err(ChunkError::JsonParse(id, path, e.to_string())), None),
                },
                Err(e) => return (Err(ChunkError::Io(id, e.to_string())), None),
            }
        }
    }
    (Ok(Chunk::new_default(mask, cells_x, cells_y)), None)
}

pub fn chunk_path(storage_dir: &Path, tier: &str, id: ChunkId) -> PathBuf {
    storage_dir.join("dcio_chunks").join(tier).join(format!("chunk_{}_{}", id.x, id.y))
}

pub fn write_chunk_to_disk(storage_dir: &Path, tier: &str, chunk: &Chunk, id: ChunkId) -> Result<(), ChunkError> {
    let path = chunk_path(storage_dir, tier, id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ChunkError::Io(id, e.to_string()))?;
    }
    let value = crate::serialization::chunk_to_json(chunk);
    let text = serde_json::to_string_pretty(&value).map_err(|e| ChunkError::Io(id, e.to_string()))?;
    std::fs::write(&path, text).map_err(|e| ChunkError::Io(id, e.to_string()))
}

/// Empties the runtime cache directory, logging a warning. A non-empty
/// runtime cache at startup means the previous run did not shut down cleanly.
pub fn clear_runtime_cache(storage_dir: &Path) -> std::io::Result<()> {
    let dir = storage_dir.join("dcio_chunks").join("runtime_cache");
    if !dir.exists() {
        return Ok(());
    }
    let mut had_entries = false;
    for entry in std::fs::read_dir(&dir)? {
        had_entries = true;
        std::fs::remove_file(entry?.path())?;
    }
    if had_entries {
        warn!(dir = %dir.display(), "runtime cache was non-empty at startup; previous run likely crashed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chunk_synthesizes_a_default() {
        let dir = tempfile::tempdir().unwrap();
        let (result, ext) = load_chunk_from_disk(dir.path(), ChunkId::new(0, 0), BuildingBlockMask::FLOOR_SPRITE, 4, 4);
        let chunk = result.unwrap();
        assert_eq!(chunk.cell_count(), 16);
        assert!(ext.is_none());
    }

    #[test]
    fn spooler_loads_a_requested_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SpoolerHandle::spawn(dir.path().to_path_buf(), BuildingBlockMask::FLOOR_SPRITE, 4, 4);
        handle.request_load(ChunkId::new(2, 3), 0);
        let completion = handle.blocking_recv_completion().unwrap();
        assert_eq!(completion.id, ChunkId::new(2, 3));
        assert!(completion.result.is_ok());
    }

    #[test]
    fn cancelling_a_queued_request_drops_its_completion() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SpoolerHandle::spawn(dir.path().to_path_buf(), BuildingBlockMask::FLOOR_SPRITE, 4, 4);
        handle.request_load(ChunkId::new(0, 0), 0);
        handle.cancel(ChunkId::new(0, 0));
        handle.request_load(ChunkId::new(1, 0), 0);
        let completion = handle.blocking_recv_completion().unwrap();
        assert_eq!(completion.id, ChunkId::new(1, 0));
    }
}
