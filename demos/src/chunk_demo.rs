use gridgoblin::{ActiveArea, BuildingBlockMask, ChunkId, ChunkStore, LoadPolicy, WorldConfig};
use tracing::info;

pub fn run(max_nonessential: usize) {
    let storage_dir = std::env::temp_dir().join(format!("gridgoblin-demo-{}", std::process::id()));

    let config = WorldConfig {
        chunk_count_x: 8,
        chunk_count_y: 8,
        cells_per_chunk_x: 16,
        cells_per_chunk_y: 16,
        building_blocks: BuildingBlockMask::FLOOR_SPRITE | BuildingBlockMask::SPATIAL_INFO,
        max_loaded_nonessential_chunks: max_nonessential,
        ..Default::default()
    };

    let mut store = ChunkStore::open(config, storage_dir.clone(), None).expect("world storage should open");

    let origin = ChunkId::new(0, 0);
    let chunk = store.get_chunk_at_id_unchecked(origin, LoadPolicy::LoadIfMissing);
    info!(?origin, resident = chunk.is_some(), "synchronous load-if-missing");

    let mut area = ActiveArea::new();
    let watched: Vec<ChunkId> = (0..4).map(|x| ChunkId::new(x, 0)).collect();
    let delta = area.set_chunks(watched.iter().map(|&id| (id, BuildingBlockMask::FLOOR_SPRITE)));
    store.apply_active_area_delta(&delta);

    for _ in 0..64 {
        store.update();
        if watched.iter().all(|&id| store.is_resident(id)) {
            break;
        }
        std::thread::yield_now();
    }
    info!(count = watched.iter().filter(|&&id| store.is_resident(id)).count(), "active area loaded");

    let delta = area.clear_as_delta();
    store.apply_active_area_delta(&delta);
    store.update();
    store.prune();

    info!(
        free_chunks = store.free_chunk_count(),
        storage_dir = %storage_dir.display(),
        "chunk demo finished"
    );
}
