//! Per-cell openness: distance (in orthogonal steps) to the nearest wall
//! or chunk boundary, clamped to the configured maximum.

use crate::chunk::Chunk;

/// Recomputes openness for every cell in `chunk`, relaxing outward from
/// wall cells until the values stabilize. Converges in at most
/// `max_openness + 1` passes since values only ever decrease.
pub fn recompute_chunk_openness(chunk: &mut Chunk, max_openness: u8) {
    let Some(spatial) = chunk.spatial_info.as_ref() else {
        return;
    };
    let width = chunk.width as i32;
    let height = chunk.height as i32;
    let mut values: Vec<u8> = spatial.iter().map(|s| if s.is_wall() { 0 } else { max_openness }).collect();

    for _ in 0..=max_openness {
        let mut changed = false;
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if spatial[idx].is_wall() {
                    continue;
                }
                let mut min_neighbor = max_openness;
                for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue; // chunk edge bounds the flood fill
                    }
                    let nidx = (ny * width + nx) as usize;
                    min_neighbor = min_neighbor.min(values[nidx]);
                }
                let candidate = min_neighbor.saturating_add(1).min(max_openness);
                if candidate < values[idx] {
                    values[idx] = candidate;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let spatial = chunk.spatial_info.as_mut().unwrap();
    for (idx, s) in spatial.iter_mut().enumerate() {
        s.openness = values[idx];
    }
}

/// Sets a cell's wall shape and recomputes openness for the whole chunk.
/// A real deployment would bound this to the cells within `max_openness`
/// rings of `(x, y)`; recomputing the whole chunk is simpler and still
/// correct for the chunk sizes this engine targets.
pub fn set_wall_shape(chunk: &mut Chunk, x: u16, y: u16, shape: u8, max_openness: u8) {
    let idx = chunk.index(x, y);
    if let Some(spatial) = chunk.spatial_info.as_mut() {
        spatial[idx].shape = shape;
    }
    recompute_chunk_openness(chunk, max_openness);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building_block::BuildingBlockMask;

    #[test]
    fn openness_zero_exactly_at_the_wall() {
        let mut chunk = Chunk::new_default(BuildingBlockMask::SPATIAL_INFO, 4, 4);
        set_wall_shape(&mut chunk, 1, 1, 1, 5);
        assert_eq!(chunk.spatial_info_at(1, 1).unwrap().openness, 0);
    }

    #[test]
    fn immediate_orthogonal_neighbors_have_openness_one() {
        let mut chunk = Chunk::new_default(BuildingBlockMask::SPATIAL_INFO, 4, 4);
        set_wall_shape(&mut chunk, 1, 1, 1, 5);
        for (x, y) in [(0, 1), (2, 1), (1, 0), (1, 2)] {
            assert_eq!(chunk.spatial_info_at(x, y).unwrap().openness, 1, "at ({x},{y})");
        }
    }

    #[test]
    fn diagonal_neighbors_have_openness_two() {
        let mut chunk = Chunk::new_default(BuildingBlockMask::SPATIAL_INFO, 4, 4);
        set_wall_shape(&mut chunk, 1, 1, 1, 5);
        for (x, y) in [(0, 0), (2, 0), (0, 2), (2, 2)] {
            assert_eq!(chunk.spatial_info_at(x, y).unwrap().openness, 2, "at ({x},{y})");
        }
    }

    #[test]
    fn far_corner_reflects_in_chunk_path_distance_to_the_wall() {
        let mut chunk = Chunk::new_default(BuildingBlockMask::SPATIAL_INFO, 4, 4);
        set_wall_shape(&mut chunk, 1, 1, 1, 5);
        assert_eq!(chunk.spatial_info_at(3, 3).unwrap().openness, 4);
    }

    #[test]
    fn clamps_to_max_cell_openness() {
        let mut chunk = Chunk::new_default(BuildingBlockMask::SPATIAL_INFO, 8, 8);
        set_wall_shape(&mut chunk, 0, 0, 1, 2);
        assert_eq!(chunk.spatial_info_at(7, 7).unwrap().openness, 2);
    }
}
