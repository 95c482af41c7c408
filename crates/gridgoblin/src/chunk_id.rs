//! Chunk coordinates and cell-to-chunk decomposition.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub x: u16,
    pub y: u16,
}

impl ChunkId {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Global cell coordinates, decomposed into the owning chunk plus a
/// local offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAddress {
    pub chunk: ChunkId,
    pub local_x: u16,
    pub local_y: u16,
}

/// Decomposes a global cell coordinate against the configured chunk size.
pub fn decompose(cell_x: i64, cell_y: i64, cells_per_chunk_x: u16, cells_per_chunk_y: u16) -> CellAddress {
    let cpx = cells_per_chunk_x as i64;
    let cpy = cells_per_chunk_y as i64;
    let chunk_x = cell_x.div_euclid(cpx);
    let chunk_y = cell_y.div_euclid(cpy);
    let local_x = cell_x.rem_euclid(cpx);
    let local_y = cell_y.rem_euclid(cpy);
    CellAddress {
        chunk: ChunkId::new(chunk_x as u16, chunk_y as u16),
        local_x: local_x as u16,
        local_y: local_y as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_into_chunk_and_local_offset() {
        let addr = decompose(37, 5, 16, 16);
        assert_eq!(addr.chunk, ChunkId::new(2, 0));
        assert_eq!(addr.local_x, 5);
        assert_eq!(addr.local_y, 5);
    }
}
