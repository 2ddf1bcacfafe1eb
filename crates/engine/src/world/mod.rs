//! Fixed world geometry: map block positions, scan regions and node layout.

pub mod node;
pub mod position;

/// Number of nodes along each axis of a map block.
pub const MAPBLOCK_SIZE: usize = 16;

/// Total node count in one map block.
pub const MAPBLOCK_VOLUME: usize = MAPBLOCK_SIZE * MAPBLOCK_SIZE * MAPBLOCK_SIZE;

/// Bytes one node occupies in a decompressed node grid
/// (2-byte content id + `param1` + `param2`).
pub const NODE_SIZE: usize = 4;

/// Exact length of a decompressed node grid, for every format version.
pub const NODE_DATA_LEN: usize = MAPBLOCK_VOLUME * NODE_SIZE;

/// Flat index of a node inside a map block.
///
/// Stored in ZYX order: x varies fastest, then y, then z.
#[inline]
pub const fn node_index(x: u8, y: u8, z: u8) -> usize {
    (z as usize) * MAPBLOCK_SIZE * MAPBLOCK_SIZE + (y as usize) * MAPBLOCK_SIZE + (x as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_grid_is_sixteen_kib() {
        assert_eq!(NODE_DATA_LEN, 16 * 16 * 16 * 4);
    }

    #[test]
    fn node_index_bounds() {
        assert_eq!(node_index(0, 0, 0), 0);
        assert_eq!(node_index(1, 0, 0), 1);
        assert_eq!(node_index(0, 1, 0), 16);
        assert_eq!(node_index(0, 0, 1), 256);
        assert_eq!(node_index(15, 15, 15), MAPBLOCK_VOLUME - 1);
    }
}
