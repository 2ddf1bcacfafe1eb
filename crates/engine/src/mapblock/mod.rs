//! Persisted map blocks and their versioned binary encoding.
//!
//! A map block is a 16x16x16 cube of nodes stored as one opaque blob. The
//! blob starts with a version byte; versions 25..=28 use two zlib streams
//! (node grid and node metadata) surrounded by uncompressed tables, version
//! 29 wraps the whole payload in a single zstd frame.

mod decode;
mod error;
mod reader;

use std::collections::HashMap;

use crate::world::node::{ContentId, Node};
use crate::world::{MAPBLOCK_VOLUME, NODE_DATA_LEN, node_index};

pub use decode::decode;
pub use error::DecodeError;

/// Oldest block version the decoder accepts.
pub const MIN_SUPPORTED_VERSION: u8 = 25;
/// Newest block version the decoder accepts.
pub const MAX_SUPPORTED_VERSION: u8 = 29;
/// First version stored as a single zstd frame.
pub const ZSTD_VERSION: u8 = 29;
/// First legacy version carrying the `lighting_complete` field.
pub const LIGHTING_COMPLETE_VERSION: u8 = 27;

/// Required `content_width` / `param_width` marker value.
pub const NODE_FIELD_WIDTH: u8 = 2;
/// Required static object table version.
pub const STATIC_OBJECT_VERSION: u8 = 0;
/// Required name-id mapping table version.
pub const MAPPING_VERSION: u8 = 0;
/// Required size of one serialized node timer.
pub const NODE_TIMER_DATA_LEN: u8 = 10;

/// Byte offset of the `param1` plane inside the node grid.
const PARAM1_OFFSET: usize = MAPBLOCK_VOLUME * 2;
/// Byte offset of the `param2` plane inside the node grid.
const PARAM2_OFFSET: usize = MAPBLOCK_VOLUME * 3;

/// A non-grid-aligned object saved with a block (dropped items, mobs, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticObject {
    pub kind: u8,
    /// Fine-grained position (node units scaled by 10 000).
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: Vec<u8>,
}

/// A scheduled countdown attached to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeTimer {
    /// Index into the node grid.
    pub position: u16,
    pub timeout: i32,
    pub elapsed: i32,
}

/// One decoded map block.
///
/// Built only by [`decode`] and never mutated afterwards. `node_data` holds
/// [`NODE_DATA_LEN`] bytes laid out as 4096 big-endian content ids, then
/// 4096 `param1` bytes, then 4096 `param2` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapBlock {
    pub version: u8,
    pub flags: u8,
    pub lighting_complete: u16,
    pub timestamp: u32,
    pub mappings: HashMap<u16, String>,
    pub node_data: Vec<u8>,
    /// Raw (already inflated) node metadata. Legacy versions only.
    pub node_meta: Vec<u8>,
    /// Legacy versions only.
    pub static_objects: Vec<StaticObject>,
    /// Legacy versions only.
    pub node_timers: Vec<NodeTimer>,
}

impl MapBlock {
    /// Content id of the node at flat `index`, or `None` past the grid.
    pub fn content_id(&self, index: usize) -> Option<ContentId> {
        if index >= MAPBLOCK_VOLUME {
            return None;
        }
        let bytes = self.node_data.get(index * 2..index * 2 + 2)?;
        Some(ContentId(u16::from_be_bytes([bytes[0], bytes[1]])))
    }

    /// Node at flat `index` (see [`crate::world::node_index`]).
    pub fn node(&self, index: usize) -> Option<Node> {
        if index >= MAPBLOCK_VOLUME || self.node_data.len() < NODE_DATA_LEN {
            return None;
        }
        Some(Node {
            content_id: self.content_id(index)?,
            param1: self.node_data[PARAM1_OFFSET + index],
            param2: self.node_data[PARAM2_OFFSET + index],
        })
    }

    /// Node at block-local coordinates (each in `0..16`).
    pub fn node_at(&self, x: u8, y: u8, z: u8) -> Option<Node> {
        if [x, y, z].iter().any(|&c| c as usize >= crate::world::MAPBLOCK_SIZE) {
            return None;
        }
        self.node(node_index(x, y, z))
    }

    /// Resolve a content id through this block's own mapping.
    pub fn content_name(&self, id: ContentId) -> Option<&str> {
        self.mappings.get(&id.0).map(String::as_str)
    }

    /// Content ids of the node grid in storage order.
    ///
    /// Yields one id per complete 2-byte pair in the content-id plane, so a
    /// truncated grid yields fewer than 4096 ids.
    pub fn content_ids(&self) -> impl Iterator<Item = ContentId> + '_ {
        let plane = &self.node_data[..self.node_data.len().min(PARAM1_OFFSET)];
        plane
            .chunks_exact(2)
            .map(|pair| ContentId(u16::from_be_bytes([pair[0], pair[1]])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with(index: usize, id: u16, param1: u8, param2: u8) -> MapBlock {
        let mut node_data = vec![0u8; NODE_DATA_LEN];
        node_data[index * 2..index * 2 + 2].copy_from_slice(&id.to_be_bytes());
        node_data[PARAM1_OFFSET + index] = param1;
        node_data[PARAM2_OFFSET + index] = param2;
        MapBlock {
            node_data,
            ..Default::default()
        }
    }

    #[test]
    fn node_reads_all_three_planes() {
        let index = node_index(3, 4, 5);
        let block = grid_with(index, 0x0102, 7, 9);
        let node = block.node_at(3, 4, 5).unwrap();
        assert_eq!(node.content_id, ContentId(0x0102));
        assert_eq!(node.param1, 7);
        assert_eq!(node.param2, 9);
        assert_eq!(block.node_at(0, 0, 0).unwrap(), Node::default());
    }

    #[test]
    fn node_out_of_bounds() {
        let block = grid_with(0, 1, 0, 0);
        assert!(block.node(MAPBLOCK_VOLUME).is_none());
        assert!(block.node_at(16, 0, 0).is_none());
        assert!(block.node(usize::MAX).is_none());
    }

    #[test]
    fn content_id_out_of_bounds() {
        let block = grid_with(MAPBLOCK_VOLUME - 1, 6, 1, 1);
        assert_eq!(block.content_id(MAPBLOCK_VOLUME - 1), Some(ContentId(6)));
        // Past the id plane the grid holds param bytes, not ids.
        assert_eq!(block.content_id(MAPBLOCK_VOLUME), None);
        assert_eq!(block.content_id(usize::MAX), None);
    }

    #[test]
    fn content_ids_stop_at_param_planes() {
        let block = grid_with(0, 5, 0xff, 0xff);
        let ids: Vec<_> = block.content_ids().collect();
        assert_eq!(ids.len(), MAPBLOCK_VOLUME);
        assert_eq!(ids[0], ContentId(5));
        assert!(ids[1..].iter().all(|id| *id == ContentId(0)));
    }

    #[test]
    fn content_name_uses_block_mapping() {
        let mut block = MapBlock::default();
        block.mappings.insert(3, "default:stone".into());
        assert_eq!(block.content_name(ContentId(3)), Some("default:stone"));
        assert_eq!(block.content_name(ContentId(4)), None);
    }
}
