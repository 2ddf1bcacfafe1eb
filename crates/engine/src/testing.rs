//! Block encoder for building fixtures. Writes the same layouts the decoder
//! reads; not used by any production path.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::mapblock::{
    LIGHTING_COMPLETE_VERSION, MAPPING_VERSION, MapBlock, NODE_FIELD_WIDTH, NODE_TIMER_DATA_LEN,
    STATIC_OBJECT_VERSION, ZSTD_VERSION,
};
use crate::world::NODE_DATA_LEN;

/// A block whose nodes all use content id 0, with `names` mapped to ids
/// `0..names.len()`.
pub fn block_with_mappings(names: &[&str]) -> MapBlock {
    MapBlock {
        version: ZSTD_VERSION,
        mappings: names
            .iter()
            .enumerate()
            .map(|(id, name)| (id as u16, name.to_string()))
            .collect(),
        node_data: vec![0; NODE_DATA_LEN],
        ..Default::default()
    }
}

/// Overwrite the content id of the node at flat `index`.
pub fn set_content_id(block: &mut MapBlock, index: usize, id: u16) {
    block.node_data[index * 2..index * 2 + 2].copy_from_slice(&id.to_be_bytes());
}

/// Encode `block` using the layout of `block.version`.
pub fn encode(block: &MapBlock) -> Vec<u8> {
    if block.version < ZSTD_VERSION {
        encode_legacy(block)
    } else {
        encode_zstd(block)
    }
}

/// Constant marker bytes of the legacy layout. `Default` writes the values
/// the decoder requires; tests override one to exercise its check.
#[derive(Debug, Clone, Copy)]
pub struct LegacyMarkers {
    pub content_width: u8,
    pub param_width: u8,
    pub static_object_version: u8,
    pub mapping_version: u8,
    pub timer_data_len: u8,
}

impl Default for LegacyMarkers {
    fn default() -> Self {
        Self {
            content_width: NODE_FIELD_WIDTH,
            param_width: NODE_FIELD_WIDTH,
            static_object_version: STATIC_OBJECT_VERSION,
            mapping_version: MAPPING_VERSION,
            timer_data_len: NODE_TIMER_DATA_LEN,
        }
    }
}

/// Legacy zlib layout (versions 25..=28).
pub fn encode_legacy(block: &MapBlock) -> Vec<u8> {
    encode_legacy_with(block, LegacyMarkers::default())
}

pub fn encode_legacy_with(block: &MapBlock, markers: LegacyMarkers) -> Vec<u8> {
    let mut out = vec![block.version, block.flags];
    if block.version >= LIGHTING_COMPLETE_VERSION {
        out.extend(block.lighting_complete.to_be_bytes());
    }
    out.extend([markers.content_width, markers.param_width]);
    out.extend(zlib(&block.node_data));
    out.extend(zlib(&block.node_meta));

    out.push(markers.static_object_version);
    out.extend((block.static_objects.len() as u16).to_be_bytes());
    for object in &block.static_objects {
        out.push(object.kind);
        out.extend(object.x.to_be_bytes());
        out.extend(object.y.to_be_bytes());
        out.extend(object.z.to_be_bytes());
        out.extend((object.data.len() as u16).to_be_bytes());
        out.extend(&object.data);
    }

    out.extend(block.timestamp.to_be_bytes());
    write_mappings(&mut out, block, markers.mapping_version);

    out.push(markers.timer_data_len);
    out.extend((block.node_timers.len() as u16).to_be_bytes());
    for timer in &block.node_timers {
        out.extend(timer.position.to_be_bytes());
        out.extend(timer.timeout.to_be_bytes());
        out.extend(timer.elapsed.to_be_bytes());
    }
    out
}

/// zstd layout (version 29). Only the fields the decoder reads are written,
/// followed by an empty trailer the decoder ignores.
pub fn encode_zstd(block: &MapBlock) -> Vec<u8> {
    let mut payload = vec![block.flags];
    payload.extend(block.lighting_complete.to_be_bytes());
    payload.extend(block.timestamp.to_be_bytes());
    write_mappings(&mut payload, block, MAPPING_VERSION);
    payload.extend([NODE_FIELD_WIDTH, NODE_FIELD_WIDTH]);
    payload.extend(&block.node_data);
    // Empty node metadata, static objects and timers.
    payload.extend([0u8; 8]);

    let mut out = vec![block.version];
    out.extend(zstd::stream::encode_all(payload.as_slice(), 0).expect("in-memory zstd encode"));
    out
}

fn write_mappings(out: &mut Vec<u8>, block: &MapBlock, version: u8) {
    // Sorted so fixtures are byte-for-byte reproducible.
    let mut mappings: Vec<_> = block.mappings.iter().collect();
    mappings.sort();

    out.push(version);
    out.extend((mappings.len() as u16).to_be_bytes());
    for (id, name) in mappings {
        out.extend(id.to_be_bytes());
        out.extend((name.len() as u16).to_be_bytes());
        out.extend(name.as_bytes());
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory zlib write");
    encoder.finish().expect("in-memory zlib finish")
}
