use std::collections::HashMap;

use super::reader::ByteReader;
use super::{
    DecodeError, LIGHTING_COMPLETE_VERSION, MAPPING_VERSION, MAX_SUPPORTED_VERSION,
    MIN_SUPPORTED_VERSION, MapBlock, NODE_FIELD_WIDTH, NODE_TIMER_DATA_LEN, NodeTimer,
    STATIC_OBJECT_VERSION, StaticObject, ZSTD_VERSION,
};
use crate::world::NODE_DATA_LEN;

/// Decode one stored map block.
///
/// Pure: no I/O, no logging, no state shared between calls. The version
/// byte is checked before anything else is read.
pub fn decode(data: &[u8]) -> Result<MapBlock, DecodeError> {
    decode_from(&mut ByteReader::new(data))
}

pub(crate) fn decode_from(r: &mut ByteReader<'_>) -> Result<MapBlock, DecodeError> {
    let version = r.read_u8()?;
    if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    if version < ZSTD_VERSION {
        decode_legacy(r, version)
    } else {
        decode_zstd(r, version)
    }
}

// ── Legacy (zlib) layout, versions 25..=28 ──────────────────────────────────

fn decode_legacy(r: &mut ByteReader<'_>, version: u8) -> Result<MapBlock, DecodeError> {
    let mut block = MapBlock {
        version,
        flags: r.read_u8()?,
        ..Default::default()
    };

    if version >= LIGHTING_COMPLETE_VERSION {
        block.lighting_complete = r.read_u16()?;
    }

    let content_width = r.read_u8()?;
    if content_width != NODE_FIELD_WIDTH {
        return Err(DecodeError::InvalidContentWidth(content_width));
    }
    let param_width = r.read_u8()?;
    if param_width != NODE_FIELD_WIDTH {
        return Err(DecodeError::InvalidParamWidth(param_width));
    }

    block.node_data = r.read_zlib()?;
    if block.node_data.len() != NODE_DATA_LEN {
        return Err(DecodeError::InvalidNodeDataLength(block.node_data.len()));
    }
    block.node_meta = r.read_zlib()?;

    let static_object_version = r.read_u8()?;
    if static_object_version != STATIC_OBJECT_VERSION {
        return Err(DecodeError::InvalidStaticObjectVersion(static_object_version));
    }
    block.static_objects = read_static_objects(r)?;

    block.timestamp = r.read_u32()?;

    let mapping_version = r.read_u8()?;
    if mapping_version != MAPPING_VERSION {
        return Err(DecodeError::InvalidMappingVersion(mapping_version));
    }
    block.mappings = read_mappings(r)?;

    let timer_data_len = r.read_u8()?;
    if timer_data_len != NODE_TIMER_DATA_LEN {
        return Err(DecodeError::InvalidTimerDataLength(timer_data_len));
    }
    block.node_timers = read_node_timers(r)?;

    Ok(block)
}

fn read_static_objects(r: &mut ByteReader<'_>) -> Result<Vec<StaticObject>, DecodeError> {
    let count = r.read_u16()?;
    (0..count)
        .map(|_| -> Result<StaticObject, DecodeError> {
            Ok(StaticObject {
                kind: r.read_u8()?,
                x: r.read_i32()?,
                y: r.read_i32()?,
                z: r.read_i32()?,
                data: r.read_blob()?.to_vec(),
            })
        })
        .collect()
}

fn read_node_timers(r: &mut ByteReader<'_>) -> Result<Vec<NodeTimer>, DecodeError> {
    let count = r.read_u16()?;
    (0..count)
        .map(|_| -> Result<NodeTimer, DecodeError> {
            Ok(NodeTimer {
                position: r.read_u16()?,
                timeout: r.read_i32()?,
                elapsed: r.read_i32()?,
            })
        })
        .collect()
}

/// `u16` count followed by `(id: u16, name: string)` pairs. A repeated id
/// keeps the last name.
fn read_mappings(r: &mut ByteReader<'_>) -> Result<HashMap<u16, String>, DecodeError> {
    let count = r.read_u16()?;
    let mut mappings = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_u16()?;
        let name = r.read_string()?;
        mappings.insert(id, name);
    }
    Ok(mappings)
}

// ── zstd layout, version 29 ─────────────────────────────────────────────────

fn decode_zstd(r: &mut ByteReader<'_>, version: u8) -> Result<MapBlock, DecodeError> {
    let len = r.remaining().len();
    let compressed = r.read_bytes(len)?;
    let payload = zstd::stream::decode_all(compressed)
        .map_err(|e| DecodeError::CorruptCompressedStream(e.to_string()))?;
    let mut r = ByteReader::new(&payload);

    let mut block = MapBlock {
        version,
        flags: r.read_u8()?,
        lighting_complete: r.read_u16()?,
        timestamp: r.read_u32()?,
        ..Default::default()
    };

    // Mapping version: position reserved, value not checked for this layout.
    r.read_u8()?;
    block.mappings = read_mappings(&mut r)?;

    // content_width / param_width: likewise read but not checked.
    r.read_u8()?;
    r.read_u8()?;

    block.node_data = r.read_bytes(NODE_DATA_LEN)?.to_vec();

    // Node metadata, static objects and timers follow the grid in this
    // layout; they are left unread.
    Ok(block)
}
