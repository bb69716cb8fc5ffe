//! # Shard decoder
//!
//! Parses a shard byte buffer into a [`Shard`], dispatching on the version byte. Pure function
//! of its input buffer: no logging, no I/O. Logging belongs at the I/O-facing layer that fetches
//! the bytes in the first place, not here.

use crate::primitives::{decode_length_prefixed_table, decode_prefix_table, ByteCursor, DecodeError};
use crate::trie::{Edge, Kind, Location, Trie, TrieNode, Value};

const MAGIC: &[u8; 4] = b"STRI";
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Supported shard versions. 1, 2 and 8 are intentionally rejected: 8 was a short-lived,
/// never-widely-deployed format and is treated the same as any other unsupported version, with
/// no special casing.
const SUPPORTED_VERSIONS: &[u8] = &[3, 4, 5, 6, 7, 9, 10, 11, 12];

#[derive(Debug, Clone, Default)]
pub struct Shard {
    pub scale_factor: i32,
    pub place_node_table: Vec<String>,
    pub place_city_table: Vec<String>,
    /// Standalone locations array; populated only for versions <= 6, where trie values are
    /// indices into this array. Empty for versions >= 7, where values are inlined.
    pub locations: Vec<Location>,
    pub trie: Trie,
    pub locations_count: usize,
}

impl Shard {
    /// Resolves a trie [`Value`] to its [`Location`], uniformly across storage strategies.
    pub fn resolve(&self, value: &Value) -> Option<Location> {
        match value {
            Value::Indirect(idx) => self.locations.get(*idx as usize).copied(),
            Value::Inline(loc) => Some(*loc),
        }
    }
}

/// Detects and strips a gzip header, handing the remaining bytes off to a caller-supplied
/// gunzip collaborator. Returns the bytes unchanged if they aren't gzip-prefixed.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0..2] == GZIP_MAGIC
}

/// # Errors
///
/// Returns [`DecodeError::BadMagic`] if the header magic isn't `"STRI"`,
/// [`DecodeError::UnsupportedVersion`] for any version outside {3,4,5,6,7,9,10,11,12}, or
/// [`DecodeError::BadFormat`] for any other structural inconsistency (truncated buffer,
/// invalid UTF-8, out-of-range kind byte, etc), always carrying the byte offset.
pub fn decode(bytes: &[u8]) -> Result<Shard, DecodeError> {
    let mut cursor = ByteCursor::new(bytes);

    let magic_offset = cursor.offset();
    let magic = cursor.read_bytes(4)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic { offset: magic_offset });
    }

    let version = cursor.read_u8()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion { version });
    }

    let scale = read_scale(&mut cursor, version)?;

    let place_node_count = cursor.read_varint_u32()? as usize;
    let place_node_table = decode_table(&mut cursor, version, place_node_count)?;
    let place_city_count = cursor.read_varint_u32()? as usize;
    let place_city_table = decode_table(&mut cursor, version, place_city_count)?;

    let locations = if version <= 5 {
        read_standalone_locations(
            &mut cursor,
            version,
            scale,
            place_node_table.len(),
            place_city_table.len(),
        )?
    } else {
        Vec::new()
    };

    let label_table = if version == 4 {
        let count = cursor.read_varint_u32()? as usize;
        decode_length_prefixed_table(&mut cursor, count)?
    } else {
        Vec::new()
    };

    let node_count_offset = cursor.offset();
    let node_count = cursor.read_varint_u32()? as usize;
    if node_count == 0 {
        return Err(DecodeError::bad_format(
            node_count_offset,
            "nodeCount must be at least 1: node 0 is always the trie root",
        ));
    }

    let trie = if version >= 7 {
        read_louds_nodes(
            &mut cursor,
            version,
            node_count,
            scale,
            place_node_table.len(),
            place_city_table.len(),
        )?
    } else {
        read_legacy_nodes(
            &mut cursor,
            version,
            node_count,
            &label_table,
            scale,
            place_node_table.len(),
            place_city_table.len(),
        )?
    };

    let locations_count = if version <= 5 {
        locations.len()
    } else {
        trie.nodes.iter().map(|n| n.values.len()).sum()
    };

    Ok(Shard {
        scale_factor: scale,
        place_node_table,
        place_city_table,
        locations,
        trie,
        locations_count,
    })
}

fn read_scale(cursor: &mut ByteCursor<'_>, version: u8) -> Result<i32, DecodeError> {
    match version {
        5 | 6 | 7 | 9 | 10 | 11 | 12 => Ok(cursor.read_uint24_le()? as i32),
        3 | 4 => cursor.read_i32_le(),
        _ => unreachable!("version already validated against SUPPORTED_VERSIONS"),
    }
}

fn decode_table(cursor: &mut ByteCursor<'_>, version: u8, count: usize) -> Result<Vec<String>, DecodeError> {
    if version >= 9 {
        decode_prefix_table(cursor, count)
    } else {
        decode_length_prefixed_table(cursor, count)
    }
}

fn read_standalone_locations(
    cursor: &mut ByteCursor<'_>,
    version: u8,
    scale: i32,
    place_node_count: usize,
    place_city_count: usize,
) -> Result<Vec<Location>, DecodeError> {
    let count = cursor.read_varint_u32()? as usize;
    let mut locations = Vec::with_capacity(count);
    for _ in 0..count {
        let (lon_int, lat_int) = if version == 5 {
            (cursor.read_int24_le()?, cursor.read_int24_le()?)
        } else {
            (cursor.read_i32_le()?, cursor.read_i32_le()?)
        };
        let idx_offset = cursor.offset();
        let node_idx = cursor.read_varint_u32()?;
        let city_idx = cursor.read_varint_u32()?;
        check_table_index(idx_offset, "placeNodeIdx", node_idx, place_node_count)?;
        check_table_index(idx_offset, "placeCityIdx", city_idx, place_city_count)?;
        locations.push(Location {
            lon: f64::from(lon_int) / f64::from(scale),
            lat: f64::from(lat_int) / f64::from(scale),
            place_node_idx: node_idx,
            place_city_idx: city_idx,
            kind: Kind::Street,
            population_bucket: 0,
        });
    }
    Ok(locations)
}

/// Validates a decoded `placeNodeIdx`/`placeCityIdx` against the already-decoded table it
/// indexes into, per spec §8's P2 ("every decoded value's (nodeIdx, cityIdx) is in range of
/// the corresponding tables"). Both place tables are fully decoded before any location or
/// trie value is read, so this check is always available at the point of use.
fn check_table_index(offset: usize, field: &str, idx: u32, table_len: usize) -> Result<(), DecodeError> {
    if idx as usize >= table_len {
        return Err(DecodeError::bad_format(
            offset,
            format!("{field} {idx} out of range for table of length {table_len}"),
        ));
    }
    Ok(())
}

/// Reads the geometric/place prefix shared by every value record in versions >= 6:
/// `(int24 lon, int24 lat, varint nodeIdx, varint cityIdx)`.
fn read_value_geometry(
    cursor: &mut ByteCursor<'_>,
    scale: i32,
    place_node_count: usize,
    place_city_count: usize,
) -> Result<(f64, f64, u32, u32), DecodeError> {
    let lon_int = cursor.read_int24_le()?;
    let lat_int = cursor.read_int24_le()?;
    let idx_offset = cursor.offset();
    let node_idx = cursor.read_varint_u32()?;
    let city_idx = cursor.read_varint_u32()?;
    check_table_index(idx_offset, "placeNodeIdx", node_idx, place_node_count)?;
    check_table_index(idx_offset, "placeCityIdx", city_idx, place_city_count)?;
    Ok((
        f64::from(lon_int) / f64::from(scale),
        f64::from(lat_int) / f64::from(scale),
        node_idx,
        city_idx,
    ))
}

fn kind_from_byte(offset: usize, byte: u8) -> Result<Kind, DecodeError> {
    Kind::try_from(byte).map_err(|_| DecodeError::bad_format(offset, format!("kind byte {byte} out of range 0..=15")))
}

/// Threads the version-11 "two kinds packed per byte" state across the whole per-node value
/// stream, in encounter order: the low nibble of a byte is consumed first, the high nibble is
/// held over for whichever value (possibly in the next node) reads it next.
#[derive(Default)]
struct NibblePending {
    pending: Option<u8>,
}

impl NibblePending {
    fn next(&mut self, cursor: &mut ByteCursor<'_>) -> Result<Kind, DecodeError> {
        let offset = cursor.offset();
        let nibble = if let Some(p) = self.pending.take() {
            p
        } else {
            let byte = cursor.read_u8()?;
            self.pending = Some((byte >> 4) & 0x0F);
            byte & 0x0F
        };
        kind_from_byte(offset, nibble)
    }
}

fn read_legacy_nodes(
    cursor: &mut ByteCursor<'_>,
    version: u8,
    node_count: usize,
    label_table: &[String],
    scale: i32,
    place_node_count: usize,
    place_city_count: usize,
) -> Result<Trie, DecodeError> {
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let edge_count = cursor.read_varint_u32()? as usize;
        let mut edges = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            let label = if version == 4 {
                let idx = cursor.read_varint_u32()? as usize;
                label_table
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| DecodeError::bad_format(cursor.offset(), "label table index out of range"))?
            } else {
                cursor.read_length_prefixed_utf8()?
            };
            let child_offset = cursor.offset();
            let child = cursor.read_varint_u32()? as usize;
            if child >= node_count {
                return Err(DecodeError::bad_format(
                    child_offset,
                    format!("edge child {child} out of range for {node_count} nodes"),
                ));
            }
            edges.push(Edge { label, child });
        }

        let value_count = cursor.read_varint_u32()? as usize;
        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            if version == 6 {
                let (lon, lat, node_idx, city_idx) =
                    read_value_geometry(cursor, scale, place_node_count, place_city_count)?;
                // Version 6 has no kind byte; it defaults to Street (0).
                values.push(Value::Inline(Location {
                    lon,
                    lat,
                    place_node_idx: node_idx,
                    place_city_idx: city_idx,
                    kind: Kind::Street,
                    population_bucket: 0,
                }));
            } else {
                let idx = cursor.read_varint_u32()?;
                values.push(Value::Indirect(idx));
            }
        }

        nodes.push(TrieNode { edges, values });
    }
    Ok(Trie { nodes })
}

fn read_louds_nodes(
    cursor: &mut ByteCursor<'_>,
    version: u8,
    node_count: usize,
    scale: i32,
    place_node_count: usize,
    place_city_count: usize,
) -> Result<Trie, DecodeError> {
    let bit_count = cursor.read_varint_u32()? as usize;
    let bitmap_len = bit_count.div_ceil(8);
    let bitmap = cursor.read_bytes(bitmap_len)?;

    let edge_count = cursor.read_varint_u32()? as usize;
    let mut edge_labels = Vec::with_capacity(edge_count);
    for _ in 0..edge_count {
        edge_labels.push(cursor.read_length_prefixed_utf8()?);
    }

    let mut nodes = vec![TrieNode::default(); node_count];
    let mut node_cursor = 0usize;
    let mut edge_cursor = 0usize;
    for bit_idx in 0..bit_count {
        if node_cursor >= node_count {
            break;
        }
        let byte = bitmap[bit_idx / 8];
        let bit = (byte >> (bit_idx % 8)) & 1;
        if bit == 1 {
            let edge_offset = cursor.offset();
            let label = edge_labels
                .get(edge_cursor)
                .cloned()
                .ok_or_else(|| DecodeError::bad_format(edge_offset, "LOUDS edge cursor out of range"))?;
            let child = edge_cursor + 1;
            if child >= node_count {
                return Err(DecodeError::bad_format(
                    edge_offset,
                    format!("LOUDS edge child {child} out of range for {node_count} nodes"),
                ));
            }
            nodes[node_cursor].edges.push(Edge { label, child });
            edge_cursor += 1;
        } else {
            node_cursor += 1;
        }
    }
    nodes.truncate(node_count);

    let mut nibble_pending = NibblePending::default();
    for node in nodes.iter_mut() {
        let value_count = cursor.read_varint_u32()? as usize;
        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let (lon, lat, node_idx, city_idx) =
                read_value_geometry(cursor, scale, place_node_count, place_city_count)?;
            let (kind, population_bucket) = read_kind_suffix(cursor, version, &mut nibble_pending)?;
            values.push(Value::Inline(Location {
                lon,
                lat,
                place_node_idx: node_idx,
                place_city_idx: city_idx,
                kind,
                population_bucket,
            }));
        }
        node.values = values;
    }

    Ok(Trie { nodes })
}

fn read_kind_suffix(
    cursor: &mut ByteCursor<'_>,
    version: u8,
    nibble_pending: &mut NibblePending,
) -> Result<(Kind, u8), DecodeError> {
    match version {
        7 | 9 => Ok((Kind::Street, 0)),
        10 => {
            let offset = cursor.offset();
            let byte = cursor.read_u8()?;
            Ok((kind_from_byte(offset, byte)?, 0))
        }
        11 => Ok((nibble_pending.next(cursor)?, 0)),
        12 => {
            let offset = cursor.offset();
            let byte = cursor.read_u8()?;
            let kind = kind_from_byte(offset, byte & 0x0F)?;
            let population_bucket = (byte >> 4) & 0x0F;
            Ok((kind, population_bucket))
        }
        _ => unreachable!("LOUDS block only runs for versions >= 7"),
    }
}
