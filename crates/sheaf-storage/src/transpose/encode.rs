//! Transposed chunk encoding.

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use sheaf_core::{varint, Error, Result};

use crate::byteio::Chain;
use crate::chunk::{Chunk, ChunkType};
use crate::compress::{compress_block, CompressionType};

use super::{WIRE_FIXED32, WIRE_FIXED64, WIRE_LEN_DELIMITED, WIRE_VARINT};

/// Splits records into per-field bucket streams plus a state machine.
///
/// Fields are grouped into one bucket per wire type, which is what makes
/// the layout compress: varints sit with varints, payloads with payloads.
/// Records must be valid protobuf wire format; anything else is rejected so
/// the writer can fall back to a simple chunk. Values are re-encoded
/// canonically, so for canonically-encoded input (any normal message
/// serializer) decoding reproduces the records byte for byte.
#[derive(Debug)]
pub(crate) struct TransposeEncoder {
    compression: CompressionType,
}

#[derive(Default)]
struct Layout {
    /// Bucket index per wire type, in discovery order.
    bucket_of_wire: HashMap<u32, usize>,
    bucket_streams: Vec<Vec<u8>>,
    /// Node index per field tag.
    node_of_tag: HashMap<u32, usize>,
    /// Serialized node list and its length.
    nodes: Vec<u8>,
    num_nodes: u64,
    finish_node: Option<u64>,
    transitions: Vec<u64>,
}

impl TransposeEncoder {
    pub(crate) fn new(compression: CompressionType) -> Self {
        Self { compression }
    }

    /// Encodes `records` as a transposed data chunk.
    pub(crate) fn encode_chunk(&self, records: &[Bytes]) -> Result<Chunk> {
        let (data, decoded_size) = self.encode_data(records)?;
        Ok(Chunk::new(
            ChunkType::Transposed,
            records.len() as u64,
            decoded_size,
            data,
        ))
    }

    /// Encodes a single record as the file metadata chunk.
    ///
    /// The header advertises zero records so that record iteration skips the
    /// chunk; the metadata reader decodes it knowing there is exactly one.
    pub(crate) fn encode_metadata_chunk(&self, serialized: Bytes) -> Result<Chunk> {
        let (data, decoded_size) = self.encode_data(std::slice::from_ref(&serialized))?;
        Ok(Chunk::new(ChunkType::FileMetadata, 0, decoded_size, data))
    }

    /// Builds transposed chunk data; returns it with the decoded size.
    fn encode_data(&self, records: &[Bytes]) -> Result<(Chain, u64)> {
        let mut layout = Layout::default();
        let mut decoded_size = 0u64;

        for record in records {
            decoded_size += split_record(record, &mut layout)?;
            let finish = layout.finish_node();
            layout.transitions.push(finish);
        }

        let blocks: Result<Vec<Vec<u8>>> = layout
            .bucket_streams
            .iter()
            .map(|stream| compress_block(stream, self.compression))
            .collect();
        let blocks = blocks?;

        let mut out = BytesMut::new();
        out.extend_from_slice(&[self.compression.as_byte()]);
        varint::encode_varint_u64(&mut out, blocks.len() as u64);
        for block in &blocks {
            varint::encode_varint_u64(&mut out, block.len() as u64);
        }
        varint::encode_varint_u64(&mut out, layout.num_nodes);
        out.extend_from_slice(&layout.nodes);
        varint::encode_varint_u64(&mut out, layout.transitions.len() as u64);
        for &transition in &layout.transitions {
            varint::encode_varint_u64(&mut out, transition);
        }
        for block in &blocks {
            out.extend_from_slice(block);
        }
        Ok((Chain::from(out.freeze()), decoded_size))
    }
}

impl Layout {
    fn bucket_for(&mut self, wire: u32) -> usize {
        let next = self.bucket_streams.len();
        match self.bucket_of_wire.entry(wire) {
            std::collections::hash_map::Entry::Occupied(entry) => *entry.get(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(next);
                self.bucket_streams.push(Vec::new());
                next
            }
        }
    }

    fn field_node(&mut self, tag: u32) -> u64 {
        if let Some(&node) = self.node_of_tag.get(&tag) {
            return node as u64;
        }
        let bucket = self.bucket_for(tag & 7);
        let node = self.num_nodes;
        self.nodes.push(0);
        varint::encode_varint_u64(&mut self.nodes, bucket as u64);
        varint::encode_varint_u64(&mut self.nodes, 1); // flat path
        varint::encode_varint_u64(&mut self.nodes, tag as u64);
        self.num_nodes += 1;
        self.node_of_tag.insert(tag, node as usize);
        node
    }

    fn finish_node(&mut self) -> u64 {
        if let Some(node) = self.finish_node {
            return node;
        }
        let node = self.num_nodes;
        self.nodes.push(1);
        self.num_nodes += 1;
        self.finish_node = Some(node);
        node
    }
}

/// Walks one record's top-level fields, appending values to their bucket
/// streams and transitions to the state machine. Returns the record's
/// canonical reconstructed size.
fn split_record(record: &Bytes, layout: &mut Layout) -> Result<u64> {
    let mut cursor = &record[..];
    let mut reconstructed = 0u64;
    while !cursor.is_empty() {
        let tag = decode_canonical_varint(&mut cursor)?;
        let tag = u32::try_from(tag).map_err(|_| not_a_message())?;
        if tag >> 3 == 0 {
            return Err(not_a_message());
        }
        let wire = tag & 7;

        let node = layout.field_node(tag);
        let bucket = layout.bucket_for(wire);
        let stream = &mut layout.bucket_streams[bucket];
        reconstructed += varint::varint_len_u64(tag as u64) as u64;

        match wire {
            WIRE_VARINT => {
                let value = decode_canonical_varint(&mut cursor)?;
                varint::encode_varint_u64(stream, value);
                reconstructed += varint::varint_len_u64(value) as u64;
            }
            WIRE_FIXED64 => {
                if cursor.len() < 8 {
                    return Err(not_a_message());
                }
                stream.extend_from_slice(&cursor[..8]);
                cursor.advance(8);
                reconstructed += 8;
            }
            WIRE_FIXED32 => {
                if cursor.len() < 4 {
                    return Err(not_a_message());
                }
                stream.extend_from_slice(&cursor[..4]);
                cursor.advance(4);
                reconstructed += 4;
            }
            WIRE_LEN_DELIMITED => {
                let len = decode_canonical_varint(&mut cursor)?;
                let len = usize::try_from(len).map_err(|_| not_a_message())?;
                if cursor.len() < len {
                    return Err(not_a_message());
                }
                varint::encode_varint_u64(stream, len as u64);
                stream.extend_from_slice(&cursor[..len]);
                cursor.advance(len);
                reconstructed += varint::varint_len_u64(len as u64) as u64 + len as u64;
            }
            _ => return Err(not_a_message()),
        }
        layout.transitions.push(node);
    }
    Ok(reconstructed)
}

/// Decodes a varint, rejecting overlong encodings.
///
/// Decoding re-emits varints canonically, so a record carrying a
/// non-canonical encoding would not survive the round trip byte for byte;
/// such records stay row-wise instead.
fn decode_canonical_varint(cursor: &mut &[u8]) -> Result<u64> {
    let before = cursor.len();
    let value = varint::try_decode_varint_u64(cursor).ok_or_else(not_a_message)?;
    if before - cursor.len() != varint::varint_len_u64(value) {
        return Err(not_a_message());
    }
    Ok(value)
}

fn not_a_message() -> Error {
    Error::invalid_argument("record is not valid message wire format")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpose::{decode_chunk, FieldProjection};

    fn roundtrip(records: &[&[u8]], compression: CompressionType) -> (Bytes, Vec<usize>) {
        let records: Vec<Bytes> = records.iter().map(|r| Bytes::copy_from_slice(r)).collect();
        let encoder = TransposeEncoder::new(compression);
        let chunk = encoder.encode_chunk(&records).unwrap();
        assert_eq!(chunk.header.chunk_type(), Some(ChunkType::Transposed));
        assert_eq!(chunk.header.num_records(), records.len() as u64);
        decode_chunk(
            &chunk.data,
            chunk.header.num_records(),
            chunk.header.decoded_data_size(),
            &FieldProjection::all(),
        )
        .unwrap()
    }

    // ---------------------------------------------------------------
    // Round trips
    // ---------------------------------------------------------------

    #[test]
    fn test_roundtrip_mixed_fields() {
        // { 1: 150, 2: "hi", 3: fixed64, 4: fixed32 }
        let record: &[u8] = &[
            0x08, 0x96, 0x01, // field 1, varint 150
            0x12, 0x02, b'h', b'i', // field 2, "hi"
            0x19, 1, 2, 3, 4, 5, 6, 7, 8, // field 3, fixed64
            0x25, 9, 9, 9, 9, // field 4, fixed32
        ];
        let (bytes, limits) = roundtrip(&[record, record], CompressionType::None);
        assert_eq!(limits, vec![record.len(), 2 * record.len()]);
        assert_eq!(&bytes[..record.len()], record);
        assert_eq!(&bytes[record.len()..], record);
    }

    #[test]
    fn test_roundtrip_varied_records() {
        let a: &[u8] = &[0x08, 0x01];
        let b: &[u8] = &[0x08, 0x02, 0x12, 0x03, b'x', b'y', b'z'];
        let empty: &[u8] = &[];
        let (bytes, limits) = roundtrip(&[a, b, empty], CompressionType::None);
        assert_eq!(limits, vec![2, 9, 9]);
        assert_eq!(&bytes[..2], a);
        assert_eq!(&bytes[2..9], b);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let record: &[u8] = &[0x0A, 0x04, b's', b'a', b'm', b'e'];
        let records: Vec<&[u8]> = std::iter::repeat(record).take(50).collect();
        for compression in [
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let (bytes, limits) = roundtrip(&records, compression);
            assert_eq!(limits.len(), 50, "codec {:?}", compression);
            assert_eq!(&bytes[..record.len()], record);
        }
    }

    // ---------------------------------------------------------------
    // Bucket assignment
    // ---------------------------------------------------------------

    #[test]
    fn test_same_wire_type_shares_bucket() {
        let record: &[u8] = &[0x08, 0x01, 0x10, 0x02]; // two varint fields
        let records = vec![Bytes::copy_from_slice(record)];
        let encoder = TransposeEncoder::new(CompressionType::None);
        let chunk = encoder.encode_chunk(&records).unwrap();

        // Layout: compression byte, then num_buckets.
        let raw = chunk.data.to_bytes();
        assert_eq!(raw[1], 1, "both varint fields share one bucket");
    }

    // ---------------------------------------------------------------
    // Rejection of non-message records
    // ---------------------------------------------------------------

    #[test]
    fn test_rejects_raw_bytes() {
        let encoder = TransposeEncoder::new(CompressionType::None);
        // Wire type 7 does not exist.
        let err = encoder
            .encode_chunk(&[Bytes::from_static(&[0x0F, 0x01])])
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_rejects_truncated_field() {
        let encoder = TransposeEncoder::new(CompressionType::None);
        let err = encoder
            .encode_chunk(&[Bytes::from_static(&[0x12, 0x05, b'x'])])
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    // ---------------------------------------------------------------
    // Metadata chunk
    // ---------------------------------------------------------------

    #[test]
    fn test_metadata_chunk_shape() {
        let encoder = TransposeEncoder::new(CompressionType::None);
        let serialized = Bytes::from_static(&[0x0A, 0x03, b'f', b'o', b'o']);
        let chunk = encoder.encode_metadata_chunk(serialized.clone()).unwrap();
        assert_eq!(chunk.header.chunk_type(), Some(ChunkType::FileMetadata));
        assert_eq!(chunk.header.num_records(), 0);

        let (bytes, limits) = decode_chunk(
            &chunk.data,
            1,
            chunk.header.decoded_data_size(),
            &FieldProjection::all(),
        )
        .unwrap();
        assert_eq!(limits, vec![serialized.len()]);
        assert_eq!(bytes, serialized);
    }
}
