//! Transposed chunk decoding.

use bytes::{Bytes, BytesMut};
use sheaf_core::{Error, Result};

use crate::byteio::{BackwardWriter, ByteReader, Chain, ChainReader};
use crate::compress::{CompressionType, Decompressor, MAX_DECODED_SIZE};

use super::{
    FieldProjection, MAX_PATH_DEPTH, WIRE_FIXED32, WIRE_FIXED64, WIRE_LEN_DELIMITED, WIRE_VARINT,
};

/// Sanity bounds on the layout section; anything larger is corruption, not
/// just a big chunk.
const MAX_BUCKETS: u64 = 1 << 16;
const MAX_NODES: u64 = 1 << 20;
const MAX_TRANSITIONS: u64 = 1 << 26;

/// A parsed state machine node.
#[derive(Debug)]
enum Node {
    Field {
        bucket: usize,
        /// Chain of tags from the record root to the leaf.
        tags: Vec<u32>,
        /// Whether the projection materializes this field.
        include: bool,
    },
    FinishRecord,
}

/// Decodes transposed chunk data into concatenated records plus limits.
///
/// `limits[i]` is the end offset of record `i` in the returned bytes.
/// Fields excluded by `projection` are skipped in their bucket streams but
/// not materialized; the `decoded_data_size` check therefore only applies
/// under a keep-everything projection.
pub(crate) fn decode_chunk(
    data: &Chain,
    num_records: u64,
    decoded_data_size: u64,
    projection: &FieldProjection,
) -> Result<(Bytes, Vec<usize>)> {
    let mut src = ChainReader::new(data);
    let compression_byte = src
        .read_u8()?
        .ok_or_else(|| Error::data_loss("empty transposed chunk"))?;
    let compression = CompressionType::from_byte(compression_byte)?;

    let num_buckets = read_bounded(&mut src, MAX_BUCKETS, "bucket count")? as usize;
    let mut bucket_sizes = Vec::with_capacity(num_buckets);
    for _ in 0..num_buckets {
        bucket_sizes.push(read_required(&mut src, "bucket size")?);
    }

    let nodes = parse_nodes(&mut src, num_buckets, projection)?;

    let num_transitions = read_bounded(&mut src, MAX_TRANSITIONS, "transition count")? as usize;
    let mut transitions = Vec::with_capacity(num_transitions);
    for _ in 0..num_transitions {
        let index = read_required(&mut src, "transition")?;
        if index >= nodes.len() as u64 {
            return Err(Error::data_loss(format!(
                "state machine transition to unknown node {}",
                index
            )));
        }
        transitions.push(index as usize);
    }

    let mut buckets = Vec::with_capacity(num_buckets);
    for &size in &bucket_sizes {
        let mut bucket_data = Chain::new();
        if !src.read_chain(size as usize, &mut bucket_data)? {
            return Err(Error::data_loss("truncated bucket stream"));
        }
        buckets.push(Decompressor::new(ChainReader::new(&bucket_data), compression)?);
    }
    src.verify_end()?;

    let mut out = BytesMut::with_capacity(decoded_data_size.min(MAX_DECODED_SIZE) as usize);
    let mut limits = Vec::with_capacity(num_records as usize);
    let mut record = BytesMut::new();
    for &transition in &transitions {
        match &nodes[transition] {
            Node::FinishRecord => {
                if limits.len() as u64 == num_records {
                    return Err(Error::data_loss(format!(
                        "transposed chunk holds more records than the declared {}",
                        num_records
                    )));
                }
                out.extend_from_slice(&record);
                record.clear();
                limits.push(out.len());
            }
            Node::Field {
                bucket,
                tags,
                include,
            } => {
                let leaf_tag = *tags.last().expect("field path is non-empty");
                let value = read_value(&mut buckets[*bucket], leaf_tag & 7)?;
                if *include {
                    record.extend_from_slice(&envelope(tags, &value));
                }
            }
        }
    }

    if !record.is_empty() {
        return Err(Error::data_loss("field data after the last record"));
    }
    if limits.len() as u64 != num_records {
        return Err(Error::data_loss(format!(
            "record count mismatch: declared {}, decoded {}",
            num_records,
            limits.len()
        )));
    }
    for bucket in buckets {
        bucket.verify_end_and_close()?;
    }
    if projection.includes_all() && out.len() as u64 != decoded_data_size {
        return Err(Error::data_loss(format!(
            "decoded data size mismatch: declared {}, decoded {}",
            decoded_data_size,
            out.len()
        )));
    }
    Ok((out.freeze(), limits))
}

fn parse_nodes(
    src: &mut ChainReader,
    num_buckets: usize,
    projection: &FieldProjection,
) -> Result<Vec<Node>> {
    let num_nodes = read_bounded(src, MAX_NODES, "node count")? as usize;
    let mut nodes = Vec::with_capacity(num_nodes);
    for _ in 0..num_nodes {
        let kind = src
            .read_u8()?
            .ok_or_else(|| Error::data_loss("truncated state machine"))?;
        match kind {
            0 => {
                let bucket = read_required(src, "bucket index")?;
                if bucket >= num_buckets as u64 {
                    return Err(Error::data_loss(format!(
                        "field references unknown bucket {}",
                        bucket
                    )));
                }
                let path_len = read_required(src, "path length")? as usize;
                if path_len == 0 || path_len > MAX_PATH_DEPTH {
                    return Err(Error::data_loss(format!(
                        "invalid field path length: {}",
                        path_len
                    )));
                }
                let mut tags = Vec::with_capacity(path_len);
                for depth in 0..path_len {
                    let tag = read_required(src, "field tag")?;
                    let tag = u32::try_from(tag)
                        .map_err(|_| Error::data_loss("field tag out of range"))?;
                    if tag >> 3 == 0 {
                        return Err(Error::data_loss("field number zero"));
                    }
                    let wire = tag & 7;
                    let terminal = depth + 1 == path_len;
                    if terminal {
                        if !matches!(wire, WIRE_VARINT | WIRE_FIXED64 | WIRE_LEN_DELIMITED | WIRE_FIXED32) {
                            return Err(Error::data_loss(format!(
                                "unsupported wire type {} in transposed field",
                                wire
                            )));
                        }
                    } else if wire != WIRE_LEN_DELIMITED {
                        return Err(Error::data_loss(
                            "non-terminal field path component is not a submessage",
                        ));
                    }
                    tags.push(tag);
                }
                let numbers: Vec<u32> = tags.iter().map(|tag| tag >> 3).collect();
                nodes.push(Node::Field {
                    bucket: bucket as usize,
                    include: projection.includes(&numbers),
                    tags,
                });
            }
            1 => nodes.push(Node::FinishRecord),
            other => {
                return Err(Error::data_loss(format!(
                    "invalid state machine node kind: {}",
                    other
                )))
            }
        }
    }
    Ok(nodes)
}

/// Wraps a leaf value in its path's tag/length envelopes, innermost first.
fn envelope(tags: &[u32], value: &[u8]) -> Bytes {
    let mut writer = BackwardWriter::with_capacity(value.len() + 2 * tags.len() + 2);
    writer.prepend(value);
    writer.prepend_varint(tags[tags.len() - 1] as u64);
    for &tag in tags[..tags.len() - 1].iter().rev() {
        writer.prepend_varint(writer.len() as u64);
        writer.prepend_varint(tag as u64);
    }
    writer.into_bytes()
}

/// Draws one value off a bucket stream, returning its wire bytes.
fn read_value<R: ByteReader>(bucket: &mut R, wire: u32) -> Result<Vec<u8>> {
    match wire {
        WIRE_VARINT => read_raw_varint(bucket).map(|(bytes, _)| bytes),
        WIRE_FIXED64 => read_exact(bucket, 8),
        WIRE_FIXED32 => read_exact(bucket, 4),
        WIRE_LEN_DELIMITED => {
            let (mut bytes, len) = read_raw_varint(bucket)?;
            if len > MAX_DECODED_SIZE {
                return Err(Error::data_loss(format!("field value too large: {}", len)));
            }
            if !bucket.read_into(len as usize, &mut bytes)? {
                return Err(Error::data_loss("truncated bucket stream"));
            }
            Ok(bytes)
        }
        _ => Err(Error::internal(format!("unvalidated wire type {}", wire))),
    }
}

/// Reads one varint, returning both its raw bytes and its value.
fn read_raw_varint<R: ByteReader>(bucket: &mut R) -> Result<(Vec<u8>, u64)> {
    let mut bytes = Vec::with_capacity(2);
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let Some(byte) = bucket.read_u8()? else {
            return Err(Error::data_loss("truncated bucket stream"));
        };
        bytes.push(byte);
        if shift == 63 && byte > 1 {
            return Err(Error::data_loss("varint overflows u64"));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((bytes, value));
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::data_loss("varint overflows u64"));
        }
    }
}

fn read_exact<R: ByteReader>(bucket: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(n);
    if !bucket.read_into(n, &mut out)? {
        return Err(Error::data_loss("truncated bucket stream"));
    }
    Ok(out)
}

fn read_required(src: &mut ChainReader, what: &str) -> Result<u64> {
    src.read_varint()?
        .ok_or_else(|| Error::data_loss(format!("truncated transposed chunk ({})", what)))
}

fn read_bounded(src: &mut ChainReader, max: u64, what: &str) -> Result<u64> {
    let value = read_required(src, what)?;
    if value > max {
        return Err(Error::data_loss(format!("implausible {}: {}", what, value)));
    }
    Ok(value)
}
