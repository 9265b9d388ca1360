//! Per-chunk record decoding.

use bytes::Bytes;
use prost::Message;
use sheaf_core::{varint, Error, Result};

use crate::byteio::{ByteReader, ChainReader};
use crate::chunk::{Chunk, ChunkType};
use crate::compress::{CompressionType, Decompressor};
use crate::transpose::{self, FieldProjection};

/// Expands one [`Chunk`] into an indexable sequence of serialized records.
///
/// The decoder is re-armed once per chunk with
/// [`reset_chunk`](ChunkDecoder::reset_chunk); records are then read by
/// increasing index, sliced zero-copy out of the materialized record table.
///
/// A typed read ([`read_message`](ChunkDecoder::read_message)) that fails to
/// parse does *not* fail the chunk: the error is returned, the index stays
/// on the bad record, and [`recover`](ChunkDecoder::recover) steps over it.
#[derive(Debug)]
pub struct ChunkDecoder {
    projection: FieldProjection,
    num_records: u64,
    index: u64,
    /// End offset of each record in `values`.
    limits: Vec<usize>,
    /// Concatenated record payloads.
    values: Bytes,
    /// A typed read failed on the record at `index`.
    skip_pending: bool,
}

impl ChunkDecoder {
    pub fn new(projection: FieldProjection) -> Self {
        Self {
            projection,
            num_records: 0,
            index: 0,
            limits: Vec::new(),
            values: Bytes::new(),
            skip_pending: false,
        }
    }

    /// Clears to the empty state (no chunk).
    pub fn reset(&mut self) {
        self.num_records = 0;
        self.index = 0;
        self.limits = Vec::new();
        self.values = Bytes::new();
        self.skip_pending = false;
    }

    /// Arms the decoder with a chunk's records.
    ///
    /// Signature, metadata, and padding chunks decode to zero records; an
    /// unknown chunk type is corruption. On error the decoder is left empty.
    pub fn reset_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        self.reset();
        match chunk.header.chunk_type() {
            Some(ChunkType::FileSignature)
            | Some(ChunkType::FileMetadata)
            | Some(ChunkType::Padding) => Ok(()),
            Some(ChunkType::Simple) => self.decode_simple(chunk),
            Some(ChunkType::Transposed) => self.decode_transposed(chunk),
            None => Err(Error::data_loss(format!(
                "Unknown chunk type: {}",
                chunk.header.type_byte()
            ))),
        }
        .inspect_err(|_| self.reset())
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Index of the next record to read.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Moves the cursor; clamped to the record count.
    pub fn set_index(&mut self, index: u64) {
        self.index = index.min(self.num_records);
        self.skip_pending = false;
    }

    /// Returns the next record, zero-copy, or `None` past the last one.
    pub fn read_record(&mut self) -> Option<Bytes> {
        if self.index >= self.num_records {
            return None;
        }
        let index = self.index as usize;
        let start = if index == 0 { 0 } else { self.limits[index - 1] };
        let end = self.limits[index];
        self.index += 1;
        Some(self.values.slice(start..end))
    }

    /// Parses the next record into a message.
    ///
    /// On parse failure the chunk stays usable: the index remains on the
    /// failed record and [`recover`](ChunkDecoder::recover) skips it.
    pub fn read_message<M: Message + Default>(&mut self) -> Result<Option<M>> {
        if self.index >= self.num_records {
            return Ok(None);
        }
        let index = self.index as usize;
        let start = if index == 0 { 0 } else { self.limits[index - 1] };
        let bytes = self.values.slice(start..self.limits[index]);
        match M::decode(bytes.as_ref()) {
            Ok(message) => {
                self.index += 1;
                Ok(Some(message))
            }
            Err(e) => {
                self.skip_pending = true;
                Err(Error::data_loss(format!(
                    "failed to parse record {}: {}",
                    self.index, e
                )))
            }
        }
    }

    /// Steps over the record a typed read failed on. Returns whether there
    /// was one to step over.
    pub fn recover(&mut self) -> bool {
        if !self.skip_pending {
            return false;
        }
        self.skip_pending = false;
        self.index += 1;
        true
    }

    fn decode_simple(&mut self, chunk: &Chunk) -> Result<()> {
        let mut src = ChainReader::new(&chunk.data);
        let compression_byte = src
            .read_u8()?
            .ok_or_else(|| Error::data_loss("empty simple chunk"))?;
        let compression = CompressionType::from_byte(compression_byte)?;
        let mut decompressor = Decompressor::new(src, compression)?;

        let sizes_len = decompressor
            .read_varint()?
            .ok_or_else(|| Error::data_loss("truncated simple chunk"))?;
        if sizes_len > crate::compress::MAX_DECODED_SIZE {
            return Err(Error::data_loss(format!(
                "implausible record size table length: {}",
                sizes_len
            )));
        }
        let Some(table) = decompressor.read_bytes(sizes_len as usize)? else {
            return Err(Error::data_loss("truncated record size table"));
        };

        let num_records = chunk.header.num_records();
        let mut limits = Vec::with_capacity(num_records as usize);
        let mut cursor = &table[..];
        let mut size: i64 = 0;
        let mut total: u64 = 0;
        for _ in 0..num_records {
            let delta = varint::try_decode_varint(&mut cursor)
                .ok_or_else(|| Error::data_loss("malformed record size table"))?;
            size = size
                .checked_add(delta)
                .filter(|s| *s >= 0)
                .ok_or_else(|| Error::data_loss("negative record size"))?;
            total = total
                .checked_add(size as u64)
                .filter(|t| *t <= crate::compress::MAX_DECODED_SIZE)
                .ok_or_else(|| Error::data_loss("implausible total record size"))?;
            limits.push(total as usize);
        }
        if !cursor.is_empty() {
            return Err(Error::data_loss("record size table has trailing bytes"));
        }

        let Some(values) = decompressor.read_bytes(total as usize)? else {
            return Err(Error::data_loss(format!(
                "truncated simple chunk: {} record bytes declared",
                total
            )));
        };
        decompressor.verify_end_and_close()?;

        let decoded_size =
            varint::varint_len_u64(sizes_len) as u64 + sizes_len + values.len() as u64;
        if decoded_size != chunk.header.decoded_data_size() {
            return Err(Error::data_loss(format!(
                "decoded data size mismatch: declared {}, got {}",
                chunk.header.decoded_data_size(),
                decoded_size
            )));
        }

        self.num_records = num_records;
        self.limits = limits;
        self.values = values;
        Ok(())
    }

    fn decode_transposed(&mut self, chunk: &Chunk) -> Result<()> {
        let (values, limits) = transpose::decode_chunk(
            &chunk.data,
            chunk.header.num_records(),
            chunk.header.decoded_data_size(),
            &self.projection,
        )?;
        self.num_records = chunk.header.num_records();
        self.limits = limits;
        self.values = values;
        Ok(())
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new(FieldProjection::all())
    }
}

/// Builds simple chunk data from records; the writer-side inverse of
/// [`ChunkDecoder::decode_simple`].
pub(crate) fn encode_simple_chunk(
    records: &[Bytes],
    compression: CompressionType,
) -> Result<Chunk> {
    let mut table = Vec::new();
    let mut size: i64 = 0;
    for record in records {
        let delta = record.len() as i64 - size;
        varint::encode_varint(&mut table, delta);
        size = record.len() as i64;
    }

    let mut block = Vec::new();
    varint::encode_varint_u64(&mut block, table.len() as u64);
    block.extend_from_slice(&table);
    for record in records {
        block.extend_from_slice(record);
    }
    let decoded_size = block.len() as u64;

    let mut data = Vec::with_capacity(block.len() / 2 + 1);
    data.push(compression.as_byte());
    data.extend_from_slice(&crate::compress::compress_block(&block, compression)?);
    Ok(Chunk::new(
        ChunkType::Simple,
        records.len() as u64,
        decoded_size,
        crate::byteio::Chain::from(data),
    ))
}
