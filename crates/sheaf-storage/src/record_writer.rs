//! The record writer: builds well-formed sheaf files.

use bytes::{Bytes, BytesMut};
use prost::Message;

use sheaf_core::Result;

use crate::chunk::{Chunk, BLOCK_SIZE, HEADER_SIZE};
use crate::chunk_decoder::encode_simple_chunk;
use crate::compress::CompressionType;
use crate::metadata::RecordsMetadata;
use crate::transpose::TransposeEncoder;

/// Options for [`RecordWriter`].
#[derive(Debug, Clone)]
pub struct RecordWriterOptions {
    /// Codec for chunk payloads.
    pub compression: CompressionType,

    /// Encode data chunks columnar (transposed). Records that are not valid
    /// message wire format fall back to a simple chunk.
    pub transposed: bool,

    /// File metadata, written as a chunk right after the signature.
    pub metadata: Option<RecordsMetadata>,

    /// Flush a data chunk once its records reach this many bytes.
    pub chunk_size: usize,

    /// Pad with filler chunks so data chunk headers start on
    /// [`BLOCK_SIZE`] boundaries. Gaps too small to hold a padding chunk
    /// header are left unaligned.
    pub pad_to_block_alignment: bool,
}

impl Default for RecordWriterOptions {
    fn default() -> Self {
        Self {
            compression: CompressionType::Lz4,
            transposed: false,
            metadata: None,
            chunk_size: 1024 * 1024,
            pad_to_block_alignment: false,
        }
    }
}

/// Builds a sheaf file in memory.
///
/// The signature chunk (and the metadata chunk, when configured) is written
/// up front; records accumulate and are flushed as data chunks when they
/// reach the configured size, on [`flush`](RecordWriter::flush), and on
/// [`finish`](RecordWriter::finish).
///
/// ## Example
///
/// ```ignore
/// let mut writer = RecordWriter::new(RecordWriterOptions {
///     compression: CompressionType::Zstd,
///     ..Default::default()
/// })?;
/// for record in records {
///     writer.write_record(record)?;
/// }
/// let file_bytes = writer.finish()?;
/// ```
#[derive(Debug)]
pub struct RecordWriter {
    options: RecordWriterOptions,
    dest: BytesMut,
    pending: Vec<Bytes>,
    pending_size: usize,
}

impl RecordWriter {
    pub fn new(options: RecordWriterOptions) -> Result<Self> {
        let mut writer = Self {
            options,
            dest: BytesMut::new(),
            pending: Vec::new(),
            pending_size: 0,
        };
        writer.write_chunk(&Chunk::file_signature());
        if let Some(metadata) = writer.options.metadata.take() {
            let chunk = TransposeEncoder::new(writer.options.compression)
                .encode_metadata_chunk(Bytes::from(metadata.encode_to_vec()))?;
            writer.write_chunk(&chunk);
        }
        Ok(writer)
    }

    /// Bytes written so far. With no records pending, this is the position
    /// the next chunk will start at (before any alignment padding).
    pub fn pos(&self) -> u64 {
        self.dest.len() as u64
    }

    /// Queues one record.
    pub fn write_record(&mut self, record: impl Into<Bytes>) -> Result<()> {
        let record = record.into();
        self.pending_size += record.len();
        self.pending.push(record);
        if self.pending_size >= self.options.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Queues one record serialized from a message.
    pub fn write_message(&mut self, message: &impl Message) -> Result<()> {
        self.write_record(Bytes::from(message.encode_to_vec()))
    }

    /// Flushes queued records as one data chunk.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.pending);
        self.pending_size = 0;

        let chunk = if self.options.transposed {
            match TransposeEncoder::new(self.options.compression).encode_chunk(&records) {
                Ok(chunk) => chunk,
                // Not message wire format: keep the records row-wise.
                Err(e) if e.is_invalid_argument() => {
                    encode_simple_chunk(&records, self.options.compression)?
                }
                Err(e) => return Err(e),
            }
        } else {
            encode_simple_chunk(&records, self.options.compression)?
        };

        if self.options.pad_to_block_alignment {
            self.pad_to_block_boundary();
        }
        self.write_chunk(&chunk);
        Ok(())
    }

    /// Flushes and returns the completed file.
    pub fn finish(mut self) -> Result<Bytes> {
        self.flush()?;
        Ok(self.dest.freeze())
    }

    fn write_chunk(&mut self, chunk: &Chunk) {
        chunk.encode_into(&mut self.dest);
    }

    fn pad_to_block_boundary(&mut self) {
        let offset = self.dest.len() as u64 % BLOCK_SIZE;
        if offset == 0 {
            return;
        }
        let gap = BLOCK_SIZE - offset;
        if gap <= HEADER_SIZE as u64 {
            // Not enough room for a padding chunk header.
            return;
        }
        self.write_chunk(&Chunk::padding(gap - HEADER_SIZE as u64));
    }
}
