//! The record reader: records in file order, with skip-and-recover.

use bytes::Bytes;
use prost::Message;
use tracing::debug;

use sheaf_core::{Error, RecordPosition, Result, SkippedRegion};

use crate::byteio::ByteReader;
use crate::chunk::ChunkType;
use crate::chunk_decoder::ChunkDecoder;
use crate::chunk_reader::ChunkReader;
use crate::metadata::RecordsMetadata;
use crate::transpose::{self, FieldProjection};

/// Which layer a failure is recoverable at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recoverable {
    No,
    ChunkReader,
    ChunkDecoder,
}

/// Options for [`RecordReader`].
#[derive(Debug, Clone, Default)]
pub struct RecordReaderOptions {
    /// Which fields of transposed chunks to materialize.
    pub field_projection: FieldProjection,
}

/// Reads records out of a sheaf file.
///
/// Records arrive in file order, each addressable by its
/// [`RecordPosition`]. Corruption surfaces as [`Error::DataLoss`]; calling
/// [`recover`](RecordReader::recover) then skips the damaged bytes,
/// reports them as a [`SkippedRegion`], and resumes reading strictly after
/// the region. I/O errors from the source are not recoverable here.
///
/// ## Example
///
/// ```ignore
/// let mut reader = RecordReader::new(SliceReader::new(file_bytes));
/// while let Some(record) = reader.read_record()? {
///     let pos = reader.last_pos().unwrap();
///     handle(pos, record);
/// }
/// ```
#[derive(Debug)]
pub struct RecordReader<R> {
    src: ChunkReader<R>,
    /// Position of the chunk the decoder holds.
    chunk_begin: u64,
    decoder: ChunkDecoder,
    recoverable: Recoverable,
    last_record: Option<RecordPosition>,
}

impl<R: ByteReader> RecordReader<R> {
    pub fn new(src: R) -> Self {
        Self::with_options(src, RecordReaderOptions::default())
    }

    pub fn with_options(src: R, options: RecordReaderOptions) -> Self {
        let src = ChunkReader::new(src);
        let chunk_begin = src.pos();
        Self {
            src,
            chunk_begin,
            decoder: ChunkDecoder::new(options.field_projection),
            recoverable: Recoverable::No,
            last_record: None,
        }
    }

    /// Releases the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.src.into_inner()
    }

    /// Position of the next record to read.
    ///
    /// Inside a loaded chunk this is `(chunk_begin, index)`; between chunks
    /// it is the upcoming chunk boundary with index 0.
    pub fn pos(&self) -> RecordPosition {
        if self.decoder.index() < self.decoder.num_records() {
            RecordPosition::new(self.chunk_begin, self.decoder.index())
        } else {
            RecordPosition::new(self.src.pos(), 0)
        }
    }

    /// Position of the last successfully read record.
    pub fn last_pos(&self) -> Option<RecordPosition> {
        self.last_record
    }

    pub fn supports_random_access(&self) -> bool {
        self.src.supports_random_access()
    }

    /// Stream length, if the source knows it.
    pub fn size(&mut self) -> Result<Option<u64>> {
        self.src.size()
    }

    /// Probes whether the stream looks like a well-framed file.
    ///
    /// Only the framing reader advances; no chunk data is decoded.
    /// `Ok(false)` means the stream is empty.
    pub fn check_file_format(&mut self) -> Result<bool> {
        self.check_healthy()?;
        if self.decoder.index() < self.decoder.num_records() {
            return Ok(true);
        }
        match self.src.check_file_format() {
            Ok(ok) => {
                if !ok {
                    self.decoder.reset();
                }
                Ok(ok)
            }
            Err(e) => {
                self.decoder.reset();
                self.recoverable = Recoverable::ChunkReader;
                Err(e)
            }
        }
    }

    /// Reads the file metadata.
    ///
    /// Valid only with the reader at the beginning of the file
    /// (`InvalidArgument` otherwise). A file without a metadata chunk -
    /// including an entirely empty stream - yields the default (empty)
    /// metadata and leaves the reader positioned for record reads.
    pub fn read_metadata(&mut self) -> Result<RecordsMetadata> {
        self.check_healthy()?;
        if self.src.pos() != 0 {
            return Err(Error::invalid_argument(
                "read_metadata must be called at the beginning of the file",
            ));
        }

        self.chunk_begin = self.src.pos();
        let Some(signature) = self.read_src_chunk()? else {
            return Ok(RecordsMetadata::default());
        };
        if signature.header.chunk_type() != Some(ChunkType::FileSignature) {
            self.src.report_corrupt(self.chunk_begin);
            self.recoverable = Recoverable::ChunkReader;
            return Err(Error::data_loss("invalid file: missing signature chunk"));
        }

        self.chunk_begin = self.src.pos();
        let header = match self.src.pull_chunk_header() {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(RecordsMetadata::default()),
            Err(e) => {
                self.recoverable = Recoverable::ChunkReader;
                return Err(e);
            }
        };
        if header.chunk_type() != Some(ChunkType::FileMetadata) {
            // No metadata chunk was written; records follow directly.
            return Ok(RecordsMetadata::default());
        }

        let Some(chunk) = self.read_src_chunk()? else {
            return Ok(RecordsMetadata::default());
        };
        match Self::parse_metadata(&chunk) {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                self.recoverable = Recoverable::ChunkDecoder;
                Err(e)
            }
        }
    }

    fn parse_metadata(chunk: &crate::chunk::Chunk) -> Result<RecordsMetadata> {
        if chunk.header.num_records() != 0 {
            return Err(Error::data_loss(format!(
                "invalid file metadata chunk: number of records is not zero: {}",
                chunk.header.num_records()
            )));
        }
        let (bytes, limits) = transpose::decode_chunk(
            &chunk.data,
            1,
            chunk.header.decoded_data_size(),
            &FieldProjection::all(),
        )?;
        debug_assert_eq!(limits.len(), 1, "metadata chunk decoded to one record");
        RecordsMetadata::decode(bytes.as_ref())
            .map_err(|e| Error::data_loss(format!("invalid file metadata chunk: {}", e)))
    }

    /// Reads the next record. `Ok(None)` at a clean end of file.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        self.check_healthy()?;
        loop {
            if let Some(record) = self.decoder.read_record() {
                self.note_read();
                return Ok(Some(record));
            }
            if !self.read_chunk()? {
                return Ok(None);
            }
        }
    }

    /// Reads the next record as a message.
    ///
    /// A record that fails to parse arms decoder-level recovery:
    /// [`recover`](RecordReader::recover) skips that one record.
    pub fn read_message<M: Message + Default>(&mut self) -> Result<Option<M>> {
        self.check_healthy()?;
        loop {
            match self.decoder.read_message::<M>() {
                Ok(Some(message)) => {
                    self.note_read();
                    return Ok(Some(message));
                }
                Ok(None) => {}
                Err(e) => {
                    self.recoverable = Recoverable::ChunkDecoder;
                    return Err(e);
                }
            }
            if !self.read_chunk()? {
                return Ok(None);
            }
        }
    }

    /// Seeks to a record position.
    ///
    /// `Ok(false)` if the position lies beyond the end of the file.
    pub fn seek(&mut self, new_pos: RecordPosition) -> Result<bool> {
        self.check_healthy()?;
        if new_pos.chunk_begin == self.chunk_begin {
            if new_pos.record_index == 0 || self.src.pos() > self.chunk_begin {
                // Seeking to the beginning of a chunk must not read the
                // chunk: it may not exist at end of file. If the source is
                // already past the boundary, the chunk is loaded.
                self.decoder.set_index(new_pos.record_index);
                return Ok(true);
            }
        } else {
            match self.src.seek(new_pos.chunk_begin) {
                Ok(true) => {}
                Ok(false) => {
                    self.chunk_begin = self.src.pos();
                    self.decoder.reset();
                    return Ok(false);
                }
                Err(e) => {
                    self.chunk_begin = self.src.pos();
                    self.decoder.reset();
                    self.recoverable = Recoverable::ChunkReader;
                    return Err(e);
                }
            }
            if new_pos.record_index == 0 {
                self.chunk_begin = self.src.pos();
                self.decoder.reset();
                return Ok(true);
            }
        }
        if !self.read_chunk()? {
            return Ok(false);
        }
        self.decoder.set_index(new_pos.record_index);
        Ok(true)
    }

    /// Seeks by numeric position ([`RecordPosition::numeric`] or any byte
    /// position; the target resolves to the chunk containing it).
    pub fn seek_numeric(&mut self, new_pos: u64) -> Result<bool> {
        self.check_healthy()?;
        if new_pos >= self.chunk_begin && new_pos <= self.src.pos() {
            // Inside or just after the loaded chunk; no re-read needed.
        } else {
            match self.src.seek_to_chunk_containing(new_pos) {
                Ok(true) => {}
                Ok(false) => {
                    self.chunk_begin = self.src.pos();
                    self.decoder.reset();
                    return Ok(false);
                }
                Err(e) => {
                    self.chunk_begin = self.src.pos();
                    self.decoder.reset();
                    self.recoverable = Recoverable::ChunkReader;
                    return Err(e);
                }
            }
            if self.src.pos() >= new_pos {
                // At the chunk boundary itself (or the target fell into
                // padding or past the previous chunk's records): stand on
                // the boundary without reading the chunk.
                self.chunk_begin = self.src.pos();
                self.decoder.reset();
                return Ok(true);
            }
            if !self.read_chunk()? {
                return Ok(false);
            }
        }
        self.decoder.set_index(new_pos - self.chunk_begin);
        Ok(true)
    }

    /// Skips past a failure, reporting the bypassed bytes.
    ///
    /// `Ok(None)` when the reader is not in a recoverable state. On success
    /// the reader is healthy again and positioned at the first byte after
    /// the returned region.
    pub fn recover(&mut self) -> Result<Option<SkippedRegion>> {
        let recoverable = self.recoverable;
        self.recoverable = Recoverable::No;
        match recoverable {
            Recoverable::No => Ok(None),
            Recoverable::ChunkReader => {
                let region = self.src.recover()?;
                self.chunk_begin = self.src.pos();
                self.decoder.reset();
                if let Some(region) = region {
                    debug!(%region, "recovered past corrupt framing");
                }
                Ok(region)
            }
            Recoverable::ChunkDecoder => {
                let index_before = self.decoder.index();
                if !self.decoder.recover() {
                    self.decoder.reset();
                }
                let begin = self.chunk_begin + index_before;
                let end = self.pos().numeric();
                let region = SkippedRegion::new(begin, end);
                debug!(%region, "recovered past undecodable records");
                Ok(Some(region))
            }
        }
    }

    fn check_healthy(&self) -> Result<()> {
        if self.recoverable != Recoverable::No {
            return Err(Error::invalid_argument(
                "reader is in a failed state; call recover() first",
            ));
        }
        Ok(())
    }

    fn note_read(&mut self) {
        debug_assert!(self.decoder.index() > 0, "decoder read left index at 0");
        self.last_record = Some(RecordPosition::new(
            self.chunk_begin,
            self.decoder.index() - 1,
        ));
    }

    /// Reads the next chunk from the framing layer, arming chunk-reader
    /// recovery on failure. `Ok(None)` at end of file.
    fn read_src_chunk(&mut self) -> Result<Option<crate::chunk::Chunk>> {
        match self.src.read_chunk() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.decoder.reset();
                self.recoverable = Recoverable::ChunkReader;
                Err(e)
            }
        }
    }

    /// Loads the next chunk into the decoder. `Ok(false)` at end of file.
    fn read_chunk(&mut self) -> Result<bool> {
        self.chunk_begin = self.src.pos();
        let Some(chunk) = self.read_src_chunk()? else {
            self.decoder.reset();
            return Ok(false);
        };
        match self.decoder.reset_chunk(&chunk) {
            Ok(()) => {
                // The boundary the chunk was actually read from (padding in
                // front of it was skipped by the framing layer).
                self.chunk_begin = self.src.pos() - chunk.header.chunk_size();
                Ok(true)
            }
            Err(e) => {
                self.chunk_begin = self.src.pos() - chunk.header.chunk_size();
                self.recoverable = Recoverable::ChunkDecoder;
                Err(e)
            }
        }
    }
}
