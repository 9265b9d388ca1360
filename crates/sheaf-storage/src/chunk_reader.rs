//! Framing-layer reader: chunks in, bytes out of the way.

use tracing::{debug, warn};

use sheaf_core::{Error, Result, SkippedRegion};

use crate::byteio::{ByteReader, Chain};
use crate::chunk::{hash_chain, Chunk, ChunkHeader, ChunkType, HEADER_SIZE};

/// Parses the container framing into [`Chunk`]s.
///
/// The reader always stands on a chunk boundary between calls: `pos()` is
/// the position of the next chunk (or of the chunk whose header has been
/// pulled but whose data has not been read). [`Padding`](ChunkType::Padding)
/// chunks are skipped transparently.
///
/// ## Failure taxonomy
///
/// - Header hash mismatch, impossible lengths, data hash mismatch,
///   mid-chunk truncation: `DataLoss`, and [`recover`](ChunkReader::recover)
///   can scan forward to the next plausible boundary.
/// - Truncation exactly at a boundary: clean end of file (`Ok(None)`).
/// - I/O errors from the source: propagated verbatim, not recoverable here.
#[derive(Debug)]
pub struct ChunkReader<R> {
    src: R,
    /// Boundary of the next chunk to read.
    chunk_begin: u64,
    /// Header pulled ahead of its data; `src` stands just past it.
    pending: Option<ChunkHeader>,
    /// Boundary of the chunk whose read failed; arms `recover`.
    failed_at: Option<u64>,
}

impl<R: ByteReader> ChunkReader<R> {
    pub fn new(src: R) -> Self {
        let chunk_begin = src.pos();
        Self {
            src,
            chunk_begin,
            pending: None,
            failed_at: None,
        }
    }

    /// Position of the next chunk boundary.
    pub fn pos(&self) -> u64 {
        self.chunk_begin
    }

    pub fn supports_random_access(&self) -> bool {
        self.src.supports_random_access()
    }

    pub fn size(&mut self) -> Result<Option<u64>> {
        self.src.size()
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> R {
        self.src
    }

    /// Checks that the stream starts like a sheaf file.
    ///
    /// `Ok(false)` means the stream is empty. Only the framing reader
    /// advances; no chunk data is decoded.
    pub fn check_file_format(&mut self) -> Result<bool> {
        let at_start = self.chunk_begin == 0;
        let Some(header) = self.pull_chunk_header()? else {
            return Ok(false);
        };
        if at_start && header.chunk_type() != Some(ChunkType::FileSignature) {
            self.failed_at = Some(0);
            self.pending = None;
            return Err(Error::data_loss("invalid file: missing signature chunk"));
        }
        Ok(true)
    }

    /// Reads the raw header bytes at the current boundary.
    ///
    /// `Ok(None)` only when the stream ends exactly on the boundary;
    /// a partial header is corruption.
    fn read_header_bytes(&mut self) -> Result<Option<[u8; HEADER_SIZE]>> {
        if !self.src.pull(1, HEADER_SIZE)? {
            return Ok(None);
        }
        let Some(bytes) = self.src.read_bytes(HEADER_SIZE)? else {
            self.failed_at = Some(self.chunk_begin);
            return Err(Error::data_loss(format!(
                "truncated chunk header at {}",
                self.chunk_begin
            )));
        };
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes);
        Ok(Some(raw))
    }

    /// Pulls the header of the next non-padding chunk without consuming its
    /// data. Repeated calls return the same header until `read_chunk`.
    ///
    /// `Ok(None)` at a clean end of file.
    pub fn pull_chunk_header(&mut self) -> Result<Option<ChunkHeader>> {
        loop {
            if let Some(header) = self.pending {
                return Ok(Some(header));
            }
            let Some(raw) = self.read_header_bytes()? else {
                return Ok(None);
            };
            let Some(header) = ChunkHeader::parse_candidate(&raw) else {
                self.failed_at = Some(self.chunk_begin);
                return Err(Error::data_loss(format!(
                    "corrupted chunk header at {}",
                    self.chunk_begin
                )));
            };
            if header.chunk_type() == Some(ChunkType::Padding) {
                if !self.src.skip(header.data_size())? {
                    self.failed_at = Some(self.chunk_begin);
                    return Err(Error::data_loss(format!(
                        "truncated padding chunk at {}",
                        self.chunk_begin
                    )));
                }
                debug!(pos = self.chunk_begin, len = header.data_size(), "skipped padding chunk");
                self.chunk_begin = self.src.pos();
                continue;
            }
            self.pending = Some(header);
            return Ok(Some(header));
        }
    }

    /// Reads the next non-padding chunk. `Ok(None)` at a clean end of file.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        let Some(header) = self.pull_chunk_header()? else {
            return Ok(None);
        };
        let mut data = Chain::new();
        if !self.src.read_chain(header.data_size() as usize, &mut data)? {
            self.pending = None;
            self.failed_at = Some(self.chunk_begin);
            return Err(Error::data_loss(format!(
                "truncated chunk at {}: {} of {} data bytes present",
                self.chunk_begin,
                data.len(),
                header.data_size()
            )));
        }
        if hash_chain(&data) != header.data_hash() {
            self.pending = None;
            self.failed_at = Some(self.chunk_begin);
            return Err(Error::data_loss(format!(
                "corrupted chunk data at {} (hash mismatch)",
                self.chunk_begin
            )));
        }
        self.pending = None;
        self.chunk_begin = self.src.pos();
        Ok(Some(Chunk { header, data }))
    }

    /// Repositions to `pos`, which the caller asserts is a chunk boundary.
    ///
    /// Verification happens on the next read. `Ok(false)` if `pos` lies
    /// beyond the end of the stream.
    pub fn seek(&mut self, pos: u64) -> Result<bool> {
        self.pending = None;
        self.failed_at = None;
        let reached = self.src.seek(pos)?;
        self.chunk_begin = self.src.pos();
        Ok(reached)
    }

    /// Positions on the boundary of the chunk containing `target`.
    ///
    /// Walks header to header: from the current boundary when the target is
    /// ahead, else from the start of the file. `Ok(false)` if the stream
    /// ends first (the reader is left at the final boundary).
    pub fn seek_to_chunk_containing(&mut self, target: u64) -> Result<bool> {
        let start = if self.chunk_begin <= target { self.chunk_begin } else { 0 };
        if !self.seek(start)? {
            return Ok(false);
        }
        loop {
            let Some(header) = self.pull_chunk_header()? else {
                return Ok(false);
            };
            // Padding was skipped, so chunk_begin may already be past a
            // target that pointed into filler; this boundary is then the
            // closest addressable one.
            if self.chunk_begin + header.chunk_size() > target {
                return Ok(true);
            }
            self.pending = None;
            if !self.src.skip(header.data_size())? {
                self.failed_at = Some(self.chunk_begin);
                return Err(Error::data_loss(format!(
                    "truncated chunk at {}",
                    self.chunk_begin
                )));
            }
            self.chunk_begin = self.src.pos();
        }
    }

    /// Scans forward for the next plausible chunk boundary after a failure.
    ///
    /// `Ok(None)` when the reader is not in a failed state. On success the
    /// reader stands on the resynchronized boundary and the skipped interval
    /// is returned; if the stream ends first, the region extends to the end
    /// and subsequent reads report a clean end of file.
    pub fn recover(&mut self) -> Result<Option<SkippedRegion>> {
        let Some(begin) = self.failed_at.take() else {
            return Ok(None);
        };
        self.pending = None;
        warn!(begin, "chunk corrupted, scanning for next chunk boundary");

        let mut candidate = begin + 1;
        if self.src.supports_random_access() {
            if candidate != self.src.pos() {
                self.src.seek(candidate)?;
                candidate = self.src.pos();
            }
        } else {
            // A forward-only source cannot revisit bytes it already read.
            candidate = candidate.max(self.src.pos());
            if candidate > self.src.pos() && !self.src.skip(candidate - self.src.pos())? {
                let end = self.src.pos();
                self.chunk_begin = end;
                return Ok(Some(SkippedRegion::new(begin, end)));
            }
        }

        let mut window: Vec<u8> = Vec::with_capacity(HEADER_SIZE);
        loop {
            while window.len() < HEADER_SIZE {
                match self.src.read_u8()? {
                    Some(byte) => window.push(byte),
                    None => {
                        // No boundary before the end: skip to it.
                        let end = self.src.pos();
                        self.chunk_begin = end;
                        debug!(begin, end, "no chunk boundary before end of stream");
                        return Ok(Some(SkippedRegion::new(begin, end)));
                    }
                }
            }
            let raw: [u8; HEADER_SIZE] = window[..].try_into().expect("window is header-sized");
            if let Some(header) = ChunkHeader::parse_candidate(&raw) {
                debug!(begin, resync = candidate, "resynchronized on chunk boundary");
                self.pending = Some(header);
                self.chunk_begin = candidate;
                return Ok(Some(SkippedRegion::new(begin, candidate)));
            }
            window.remove(0);
            candidate += 1;
        }
    }

    /// Arms recovery for corruption detected above the framing layer.
    pub(crate) fn report_corrupt(&mut self, at: u64) {
        self.pending = None;
        self.failed_at = Some(at);
    }
}
