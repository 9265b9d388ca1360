//! The pull-based reader contract.

use bytes::Bytes;
use sheaf_core::{Error, Result};

use super::Chain;

/// Default `recommended` hint for pulls that have no better idea.
pub(crate) const DEFAULT_PULL_HINT: usize = 0;

/// A pull-based byte source.
///
/// A reader exposes a logical stream position ([`pos`](ByteReader::pos)) and
/// a *fragment* - the bytes the source currently has contiguous in memory.
/// The caller reads directly out of [`fragment`](ByteReader::fragment)
/// (zero-copy), advances with [`consume`](ByteReader::consume), and calls
/// [`pull`](ByteReader::pull) when the fragment runs dry.
///
/// ## Contract
///
/// - After `pull(min, _)` returns `Ok(true)`, `fragment().len() >= min`
///   (a scratch buffer may have been installed to make it so).
/// - `Ok(false)` from `pull` means the stream cannot provide `min` more
///   bytes: end of stream, not an error.
/// - `consume(n)` with `n > fragment().len()` is a caller bug, checked by
///   `debug_assert!`.
/// - `seek` within the current fragment is O(1); forward-only readers return
///   `InvalidArgument` for backward targets.
/// - I/O failures are `Error::Io`; they are sticky in the sense that the
///   caller should not retry through the same reader.
pub trait ByteReader {
    /// Ensures at least `min` bytes are available in the fragment.
    ///
    /// `recommended` is a performance hint: if the source is going to do
    /// work anyway, making about that many bytes available amortizes future
    /// pulls. It never affects correctness.
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool>;

    /// The bytes available between the cursor and the fragment limit.
    fn fragment(&self) -> &[u8];

    /// Advances the cursor over `n` bytes of the fragment.
    fn consume(&mut self, n: usize);

    /// Current logical stream position.
    fn pos(&self) -> u64;

    /// Repositions to `pos`.
    ///
    /// Returns `Ok(false)` if `pos` lies beyond the end of the stream (the
    /// reader is left at the end). Forward-only readers reject backward
    /// targets with `InvalidArgument`.
    fn seek(&mut self, pos: u64) -> Result<bool>;

    /// Stream length, if the source knows it.
    fn size(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Whether `seek` can move backwards.
    fn supports_random_access(&self) -> bool {
        false
    }

    /// Whether `size` reports the stream length.
    fn supports_size(&self) -> bool {
        false
    }

    // ------------------------------------------------------------------
    // Provided combinators
    // ------------------------------------------------------------------

    /// Bytes available without another pull.
    fn available(&self) -> usize {
        self.fragment().len()
    }

    /// Reads a single byte; `Ok(None)` at end of stream.
    fn read_u8(&mut self) -> Result<Option<u8>> {
        if !self.pull(1, DEFAULT_PULL_HINT)? {
            return Ok(None);
        }
        let byte = self.fragment()[0];
        self.consume(1);
        Ok(Some(byte))
    }

    /// Appends exactly `n` bytes to `dest`.
    ///
    /// Returns `Ok(false)` if the stream ends first; whatever was available
    /// has then been consumed and appended.
    fn read_into(&mut self, n: usize, dest: &mut Vec<u8>) -> Result<bool> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.pull(1, remaining)? {
                return Ok(false);
            }
            let take = remaining.min(self.available());
            dest.extend_from_slice(&self.fragment()[..take]);
            self.consume(take);
            remaining -= take;
        }
        Ok(true)
    }

    /// Reads exactly `n` bytes; `Ok(None)` if the stream ends first.
    ///
    /// Adapters over refcounted storage override this to avoid the copy.
    fn read_bytes(&mut self, n: usize) -> Result<Option<Bytes>> {
        let mut out = Vec::with_capacity(n);
        if !self.read_into(n, &mut out)? {
            return Ok(None);
        }
        Ok(Some(Bytes::from(out)))
    }

    /// Appends exactly `n` bytes to `dest`, block by block.
    ///
    /// Returns `Ok(false)` if the stream ends first. Adapters over
    /// refcounted storage append zero-copy blocks.
    fn read_chain(&mut self, n: usize, dest: &mut Chain) -> Result<bool> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.pull(1, remaining)? {
                return Ok(false);
            }
            let take = remaining.min(self.available());
            dest.append(Bytes::copy_from_slice(&self.fragment()[..take]));
            self.consume(take);
            remaining -= take;
        }
        Ok(true)
    }

    /// Reads until end of stream, appending to `dest`.
    fn read_all(&mut self, dest: &mut Vec<u8>) -> Result<()> {
        while self.pull(1, DEFAULT_PULL_HINT)? {
            dest.extend_from_slice(self.fragment());
            let n = self.available();
            self.consume(n);
        }
        Ok(())
    }

    /// Skips `n` bytes; `Ok(false)` if the stream ends first.
    fn skip(&mut self, n: u64) -> Result<bool> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.pull(1, remaining.min(usize::MAX as u64) as usize)? {
                return Ok(false);
            }
            let take = (self.available() as u64).min(remaining) as usize;
            self.consume(take);
            remaining -= take as u64;
        }
        Ok(true)
    }

    /// Reads a varint.
    ///
    /// `Ok(None)` at a clean end of stream; a varint cut off mid-way or
    /// overflowing a u64 is corruption (`DataLoss`).
    fn read_varint(&mut self) -> Result<Option<u64>> {
        let Some(first) = self.read_u8()? else {
            return Ok(None);
        };
        let mut value = (first & 0x7F) as u64;
        if first & 0x80 == 0 {
            return Ok(Some(value));
        }
        let mut shift = 7u32;
        loop {
            let Some(byte) = self.read_u8()? else {
                return Err(Error::data_loss("truncated varint"));
            };
            if shift == 63 && byte > 1 {
                return Err(Error::data_loss("varint overflows u64"));
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(Some(value));
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::data_loss("varint overflows u64"));
            }
        }
    }

    /// Fails with `DataLoss` unless the stream is exactly exhausted.
    fn verify_end(&mut self) -> Result<()> {
        if self.pull(1, DEFAULT_PULL_HINT)? {
            return Err(Error::data_loss(format!(
                "trailing data at position {}",
                self.pos()
            )));
        }
        Ok(())
    }
}

/// A `&mut` reader is a reader.
///
/// This is how source ownership stays the caller's choice: pass a reader by
/// value to hand it over, pass `&mut` to keep it.
impl<R: ByteReader + ?Sized> ByteReader for &mut R {
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool> {
        (**self).pull(min, recommended)
    }

    fn fragment(&self) -> &[u8] {
        (**self).fragment()
    }

    fn consume(&mut self, n: usize) {
        (**self).consume(n)
    }

    fn pos(&self) -> u64 {
        (**self).pos()
    }

    fn seek(&mut self, pos: u64) -> Result<bool> {
        (**self).seek(pos)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        (**self).size()
    }

    fn supports_random_access(&self) -> bool {
        (**self).supports_random_access()
    }

    fn supports_size(&self) -> bool {
        (**self).supports_size()
    }

    fn read_bytes(&mut self, n: usize) -> Result<Option<Bytes>> {
        (**self).read_bytes(n)
    }

    fn read_chain(&mut self, n: usize, dest: &mut Chain) -> Result<bool> {
        (**self).read_chain(n, dest)
    }

    fn skip(&mut self, n: u64) -> Result<bool> {
        (**self).skip(n)
    }
}
