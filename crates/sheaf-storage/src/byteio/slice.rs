//! Reader over contiguous bytes.

use bytes::Bytes;
use sheaf_core::Result;

use super::{ByteReader, Chain};

/// A [`ByteReader`] over a single contiguous [`Bytes`].
///
/// The whole range is one fragment, so every read is zero-copy and every
/// seek is O(1). This is also what decompressed chunk payloads are exposed
/// through.
#[derive(Debug, Clone)]
pub struct SliceReader {
    data: Bytes,
    cursor: usize,
}

impl SliceReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}

impl ByteReader for SliceReader {
    fn pull(&mut self, min: usize, _recommended: usize) -> Result<bool> {
        Ok(self.remaining() >= min.max(1))
    }

    fn fragment(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.remaining(), "consumed past fragment limit");
        self.cursor += n;
    }

    fn pos(&self) -> u64 {
        self.cursor as u64
    }

    fn seek(&mut self, pos: u64) -> Result<bool> {
        if pos > self.data.len() as u64 {
            // Forward past the end: stop at the end.
            self.cursor = self.data.len();
            return Ok(false);
        }
        self.cursor = pos as usize;
        Ok(true)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn supports_size(&self) -> bool {
        true
    }

    fn read_bytes(&mut self, n: usize) -> Result<Option<Bytes>> {
        if self.remaining() < n {
            self.cursor = self.data.len();
            return Ok(None);
        }
        let out = self.data.slice(self.cursor..self.cursor + n);
        self.cursor += n;
        Ok(Some(out))
    }

    fn read_chain(&mut self, n: usize, dest: &mut Chain) -> Result<bool> {
        match self.read_bytes(n)? {
            Some(block) => {
                dest.append(block);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn skip(&mut self, n: u64) -> Result<bool> {
        self.seek(self.pos() + n)
    }
}
