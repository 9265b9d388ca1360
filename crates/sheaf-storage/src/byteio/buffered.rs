//! Reader over any [`std::io::Read`].

use std::io::Read;

use sheaf_core::{Error, Result};

use super::ByteReader;

/// Default read granularity; matches the container's block size.
const DEFAULT_READ_SIZE: usize = 64 * 1024;

/// A forward-only [`ByteReader`] over any [`std::io::Read`].
///
/// This is the adapter for files, sockets, and process pipes. The reader
/// owns its buffer and grows it to satisfy any `pull(min)`, so it never
/// needs scratch: the buffer *is* the fragment.
#[derive(Debug)]
pub struct BufferedReader<R> {
    src: R,
    buf: Vec<u8>,
    /// Consumed prefix of `buf`.
    cursor: usize,
    /// Stream position of `buf[0]`.
    buf_start_pos: u64,
    eof: bool,
}

impl<R: Read> BufferedReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            buf: Vec::new(),
            cursor: 0,
            buf_start_pos: 0,
            eof: false,
        }
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> R {
        self.src
    }

    fn pull_slow(&mut self, min: usize, recommended: usize) -> Result<bool> {
        // Drop the consumed prefix before growing.
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.buf_start_pos += self.cursor as u64;
            self.cursor = 0;
        }
        let target = min.max(recommended);
        while self.buf.len() < target && !self.eof {
            let want = (target - self.buf.len()).max(DEFAULT_READ_SIZE);
            let old_len = self.buf.len();
            self.buf.resize(old_len + want, 0);
            match self.src.read(&mut self.buf[old_len..]) {
                Ok(0) => {
                    self.eof = true;
                    self.buf.truncate(old_len);
                }
                Ok(n) => self.buf.truncate(old_len + n),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    self.buf.truncate(old_len);
                }
                Err(e) => {
                    self.buf.truncate(old_len);
                    return Err(e.into());
                }
            }
        }
        Ok(self.buf.len() >= min)
    }
}

impl<R: Read> ByteReader for BufferedReader<R> {
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool> {
        let min = min.max(1);
        if self.available() >= min {
            return Ok(true);
        }
        self.pull_slow(min, recommended)
    }

    fn fragment(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.buf.len() - self.cursor, "consumed past fragment limit");
        self.cursor += n;
    }

    fn pos(&self) -> u64 {
        self.buf_start_pos + self.cursor as u64
    }

    fn seek(&mut self, pos: u64) -> Result<bool> {
        let current = self.pos();
        if pos < current {
            return Err(Error::invalid_argument(format!(
                "cannot seek backwards from {} to {} on a forward-only reader",
                current, pos
            )));
        }
        self.skip(pos - current)
    }
}
