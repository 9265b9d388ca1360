//! Reader over any [`bytes::Buf`].

use bytes::Buf;
use sheaf_core::{Error, Result};

use super::{ByteReader, Scratch};

/// A forward-only [`ByteReader`] over any [`bytes::Buf`].
///
/// This adapts fragmented immutable containers - `VecDeque<Bytes>` chains,
/// `bytes::buf::Chain` pairs, anything that speaks `Buf` - into the pull
/// contract. The natural fragment is whatever [`Buf::chunk`] exposes;
/// advancing past it resets the fragment to the next chunk's bytes. Pulls
/// spanning chunk boundaries bridge through [`Scratch`].
///
/// Seeking backwards is rejected with `InvalidArgument`: a `Buf` cannot
/// rewind.
#[derive(Debug)]
pub struct BufReader<B> {
    src: B,
    /// Total bytes advanced out of `src`.
    consumed: u64,
    /// Stream length, fixed at construction.
    len: u64,
    scratch: Option<Scratch>,
}

impl<B: Buf> BufReader<B> {
    pub fn new(src: B) -> Self {
        let len = src.remaining() as u64;
        Self {
            src,
            consumed: 0,
            len,
            scratch: None,
        }
    }

    fn pull_slow(&mut self, min: usize, recommended: usize) -> Result<bool> {
        let target = min.max(recommended);
        let (mut buf, base_pos) = match self.scratch.take() {
            Some(scratch) => scratch.into_remainder(),
            None => (Vec::with_capacity(target), self.consumed),
        };
        while buf.len() < target && self.src.has_remaining() {
            let chunk = self.src.chunk();
            let take = chunk.len().min(target - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            self.src.advance(take);
            self.consumed += take as u64;
        }
        if buf.is_empty() {
            return Ok(false);
        }
        let pulled = buf.len() >= min;
        self.scratch = Some(Scratch::new(buf, base_pos));
        Ok(pulled)
    }
}

impl<B: Buf> ByteReader for BufReader<B> {
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool> {
        let min = min.max(1);
        if self.scratch.as_ref().is_some_and(Scratch::is_exhausted) {
            self.scratch = None;
        }
        if self.available() >= min {
            return Ok(true);
        }
        self.pull_slow(min, recommended)
    }

    fn fragment(&self) -> &[u8] {
        match &self.scratch {
            Some(scratch) => scratch.fragment(),
            None => self.src.chunk(),
        }
    }

    fn consume(&mut self, n: usize) {
        match &mut self.scratch {
            Some(scratch) => scratch.consume(n),
            None => {
                debug_assert!(n <= self.src.chunk().len(), "consumed past fragment limit");
                self.src.advance(n);
                self.consumed += n as u64;
            }
        }
    }

    fn pos(&self) -> u64 {
        match &self.scratch {
            Some(scratch) => scratch.pos(),
            None => self.consumed,
        }
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

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.len))
    }

    fn supports_size(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn sample() -> impl Buf {
        // Two fragments glued by bytes::Buf::chain.
        Bytes::from_static(b"abcde").chain(Bytes::from_static(b"fgh"))
    }

    #[test]
    fn test_fragment_is_current_chunk() {
        let mut reader = BufReader::new(sample());
        assert!(reader.pull(1, 0).unwrap());
        assert_eq!(reader.fragment(), b"abcde");
        reader.consume(5);
        assert!(reader.pull(1, 0).unwrap());
        assert_eq!(reader.fragment(), b"fgh");
        assert_eq!(reader.pos(), 5);
    }

    #[test]
    fn test_pull_across_chunks() {
        let mut reader = BufReader::new(sample());
        reader.consume(3);
        assert!(reader.pull(4, 0).unwrap());
        assert_eq!(&reader.fragment()[..4], b"defg");
        assert_eq!(reader.pos(), 3);
    }

    #[test]
    fn test_forward_seek_and_size() {
        let mut reader = BufReader::new(sample());
        assert_eq!(reader.size().unwrap(), Some(8));
        assert!(reader.seek(6).unwrap());
        assert_eq!(reader.fragment(), b"gh");
        assert!(!reader.seek(20).unwrap());
    }

    #[test]
    fn test_backward_seek_rejected() {
        let mut reader = BufReader::new(sample());
        reader.consume(4);
        let err = reader.seek(1).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_pull_past_eof() {
        let mut reader = BufReader::new(sample());
        assert!(!reader.pull(9, 0).unwrap());
        assert_eq!(reader.available(), 8);
    }
}
