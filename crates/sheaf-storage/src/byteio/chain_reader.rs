//! Reader over a [`Chain`].

use bytes::Bytes;
use sheaf_core::Result;

use super::{ByteReader, Chain, Scratch};

/// A [`ByteReader`] over a [`Chain`] rope.
///
/// The natural fragment is the current block. Pulls that span a block
/// boundary bridge it through a [`Scratch`] buffer; seeks locate the target
/// block through the chain's offset index.
///
/// Construction clones the chain, which clones refcounted block handles,
/// not data.
#[derive(Debug)]
pub struct ChainReader {
    chain: Chain,
    /// Current block index; `chain.blocks().len()` at end of chain.
    block: usize,
    /// Cursor within the current block.
    offset: usize,
    scratch: Option<Scratch>,
}

impl ChainReader {
    pub fn new(chain: &Chain) -> Self {
        Self {
            chain: chain.clone(),
            block: 0,
            offset: 0,
            scratch: None,
        }
    }

    fn natural_pos(&self) -> u64 {
        if self.block < self.chain.blocks().len() {
            self.chain.block_offset(self.block) + self.offset as u64
        } else {
            self.chain.len()
        }
    }

    fn natural_fragment(&self) -> &[u8] {
        match self.chain.blocks().get(self.block) {
            Some(block) => &block[self.offset..],
            None => &[],
        }
    }

    /// Advances the natural cursor, normalizing onto the next block when the
    /// current one is exhausted.
    fn advance_natural(&mut self, n: usize) {
        debug_assert!(n <= self.natural_fragment().len(), "consumed past fragment limit");
        self.offset += n;
        if self.block < self.chain.blocks().len()
            && self.offset == self.chain.blocks()[self.block].len()
        {
            self.block += 1;
            self.offset = 0;
        }
    }

    fn pull_slow(&mut self, min: usize, recommended: usize) -> Result<bool> {
        let target = min.max(recommended);
        let (mut buf, base_pos) = match self.scratch.take() {
            Some(scratch) => scratch.into_remainder(),
            None => (Vec::with_capacity(target), self.natural_pos()),
        };
        while buf.len() < target {
            let fragment = self.natural_fragment();
            if fragment.is_empty() {
                break;
            }
            let take = fragment.len().min(target - buf.len());
            buf.extend_from_slice(&fragment[..take]);
            self.advance_natural(take);
        }
        if buf.is_empty() {
            return Ok(false);
        }
        let pulled = buf.len() >= min;
        self.scratch = Some(Scratch::new(buf, base_pos));
        Ok(pulled)
    }
}

impl ByteReader for ChainReader {
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool> {
        let min = min.max(1);
        if self.scratch.as_ref().is_some_and(Scratch::is_exhausted) {
            // The natural cursor already stands past the scratch bytes.
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
            None => self.natural_fragment(),
        }
    }

    fn consume(&mut self, n: usize) {
        match &mut self.scratch {
            Some(scratch) => scratch.consume(n),
            None => self.advance_natural(n),
        }
    }

    fn pos(&self) -> u64 {
        match &self.scratch {
            Some(scratch) => scratch.pos(),
            None => self.natural_pos(),
        }
    }

    fn seek(&mut self, pos: u64) -> Result<bool> {
        self.scratch = None;
        if pos > self.chain.len() {
            self.block = self.chain.blocks().len();
            self.offset = 0;
            return Ok(false);
        }
        self.block = self.chain.block_index_at(pos);
        self.offset = if self.block < self.chain.blocks().len() {
            (pos - self.chain.block_offset(self.block)) as usize
        } else {
            0
        };
        Ok(true)
    }

    fn size(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.chain.len()))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn supports_size(&self) -> bool {
        true
    }

    fn read_chain(&mut self, n: usize, dest: &mut Chain) -> Result<bool> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.pull(1, remaining)? {
                return Ok(false);
            }
            let take = remaining.min(self.available());
            match &mut self.scratch {
                Some(scratch) => {
                    dest.append(Bytes::copy_from_slice(&scratch.fragment()[..take]));
                    scratch.consume(take);
                }
                None => {
                    // Zero-copy slice of the current block.
                    let block = &self.chain.blocks()[self.block];
                    dest.append(block.slice(self.offset..self.offset + take));
                    self.advance_natural(take);
                }
            }
            remaining -= take;
        }
        Ok(true)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Option<Bytes>> {
        if n == 0 {
            return Ok(Some(Bytes::new()));
        }
        // Fast path: the whole range lies in one block.
        if self.scratch.is_none() && self.natural_fragment().len() >= n {
            let block = &self.chain.blocks()[self.block];
            let out = block.slice(self.offset..self.offset + n);
            self.advance_natural(n);
            return Ok(Some(out));
        }
        let mut out = Vec::with_capacity(n);
        if !self.read_into(n, &mut out)? {
            return Ok(None);
        }
        Ok(Some(Bytes::from(out)))
    }

    fn skip(&mut self, n: u64) -> Result<bool> {
        self.seek(self.pos() + n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chain() -> Chain {
        let mut chain = Chain::new();
        chain.append(Bytes::from_static(b"abc"));
        chain.append(Bytes::from_static(b"de"));
        chain.append(Bytes::from_static(b"fghij"));
        chain
    }

    // ---------------------------------------------------------------
    // Natural fragments
    // ---------------------------------------------------------------

    #[test]
    fn test_fragment_is_current_block() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(reader.pull(1, 0).unwrap());
        assert_eq!(reader.fragment(), b"abc");

        reader.consume(3);
        assert!(reader.pull(1, 0).unwrap());
        assert_eq!(reader.fragment(), b"de");
        assert_eq!(reader.pos(), 3);
    }

    #[test]
    fn test_pos_tracks_consumption() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        reader.consume(2);
        assert_eq!(reader.pos(), 2);
        reader.consume(1); // normalizes onto the next block
        assert_eq!(reader.pos(), 3);
        assert_eq!(reader.fragment(), b"de");
    }

    // ---------------------------------------------------------------
    // Scratch across block boundaries
    // ---------------------------------------------------------------

    #[test]
    fn test_pull_across_blocks_installs_scratch() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        // "abc" + "de" must be bridged.
        assert!(reader.pull(5, 0).unwrap());
        assert!(reader.available() >= 5);
        assert_eq!(&reader.fragment()[..5], b"abcde");
        assert_eq!(reader.pos(), 0);

        reader.consume(4);
        assert_eq!(reader.pos(), 4);
    }

    #[test]
    fn test_natural_fragment_resumes_after_scratch() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(reader.pull(5, 0).unwrap());
        let scratch_len = reader.available();
        reader.consume(scratch_len);
        // Scratch exhausted: the next pull shows the natural fragment.
        assert!(reader.pull(1, 0).unwrap());
        assert_eq!(reader.pos(), scratch_len as u64);
        assert_eq!(reader.fragment(), &b"abcdefghij"[scratch_len..]);
    }

    #[test]
    fn test_pull_more_while_scratch_active() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(reader.pull(4, 0).unwrap());
        reader.consume(1);
        // Needs more than the scratch holds: the remainder is carried over.
        assert!(reader.pull(9, 0).unwrap());
        assert_eq!(&reader.fragment()[..9], b"bcdefghij");
        assert_eq!(reader.pos(), 1);
    }

    #[test]
    fn test_pull_past_eof() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(!reader.pull(11, 0).unwrap());
        // Everything available is still exposed.
        assert_eq!(reader.available(), 10);
    }

    // ---------------------------------------------------------------
    // Seeking
    // ---------------------------------------------------------------

    #[test]
    fn test_seek_locates_block() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(reader.seek(6).unwrap());
        assert_eq!(reader.pos(), 6);
        assert_eq!(reader.fragment(), b"ghij");

        assert!(reader.seek(0).unwrap());
        assert_eq!(reader.fragment(), b"abc");
    }

    #[test]
    fn test_seek_discards_scratch() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(reader.pull(7, 0).unwrap());
        assert!(reader.seek(3).unwrap());
        assert_eq!(reader.pos(), 3);
        assert_eq!(reader.fragment(), b"de");
    }

    #[test]
    fn test_seek_past_end() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        assert!(!reader.seek(11).unwrap());
        assert_eq!(reader.pos(), 10);
        assert!(!reader.pull(1, 0).unwrap());
    }

    // ---------------------------------------------------------------
    // Bulk reads
    // ---------------------------------------------------------------

    #[test]
    fn test_read_chain_zero_copy_blocks() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        let mut dest = Chain::new();
        assert!(reader.read_chain(10, &mut dest).unwrap());
        assert_eq!(dest.to_bytes(), Bytes::from_static(b"abcdefghij"));
        // Block boundaries survive the copy-free path.
        assert_eq!(dest.blocks().len(), 3);
    }

    #[test]
    fn test_read_bytes_within_block() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        reader.seek(5).unwrap();
        let bytes = reader.read_bytes(3).unwrap().unwrap();
        assert_eq!(bytes, Bytes::from_static(b"fgh"));
    }

    #[test]
    fn test_read_bytes_across_blocks() {
        let chain = sample_chain();
        let mut reader = ChainReader::new(&chain);
        let bytes = reader.read_bytes(7).unwrap().unwrap();
        assert_eq!(bytes, Bytes::from_static(b"abcdefg"));
        assert_eq!(reader.pos(), 7);
    }
}
