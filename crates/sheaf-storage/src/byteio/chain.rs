//! A rope of byte blocks.

use bytes::{Bytes, BytesMut};

/// A cheaply-appendable, cheaply-sliceable sequence of byte blocks.
///
/// Chunk payloads are collected block by block as they come off the source,
/// so a chunk never has to be flattened into one contiguous allocation just
/// to be carried around. Blocks are refcounted [`Bytes`], so cloning a chain
/// clones handles, not data.
///
/// The chain keeps a cumulative offset per block, which gives
/// [`ChainReader`](super::ChainReader) O(log blocks) seeks.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    blocks: Vec<Bytes>,
    /// Start offset of each block; parallel to `blocks`.
    offsets: Vec<u64>,
    len: u64,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total byte length.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a block. Empty blocks are dropped.
    pub fn append(&mut self, block: impl Into<Bytes>) {
        let block = block.into();
        if block.is_empty() {
            return;
        }
        self.offsets.push(self.len);
        self.len += block.len() as u64;
        self.blocks.push(block);
    }

    /// The underlying blocks.
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Start offset of block `index`.
    pub(crate) fn block_offset(&self, index: usize) -> u64 {
        self.offsets[index]
    }

    /// Index of the block containing `pos`.
    ///
    /// `pos == len()` maps past the last block (end of chain).
    pub(crate) fn block_index_at(&self, pos: u64) -> usize {
        debug_assert!(pos <= self.len, "position past end of chain");
        if pos == self.len {
            // The cursor sits past every block.
            return self.blocks.len();
        }
        self.offsets.partition_point(|&start| start <= pos) - 1
    }

    /// Flattens into contiguous bytes. Copies; meant for small chains and
    /// tests.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len as usize);
        for block in &self.blocks {
            out.extend_from_slice(block);
        }
        out.freeze()
    }
}

impl From<Bytes> for Chain {
    fn from(block: Bytes) -> Self {
        let mut chain = Chain::new();
        chain.append(block);
        chain
    }
}

impl From<Vec<u8>> for Chain {
    fn from(block: Vec<u8>) -> Self {
        Chain::from(Bytes::from(block))
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        // Content equality, independent of block boundaries.
        self.len == other.len && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Chain {}
