//! Chunk framing primitives.
//!
//! A sheaf file is a sequence of chunks, each framed by a fixed 40-byte
//! header:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (40 bytes, little-endian)                             │
//! │ - Header hash: CRC32 of bytes 8..40 (8 bytes)                │
//! │ - Data hash: CRC32 of the chunk data (8 bytes)               │
//! │ - Chunk type (low 8 bits) | record count << 8 (8 bytes)      │
//! │ - Decoded data size (8 bytes)                                │
//! │ - Data size (8 bytes)                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data (data_size bytes, layout depends on the chunk type)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hash slots are 8 bytes wide with the CRC32 zero-extended, leaving
//! room to widen the hash without changing the layout.
//!
//! ## Why This Design?
//!
//! ### Self-verifying headers
//! The header hash makes a chunk boundary recognizable on its own: recovery
//! scans forward testing candidate positions until a header verifies, which
//! is what lets a corrupt chunk be skipped without an index.
//!
//! ### Record count bound
//! A header is only accepted when `num_records <= 40 + data_size`. Besides
//! rejecting nonsense during recovery scans, the bound makes
//! `RecordPosition::numeric()` (chunk position + record index) injective
//! across chunks.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sheaf_core::{Error, Result};

use crate::byteio::Chain;

/// Size of every chunk header.
pub const HEADER_SIZE: usize = 40;

/// Block alignment unit for padded files (64 KiB).
pub const BLOCK_SIZE: u64 = 64 * 1024;

/// Record count is packed into 56 bits next to the chunk type byte.
pub const MAX_NUM_RECORDS: u64 = (1 << 56) - 1;

/// What a chunk holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// First chunk of every file; doubles as the format magic.
    FileSignature,
    /// Optional second chunk holding serialized file metadata.
    FileMetadata,
    /// Filler up to a block boundary; invisible to readers.
    Padding,
    /// Concatenated records with a size table.
    Simple,
    /// Columnar (per-field) record encoding.
    Transposed,
}

impl ChunkType {
    pub fn as_byte(self) -> u8 {
        match self {
            ChunkType::FileSignature => 0,
            ChunkType::FileMetadata => 1,
            ChunkType::Padding => 2,
            ChunkType::Simple => 3,
            ChunkType::Transposed => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ChunkType::FileSignature),
            1 => Some(ChunkType::FileMetadata),
            2 => Some(ChunkType::Padding),
            3 => Some(ChunkType::Simple),
            4 => Some(ChunkType::Transposed),
            _ => None,
        }
    }
}

/// Parsed chunk header.
///
/// The raw type byte is kept as read so an unknown chunk type survives
/// header parsing (the decoder decides what to do with it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    type_byte: u8,
    num_records: u64,
    decoded_data_size: u64,
    data_size: u64,
    data_hash: u64,
}

impl ChunkHeader {
    /// Builds a header for `chunk_type` over `data`.
    pub fn new(
        chunk_type: ChunkType,
        num_records: u64,
        decoded_data_size: u64,
        data: &Chain,
    ) -> Self {
        debug_assert!(num_records <= MAX_NUM_RECORDS, "record count does not fit the header");
        Self {
            type_byte: chunk_type.as_byte(),
            num_records,
            decoded_data_size,
            data_size: data.len(),
            data_hash: hash_chain(data),
        }
    }

    /// The chunk type, if recognized.
    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_byte(self.type_byte)
    }

    pub fn type_byte(&self) -> u8 {
        self.type_byte
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn decoded_data_size(&self) -> u64 {
        self.decoded_data_size
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn data_hash(&self) -> u64 {
        self.data_hash
    }

    /// Total framed size of the chunk: header plus data.
    pub fn chunk_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.data_size
    }

    /// Serializes the header, computing the header hash.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut body = BytesMut::with_capacity(HEADER_SIZE - 8);
        body.put_u64_le(self.data_hash);
        body.put_u64_le((self.num_records << 8) | self.type_byte as u64);
        body.put_u64_le(self.decoded_data_size);
        body.put_u64_le(self.data_size);

        let mut out = [0u8; HEADER_SIZE];
        out[..8].copy_from_slice(&(crc32fast::hash(&body) as u64).to_le_bytes());
        out[8..].copy_from_slice(&body);
        out
    }

    /// Parses and verifies a header.
    ///
    /// A hash mismatch or an impossible record count is corruption.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        match Self::parse_candidate(bytes) {
            Some(header) => Ok(header),
            None => Err(Error::data_loss("corrupted chunk header")),
        }
    }

    /// Parses a candidate header, returning `None` unless the hash verifies
    /// and the lengths are plausible. This is the recovery scan predicate.
    pub fn parse_candidate(bytes: &[u8; HEADER_SIZE]) -> Option<Self> {
        let mut cursor = &bytes[..];
        let header_hash = cursor.get_u64_le();
        if header_hash != crc32fast::hash(&bytes[8..]) as u64 {
            return None;
        }
        let data_hash = cursor.get_u64_le();
        let packed = cursor.get_u64_le();
        let decoded_data_size = cursor.get_u64_le();
        let data_size = cursor.get_u64_le();

        let header = Self {
            type_byte: (packed & 0xFF) as u8,
            num_records: packed >> 8,
            decoded_data_size,
            data_size,
            data_hash,
        };
        if header.num_records > HEADER_SIZE as u64 + header.data_size {
            return None;
        }
        Some(header)
    }
}

/// A framed unit of the file: header plus opaque data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub data: Chain,
}

impl Chunk {
    /// Builds a chunk, deriving the header hashes from `data`.
    pub fn new(
        chunk_type: ChunkType,
        num_records: u64,
        decoded_data_size: u64,
        data: Chain,
    ) -> Self {
        let header = ChunkHeader::new(chunk_type, num_records, decoded_data_size, &data);
        Self { header, data }
    }

    /// The file signature chunk: fixed 40 bytes that double as the magic.
    pub fn file_signature() -> Self {
        Self::new(ChunkType::FileSignature, 0, 0, Chain::new())
    }

    /// A padding chunk with `data_size` filler bytes.
    pub fn padding(data_size: u64) -> Self {
        Self::new(
            ChunkType::Padding,
            0,
            0,
            Chain::from(Bytes::from(vec![0u8; data_size as usize])),
        )
    }

    /// Serializes header and data into `dest`.
    pub fn encode_into(&self, dest: &mut BytesMut) {
        dest.put_slice(&self.header.encode());
        for block in self.data.blocks() {
            dest.put_slice(block);
        }
    }
}

/// CRC32 of a chain's content, zero-extended to the header's hash width.
pub fn hash_chain(data: &Chain) -> u64 {
    let mut hasher = crc32fast::Hasher::new();
    for block in data.blocks() {
        hasher.update(block);
    }
    hasher.finalize() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk::new(
            ChunkType::Simple,
            3,
            20,
            Chain::from(Bytes::from_static(b"payload bytes here")),
        )
    }

    // ---------------------------------------------------------------
    // Header round trip
    // ---------------------------------------------------------------

    #[test]
    fn test_header_roundtrip() {
        let chunk = sample_chunk();
        let encoded = chunk.header.encode();
        let parsed = ChunkHeader::parse(&encoded).unwrap();
        assert_eq!(parsed, chunk.header);
        assert_eq!(parsed.chunk_type(), Some(ChunkType::Simple));
        assert_eq!(parsed.num_records(), 3);
        assert_eq!(parsed.decoded_data_size(), 20);
        assert_eq!(parsed.data_size(), 18);
    }

    #[test]
    fn test_signature_is_fixed() {
        // The signature chunk is deterministic: it is the file magic.
        assert_eq!(
            Chunk::file_signature().header.encode(),
            Chunk::file_signature().header.encode()
        );
        assert_eq!(Chunk::file_signature().header.chunk_size(), HEADER_SIZE as u64);
    }

    // ---------------------------------------------------------------
    // Corruption detection
    // ---------------------------------------------------------------

    #[test]
    fn test_flipped_bit_fails_hash() {
        let mut encoded = sample_chunk().header.encode();
        encoded[17] ^= 0x01;
        assert!(ChunkHeader::parse(&encoded).unwrap_err().is_data_loss());
        assert!(ChunkHeader::parse_candidate(&encoded).is_none());
    }

    #[test]
    fn test_impossible_record_count_rejected() {
        // A record count larger than the whole chunk cannot be real.
        let header = ChunkHeader {
            type_byte: ChunkType::Simple.as_byte(),
            num_records: 1000,
            decoded_data_size: 10,
            data_size: 10,
            data_hash: 0,
        };
        let encoded = header.encode();
        assert!(ChunkHeader::parse_candidate(&encoded).is_none());
    }

    #[test]
    fn test_unknown_type_survives_parse() {
        let header = ChunkHeader {
            type_byte: 77,
            num_records: 0,
            decoded_data_size: 0,
            data_size: 0,
            data_hash: 0,
        };
        let parsed = ChunkHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed.chunk_type(), None);
        assert_eq!(parsed.type_byte(), 77);
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn test_encode_into() {
        let chunk = sample_chunk();
        let mut out = BytesMut::new();
        chunk.encode_into(&mut out);
        assert_eq!(out.len(), HEADER_SIZE + 18);
        assert_eq!(&out[HEADER_SIZE..], b"payload bytes here");
    }

    #[test]
    fn test_data_hash_covers_content() {
        let a = Chunk::new(ChunkType::Simple, 1, 5, Chain::from(Bytes::from_static(b"aaaaa")));
        let b = Chunk::new(ChunkType::Simple, 1, 5, Chain::from(Bytes::from_static(b"aaaab")));
        assert_ne!(a.header.data_hash(), b.header.data_hash());
    }

    #[test]
    fn test_type_byte_roundtrip() {
        for t in [
            ChunkType::FileSignature,
            ChunkType::FileMetadata,
            ChunkType::Padding,
            ChunkType::Simple,
            ChunkType::Transposed,
        ] {
            assert_eq!(ChunkType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(ChunkType::from_byte(5), None);
    }
}
