//! Compression codecs for chunk payloads.
//!
//! A compressed sub-stream is `{varint uncompressed_size}{codec bytes}`;
//! `CompressionType::None` is the raw bytes with no prefix. Blocks are
//! compressed and decompressed whole: chunk payloads are bounded by
//! construction, so memory stays one-chunk-sized and the codecs run over
//! plain slices.

use std::io::Read;

use serde::{Deserialize, Serialize};
use sheaf_core::{varint, Error, Result};

use crate::byteio::{ByteReader, SliceReader};

/// Upper bound on a declared uncompressed size. A header claiming more than
/// this is corrupt, not just large.
pub const MAX_DECODED_SIZE: u64 = 1 << 30;

/// Compression applied to a chunk payload or bucket stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Brotli,
    Zstd,
    Snappy,
    Lz4,
}

impl CompressionType {
    /// Wire byte for this codec.
    pub fn as_byte(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Brotli => 1,
            CompressionType::Zstd => 2,
            CompressionType::Snappy => 3,
            CompressionType::Lz4 => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Brotli),
            2 => Ok(CompressionType::Zstd),
            3 => Ok(CompressionType::Snappy),
            4 => Ok(CompressionType::Lz4),
            _ => Err(Error::data_loss(format!("Unknown compression type: {}", byte))),
        }
    }
}

/// Compresses `data` into `{varint uncompressed_size}{codec bytes}` (or the
/// raw bytes for `None`). The writer-side counterpart of [`Decompressor`].
pub fn compress_block(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    if compression == CompressionType::None {
        return Ok(data.to_vec());
    }
    let mut out = Vec::with_capacity(data.len() / 2 + varint::MAX_VARINT_LEN);
    varint::encode_varint_u64(&mut out, data.len() as u64);
    match compression {
        CompressionType::None => unreachable!(),
        CompressionType::Brotli => {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            std::io::Write::write_all(&mut writer, data)
                .map_err(|e| Error::data_loss(format!("Brotli compression failed: {}", e)))?;
        }
        CompressionType::Zstd => {
            let compressed = zstd::stream::encode_all(data, 3)
                .map_err(|e| Error::data_loss(format!("Zstd compression failed: {}", e)))?;
            out.extend_from_slice(&compressed);
        }
        CompressionType::Snappy => {
            let compressed = snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::data_loss(format!("Snappy compression failed: {}", e)))?;
            out.extend_from_slice(&compressed);
        }
        CompressionType::Lz4 => {
            out.extend_from_slice(&lz4_flex::block::compress(data));
        }
    }
    Ok(out)
}

/// Exposes a codec-tagged compressed sub-stream as a [`ByteReader`].
///
/// For `CompressionType::None` this is a transparent view of the source.
/// Otherwise the leading varint declares the uncompressed size, the rest of
/// the source is the codec stream, and the decompressed bytes are exposed
/// through a [`SliceReader`]. The declared size is handed to the codec as a
/// sizing hint and enforced against the actual output.
#[derive(Debug)]
pub struct Decompressor<R> {
    repr: Repr<R>,
}

#[derive(Debug)]
enum Repr<R> {
    Transparent(R),
    Decoded(SliceReader),
}

impl<R: ByteReader> Decompressor<R> {
    pub fn new(mut src: R, compression: CompressionType) -> Result<Self> {
        if compression == CompressionType::None {
            return Ok(Self {
                repr: Repr::Transparent(src),
            });
        }

        let declared = match src.read_varint() {
            Ok(Some(size)) => size,
            Ok(None) | Err(Error::DataLoss(_)) => {
                return Err(Error::data_loss("Reading uncompressed size failed"))
            }
            Err(e) => return Err(e),
        };
        if declared > MAX_DECODED_SIZE {
            return Err(Error::data_loss(format!(
                "Uncompressed size too large: {}",
                declared
            )));
        }

        let mut compressed = Vec::new();
        src.read_all(&mut compressed)?;

        let decoded = decode(&compressed, compression, declared as usize)?;
        if decoded.len() as u64 != declared {
            return Err(Error::data_loss(format!(
                "Uncompressed size mismatch: declared {}, got {}",
                declared,
                decoded.len()
            )));
        }
        Ok(Self {
            repr: Repr::Decoded(SliceReader::new(decoded)),
        })
    }

    /// Verifies the stream was exactly consumed and releases it.
    pub fn verify_end_and_close(mut self) -> Result<()> {
        self.verify_end()
    }
}

fn decode(compressed: &[u8], compression: CompressionType, size_hint: usize) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => unreachable!("transparent path handled by the caller"),
        CompressionType::Brotli => {
            let mut out = Vec::with_capacity(size_hint);
            brotli::Decompressor::new(compressed, 4096)
                .read_to_end(&mut out)
                .map_err(|e| Error::data_loss(format!("Brotli decompression failed: {}", e)))?;
            Ok(out)
        }
        CompressionType::Zstd => {
            let mut out = Vec::with_capacity(size_hint);
            zstd::stream::read::Decoder::new(compressed)
                .and_then(|mut decoder| decoder.read_to_end(&mut out))
                .map_err(|e| Error::data_loss(format!("Zstd decompression failed: {}", e)))?;
            Ok(out)
        }
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| Error::data_loss(format!("Snappy decompression failed: {}", e))),
        CompressionType::Lz4 => lz4_flex::block::decompress(compressed, size_hint)
            .map_err(|e| Error::data_loss(format!("Lz4 decompression failed: {}", e))),
    }
}

/// The decompressor is itself a reader; the variant match stays inline
/// instead of going through a trait object.
impl<R: ByteReader> ByteReader for Decompressor<R> {
    fn pull(&mut self, min: usize, recommended: usize) -> Result<bool> {
        match &mut self.repr {
            Repr::Transparent(src) => src.pull(min, recommended),
            Repr::Decoded(reader) => reader.pull(min, recommended),
        }
    }

    fn fragment(&self) -> &[u8] {
        match &self.repr {
            Repr::Transparent(src) => src.fragment(),
            Repr::Decoded(reader) => reader.fragment(),
        }
    }

    fn consume(&mut self, n: usize) {
        match &mut self.repr {
            Repr::Transparent(src) => src.consume(n),
            Repr::Decoded(reader) => reader.consume(n),
        }
    }

    fn pos(&self) -> u64 {
        match &self.repr {
            Repr::Transparent(src) => src.pos(),
            Repr::Decoded(reader) => reader.pos(),
        }
    }

    fn seek(&mut self, pos: u64) -> Result<bool> {
        match &mut self.repr {
            Repr::Transparent(src) => src.seek(pos),
            Repr::Decoded(reader) => reader.seek(pos),
        }
    }

    fn size(&mut self) -> Result<Option<u64>> {
        match &mut self.repr {
            Repr::Transparent(src) => src.size(),
            Repr::Decoded(reader) => reader.size(),
        }
    }

    fn supports_random_access(&self) -> bool {
        match &self.repr {
            Repr::Transparent(src) => src.supports_random_access(),
            Repr::Decoded(reader) => reader.supports_random_access(),
        }
    }

    fn supports_size(&self) -> bool {
        match &self.repr {
            Repr::Transparent(src) => src.supports_size(),
            Repr::Decoded(reader) => reader.supports_size(),
        }
    }

    fn read_bytes(&mut self, n: usize) -> Result<Option<bytes::Bytes>> {
        match &mut self.repr {
            Repr::Transparent(src) => src.read_bytes(n),
            Repr::Decoded(reader) => reader.read_bytes(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decompress_block(block: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
        let mut dec = Decompressor::new(SliceReader::new(block.to_vec()), compression)?;
        let mut out = Vec::new();
        dec.read_all(&mut out)?;
        Ok(out)
    }

    const SAMPLE: &[u8] = b"the quick brown fox jumps over the lazy dog, \
                            the quick brown fox jumps over the lazy dog";

    // ---------------------------------------------------------------
    // Round trips per codec
    // ---------------------------------------------------------------

    #[test]
    fn test_roundtrip_all_codecs() {
        for compression in [
            CompressionType::None,
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let block = compress_block(SAMPLE, compression).unwrap();
            let out = decompress_block(&block, compression).unwrap();
            assert_eq!(&out[..], SAMPLE, "codec {:?}", compression);
        }
    }

    #[test]
    fn test_roundtrip_empty() {
        for compression in [
            CompressionType::None,
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let block = compress_block(b"", compression).unwrap();
            let out = decompress_block(&block, compression).unwrap();
            assert!(out.is_empty(), "codec {:?}", compression);
        }
    }

    #[test]
    fn test_compression_shrinks_repetitive_data() {
        let data = vec![b'x'; 16 * 1024];
        for compression in [
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            let block = compress_block(&data, compression).unwrap();
            assert!(block.len() < data.len() / 4, "codec {:?}", compression);
        }
    }

    // ---------------------------------------------------------------
    // Wire byte mapping
    // ---------------------------------------------------------------

    #[test]
    fn test_type_byte_roundtrip() {
        for compression in [
            CompressionType::None,
            CompressionType::Brotli,
            CompressionType::Zstd,
            CompressionType::Snappy,
            CompressionType::Lz4,
        ] {
            assert_eq!(
                CompressionType::from_byte(compression.as_byte()).unwrap(),
                compression
            );
        }
    }

    #[test]
    fn test_unknown_type_byte() {
        let err = CompressionType::from_byte(9).unwrap_err();
        assert!(err.is_data_loss());
        assert_eq!(err.to_string(), "data loss: Unknown compression type: 9");
    }

    // ---------------------------------------------------------------
    // Failure modes
    // ---------------------------------------------------------------

    #[test]
    fn test_missing_size_prefix() {
        let err = Decompressor::new(SliceReader::new(Vec::new()), CompressionType::Zstd)
            .err()
            .unwrap();
        assert!(err.is_data_loss());
        assert!(err.to_string().contains("Reading uncompressed size failed"));
    }

    #[test]
    fn test_declared_size_mismatch() {
        let mut block = compress_block(SAMPLE, CompressionType::Zstd).unwrap();
        // Rewrite the declared size varint (SAMPLE is short, one byte).
        block[0] = block[0].wrapping_add(1);
        let err = Decompressor::new(SliceReader::new(block), CompressionType::Zstd)
            .err()
            .unwrap();
        assert!(err.is_data_loss());
    }

    #[test]
    fn test_corrupt_codec_stream() {
        let mut block = compress_block(SAMPLE, CompressionType::Snappy).unwrap();
        let mid = block.len() / 2;
        block[mid] ^= 0xFF;
        let result = Decompressor::new(SliceReader::new(block), CompressionType::Snappy);
        match result {
            Err(e) => assert!(e.is_data_loss()),
            // A flipped byte may still decompress; then the size check or
            // content diff catches it downstream.
            Ok(mut dec) => {
                let mut out = Vec::new();
                dec.read_all(&mut out).unwrap();
                assert_ne!(out, SAMPLE);
            }
        }
    }

    #[test]
    fn test_transparent_passthrough() {
        let mut dec =
            Decompressor::new(SliceReader::new(SAMPLE.to_vec()), CompressionType::None).unwrap();
        let mut out = Vec::new();
        dec.read_all(&mut out).unwrap();
        assert_eq!(out, SAMPLE);
        dec.verify_end_and_close().unwrap();
    }

    #[test]
    fn test_verify_end_rejects_trailing_bytes() {
        let block = compress_block(SAMPLE, CompressionType::Lz4).unwrap();
        let mut dec = Decompressor::new(SliceReader::new(block), CompressionType::Lz4).unwrap();
        dec.skip(5).unwrap();
        let err = dec.verify_end_and_close().unwrap_err();
        assert!(err.is_data_loss());
    }
}
