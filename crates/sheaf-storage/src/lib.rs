//! Sheaf Storage Layer
//!
//! This crate implements the sheaf container file format - a sequence of
//! checksummed, compressed chunks, each holding a batch of records - and the
//! reader pipeline that turns a byte stream back into ordered records.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │  byte source │  Bytes / Chain / any Buf / any io::Read
//! └──────┬───────┘
//!        │ ByteReader (pull-based fragments)
//!        ▼
//! ┌──────────────┐
//! │ ChunkReader  │  framing: 40-byte headers, hashes, padding, recovery
//! └──────┬───────┘
//!        │ Chunk { header, data }
//!        ▼
//! ┌──────────────┐
//! │ ChunkDecoder │  simple or transposed record layout, Decompressor
//! └──────┬───────┘
//!        │ indexed records
//!        ▼
//! ┌──────────────┐
//! │ RecordReader │  positions, metadata bootstrap, skip-and-recover
//! └──────────────┘
//! ```
//!
//! ## Main Components
//!
//! ### RecordReader
//! The front door for reading: yields records in file order together with
//! their [`RecordPosition`], seeks by position or by record locator, and can
//! skip past corruption, reporting the bypassed bytes as a
//! [`SkippedRegion`].
//!
//! ### RecordWriter
//! The matching builder: emits the signature chunk, optional file metadata,
//! simple or transposed data chunks, and block-alignment padding.
//!
//! ### ByteReader and adapters
//! A pull-based, zero-copy-preferring byte source contract
//! ([`byteio::ByteReader`]) with adapters for contiguous bytes
//! ([`byteio::SliceReader`]), a rope of blocks ([`byteio::ChainReader`]),
//! any [`bytes::Buf`] ([`byteio::BufReader`]), and any [`std::io::Read`]
//! ([`byteio::BufferedReader`]).
//!
//! ## Data Integrity
//!
//! Every chunk header and every chunk body carries a CRC32; corruption is
//! reported as [`Error::DataLoss`] and the reader can resynchronize on the
//! next plausible chunk boundary without losing the rest of the stream.

pub mod byteio;
pub mod chunk;
pub mod chunk_decoder;
pub mod chunk_reader;
pub mod compress;
pub mod metadata;
pub mod record_reader;
pub mod record_writer;
pub mod transpose;

pub use sheaf_core::{Error, RecordPosition, Result, SkippedRegion};

pub use byteio::{BufReader, BufferedReader, ByteReader, Chain, ChainReader, SliceReader};
pub use chunk::{Chunk, ChunkHeader, ChunkType, BLOCK_SIZE, HEADER_SIZE};
pub use chunk_decoder::ChunkDecoder;
pub use chunk_reader::ChunkReader;
pub use compress::{CompressionType, Decompressor};
pub use metadata::RecordsMetadata;
pub use record_reader::{RecordReader, RecordReaderOptions};
pub use record_writer::{RecordWriter, RecordWriterOptions};
pub use transpose::FieldProjection;
