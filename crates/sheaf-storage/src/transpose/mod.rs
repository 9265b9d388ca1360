//! Transposed (columnar) record encoding.
//!
//! A transposed chunk stores structured records field by field instead of
//! record by record: every field's values land in a per-field byte stream,
//! streams are grouped into *buckets* that share a compressed block, and a
//! *state machine* records how field occurrences and record boundaries
//! interleave. Similar values compress together far better than interleaved
//! records do.
//!
//! ## Chunk data layout
//!
//! ```text
//! [compression: u8]
//! [num_buckets: varint][bucket_data_size: varint × num_buckets]
//! [num_nodes: varint]
//! node:
//!   kind 0 (field):         [bucket: varint][path_len: varint][tag: varint × path_len]
//!   kind 1 (finish record)
//! [num_transitions: varint][node index: varint × num_transitions]
//! [bucket streams…]          each in compressed-block framing
//! ```
//!
//! A field node's path is a chain of protobuf tags; every tag before the
//! last names a length-delimited submessage field, and the last tag's wire
//! type says how values are drawn from the bucket stream. Decoding walks the
//! transitions in order, pulling one value per field occurrence and closing
//! a record at every finish-record transition; reconstructed records are
//! byte-for-byte valid wire format.
//!
//! [`FieldProjection`] restricts which fields are materialized; everything
//! else is skipped in its stream without being copied out.

mod decode;
mod encode;
mod projection;

pub use projection::{FieldPath, FieldProjection, Selector};

pub(crate) use decode::decode_chunk;
pub(crate) use encode::TransposeEncoder;

/// Protobuf wire types a transposed field may carry.
pub(crate) const WIRE_VARINT: u32 = 0;
pub(crate) const WIRE_FIXED64: u32 = 1;
pub(crate) const WIRE_LEN_DELIMITED: u32 = 2;
pub(crate) const WIRE_FIXED32: u32 = 5;

/// Nesting deeper than this is rejected as corrupt.
pub(crate) const MAX_PATH_DEPTH: usize = 16;
