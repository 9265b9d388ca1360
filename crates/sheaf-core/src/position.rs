//! Record Positions
//!
//! This module defines how sheaf addresses records inside a file.
//!
//! ## RecordPosition
//! A record is identified by the byte position of the chunk that holds it
//! (`chunk_begin`) plus its index within that chunk (`record_index`).
//! Positions order exactly like the records themselves: first by chunk, then
//! by index.
//!
//! ## Numeric projection
//! `numeric()` folds a position into a single monotonic integer,
//! `chunk_begin + record_index`. The chunk header guarantees
//! `num_records <= chunk size in bytes`, so the projection never collides
//! with the next chunk and can be fed back into a byte-position-style seek.
//!
//! ## SkippedRegion
//! When recovery skips corrupt bytes, the caller is told exactly which
//! half-open interval `[begin, end)` of the stream was bypassed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a record inside a sheaf file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordPosition {
    /// Byte position of the chunk containing the record.
    pub chunk_begin: u64,

    /// Index of the record within its chunk.
    pub record_index: u64,
}

impl RecordPosition {
    pub fn new(chunk_begin: u64, record_index: u64) -> Self {
        Self {
            chunk_begin,
            record_index,
        }
    }

    /// Monotonic integer form, usable for byte-position-style seeks.
    pub fn numeric(&self) -> u64 {
        self.chunk_begin + self.record_index
    }
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chunk_begin, self.record_index)
    }
}

/// Half-open byte interval `[begin, end)` bypassed by recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRegion {
    /// First byte position of the skipped region.
    pub begin: u64,

    /// First byte position after the skipped region.
    pub end: u64,
}

impl SkippedRegion {
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin <= end, "skipped region ends before it begins");
        Self { begin, end }
    }

    /// Number of bytes skipped.
    pub fn length(&self) -> u64 {
        self.end - self.begin
    }
}

impl fmt::Display for SkippedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}
