//! Error Types for Sheaf
//!
//! This module defines the error type shared by every sheaf crate.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - `Io`: propagated verbatim from the underlying byte source. These are
//!   *not* recoverable by the reader's recovery machinery - the source has
//!   to be repaired first.
//!
//! ### Data Integrity Errors
//! - `DataLoss`: corruption detected - a hash mismatch, an impossible chunk
//!   length, a malformed varint, a failed decompression, a malformed
//!   transposed encoding, or a message that fails to parse. Everything that
//!   `RecordReader::recover` can skip past reports this kind.
//!
//! ### Caller Errors
//! - `InvalidArgument`: the caller violated a precondition, e.g. asked for
//!   file metadata after records were already read, or seeked backwards on a
//!   forward-only reader.
//!
//! ### Library Bugs
//! - `Internal`: an invariant the library promised to uphold was broken.
//!   Reaching a user means sheaf itself is buggy.
//!
//! ## Usage
//! All fallible sheaf functions return `Result<T>`, aliased to
//! `Result<T, Error>`, so `?` propagates everywhere. Clean end-of-stream is
//! never an error: APIs signal it with `Ok(None)` or `Ok(false)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data loss: {0}")]
    DataLoss(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Corruption detected in the stream.
    pub fn data_loss(message: impl Into<String>) -> Self {
        Error::DataLoss(message.into())
    }

    /// The caller violated a documented precondition.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// A broken library invariant.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// True for corruption-kind errors (the ones recovery can skip past).
    pub fn is_data_loss(&self) -> bool {
        matches!(self, Error::DataLoss(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
