//! Pull-based byte sources.
//!
//! Everything above the framing layer reads through the [`ByteReader`]
//! contract: a logical position plus a *fragment* - the contiguous byte
//! window the source currently exposes. Callers peek the fragment without
//! copying, `consume` what they used, and `pull` when they need more.
//!
//! Four adapters cover the usual sources:
//! - [`SliceReader`] over contiguous [`bytes::Bytes`] (full random access)
//! - [`ChainReader`] over a [`Chain`] rope of blocks (full random access)
//! - [`BufReader`] over any [`bytes::Buf`] (forward-only)
//! - [`BufferedReader`] over any [`std::io::Read`] (forward-only)
//!
//! When a caller demands more contiguous bytes than a fragmented source
//! naturally exposes, the reader bridges block boundaries through a
//! [`Scratch`] buffer; see that type for the invariants.

mod backward;
mod buf;
mod buffered;
mod chain;
mod chain_reader;
mod reader;
mod scratch;
mod slice;

pub use backward::BackwardWriter;
pub use buf::BufReader;
pub use buffered::BufferedReader;
pub use chain::Chain;
pub use chain_reader::ChainReader;
pub use reader::ByteReader;
pub use slice::SliceReader;

pub(crate) use scratch::Scratch;
