pub mod error;
pub mod position;
pub mod varint;

pub use error::{Error, Result};
pub use position::{RecordPosition, SkippedRegion};
