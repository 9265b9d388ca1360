//! Shared fixtures for the integration tests.

use bytes::Bytes;
use sheaf_storage::{
    CompressionType, RecordReader, RecordWriter, RecordWriterOptions, SliceReader,
};

/// A little structured record type for typed-read and projection tests.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TestEvent {
    #[prost(uint64, tag = "1")]
    pub id: u64,

    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,

    #[prost(bytes = "vec", tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}

impl TestEvent {
    pub fn sample(i: u64) -> Self {
        Self {
            id: i,
            name: format!("event-{}", i),
            payload: vec![i as u8; (i % 7) as usize],
        }
    }
}

/// Writes `records` as one file with the given options.
pub fn build_file(records: &[&[u8]], options: RecordWriterOptions) -> Bytes {
    let mut writer = RecordWriter::new(options).unwrap();
    for record in records {
        writer.write_record(Bytes::copy_from_slice(record)).unwrap();
    }
    writer.finish().unwrap()
}

/// Writes `records` uncompressed, one data chunk, and returns the file.
pub fn simple_file(records: &[&[u8]]) -> Bytes {
    build_file(
        records,
        RecordWriterOptions {
            compression: CompressionType::None,
            ..Default::default()
        },
    )
}

/// Opens a reader over in-memory file bytes.
pub fn open(bytes: &Bytes) -> RecordReader<SliceReader> {
    RecordReader::new(SliceReader::new(bytes.clone()))
}

/// Reads every remaining record with its position.
pub fn drain(reader: &mut RecordReader<SliceReader>) -> Vec<(sheaf_storage::RecordPosition, Bytes)> {
    let mut out = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        out.push((reader.last_pos().unwrap(), record));
    }
    out
}
