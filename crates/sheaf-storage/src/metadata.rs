//! File metadata.
//!
//! A file may carry a `FileMetadata` chunk right after the signature,
//! holding one serialized [`RecordsMetadata`] message. It describes what the
//! records are - typically the fully-qualified name of their message type
//! and the serialized file descriptors that define it. The reader treats the
//! descriptors as opaque bytes; building descriptor pools is a consumer
//! concern.

/// Metadata describing the records of a file.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordsMetadata {
    /// Fully-qualified message type name of the records, if any.
    #[prost(string, tag = "1")]
    pub record_type_name: ::prost::alloc::string::String,

    /// Serialized `FileDescriptorProto`s defining the record type.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub file_descriptor: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

impl RecordsMetadata {
    /// Whether any metadata was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.record_type_name.is_empty() && self.file_descriptor.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_default_is_empty() {
        assert!(RecordsMetadata::default().is_empty());
    }

    #[test]
    fn test_roundtrip() {
        let metadata = RecordsMetadata {
            record_type_name: "acme.Event".to_string(),
            file_descriptor: vec![vec![1, 2, 3]],
        };
        let bytes = metadata.encode_to_vec();
        let decoded = RecordsMetadata::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, metadata);
        assert!(!decoded.is_empty());
    }
}
