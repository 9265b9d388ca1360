//! A prepend-oriented byte sink.

use bytes::Bytes;
use sheaf_core::varint;

/// A byte sink that grows at the front.
///
/// Length-delimited framing wants the length written *before* content whose
/// size is only known *after* it is produced. Building the bytes back to
/// front makes that natural: write the content, prepend its length, prepend
/// the tag, repeat for each enclosing envelope.
///
/// Internally the bytes are stored reversed so every prepend is an append;
/// [`into_bytes`](BackwardWriter::into_bytes) un-reverses once at the end.
#[derive(Debug, Default)]
pub struct BackwardWriter {
    /// Output bytes, stored in reverse order.
    rev: Vec<u8>,
}

impl BackwardWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rev: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.rev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rev.is_empty()
    }

    /// Inserts `bytes` before everything written so far.
    pub fn prepend(&mut self, bytes: &[u8]) {
        self.rev.extend(bytes.iter().rev());
    }

    /// Inserts a varint before everything written so far.
    pub fn prepend_varint(&mut self, value: u64) {
        let mut scratch = [0u8; varint::MAX_VARINT_LEN];
        let mut cursor = &mut scratch[..];
        varint::encode_varint_u64(&mut cursor, value);
        let written = varint::MAX_VARINT_LEN - cursor.len();
        self.prepend(&scratch[..written]);
    }

    /// The accumulated bytes, front to back.
    pub fn into_bytes(mut self) -> Bytes {
        self.rev.reverse();
        Bytes::from(self.rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_order() {
        let mut writer = BackwardWriter::new();
        writer.prepend(b"world");
        writer.prepend(b" ");
        writer.prepend(b"hello");
        assert_eq!(writer.len(), 11);
        assert_eq!(writer.into_bytes(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_prepend_varint() {
        let mut writer = BackwardWriter::new();
        writer.prepend(b"abc");
        writer.prepend_varint(3);
        writer.prepend_varint(150);
        assert_eq!(
            writer.into_bytes(),
            Bytes::from_static(&[0x96, 0x01, 0x03, b'a', b'b', b'c'])
        );
    }

    #[test]
    fn test_envelope_framing() {
        // tag 1|LEN wrapping tag 2|LEN wrapping "hi".
        let mut writer = BackwardWriter::new();
        writer.prepend(b"hi");
        writer.prepend_varint(2);
        writer.prepend_varint(0x12); // field 2, wire type 2
        let inner_len = writer.len() as u64;
        writer.prepend_varint(inner_len);
        writer.prepend_varint(0x0A); // field 1, wire type 2
        assert_eq!(
            writer.into_bytes(),
            Bytes::from_static(&[0x0A, 0x04, 0x12, 0x02, b'h', b'i'])
        );
    }
}
