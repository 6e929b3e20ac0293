use super::{CONTROL_TAG, PROTOCOL_VERSION};
use crate::scene::{NodeColor, NodeId};
use bytes::{BufMut, Bytes, BytesMut};
use kurbo::{Point, Size, Vec2};

/// Append-only batch builder.
#[derive(Debug, Default)]
pub struct BlobWriter {
    buf: BytesMut,
    /// Offset of the open record's length field.
    open_record: Option<usize>,
}

impl BlobWriter {
    /// Start a batch for `frame`.
    pub fn new(frame: u64) -> Self {
        let mut writer = Self::default();
        writer.write_u8(PROTOCOL_VERSION);
        writer.write_u64(frame);
        writer
    }

    /// Bytes written so far, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Open a node record. Must be closed with [`end_record`](Self::end_record).
    pub fn begin_record(&mut self, type_tag: u8, id: NodeId) {
        debug_assert!(self.open_record.is_none(), "record already open");
        self.write_u8(type_tag);
        self.write_u32(id.0);
        self.open_record = Some(self.buf.len());
        self.write_u32(0);
    }

    /// Close the open record, patching its body length. Returns the body length.
    pub fn end_record(&mut self) -> usize {
        let Some(start) = self.open_record.take() else {
            return 0;
        };
        let body = self.buf.len() - start - 4;
        self.buf[start..start + 4].copy_from_slice(&(body as u32).to_le_bytes());
        body
    }

    /// Body bytes of the open record so far.
    pub fn record_body_len(&self) -> usize {
        self.open_record.map_or(0, |start| self.buf.len() - start - 4)
    }

    /// Drop an open record entirely (used for records with an empty body).
    pub fn discard_record(&mut self) {
        if let Some(start) = self.open_record.take() {
            // type tag (1) + id (4) precede the length field
            self.buf.truncate(start - 5);
        }
    }

    pub fn write_control(&mut self, opcode: u8, id: NodeId) {
        self.write_u8(CONTROL_TAG);
        self.write_u8(opcode);
        self.write_u32(id.0);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    pub fn write_point(&mut self, point: Point) {
        self.write_f64(point.x);
        self.write_f64(point.y);
    }

    pub fn write_vec2(&mut self, vec: Vec2) {
        self.write_f64(vec.x);
        self.write_f64(vec.y);
    }

    pub fn write_size(&mut self, size: Size) {
        self.write_f64(size.width);
        self.write_f64(size.height);
    }

    pub fn write_color(&mut self, color: NodeColor) {
        self.buf.put_slice(&[color.r, color.g, color.b, color.a]);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
    }

    /// Freeze into an immutable buffer for the transport.
    pub fn finish(mut self) -> Bytes {
        self.end_record();
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_is_patched() {
        let mut writer = BlobWriter::new(7);
        writer.begin_record(3, NodeId(42));
        writer.write_u8(9);
        writer.write_f64(1.0);
        assert_eq!(writer.end_record(), 9);

        let bytes = writer.finish();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(&bytes[1..9], &7u64.to_le_bytes());
        assert_eq!(bytes[9], 3);
        assert_eq!(&bytes[10..14], &42u32.to_le_bytes());
        assert_eq!(&bytes[14..18], &9u32.to_le_bytes());
        assert_eq!(bytes.len(), 18 + 9);
    }

    #[test]
    fn test_discard_record() {
        let mut writer = BlobWriter::new(1);
        let header = writer.len();
        writer.begin_record(1, NodeId(2));
        writer.discard_record();
        assert_eq!(writer.len(), header);
    }
}
