use super::CodecError;
use crate::scene::{NodeColor, NodeId};
use kurbo::{Point, Size, Vec2};

/// Bounds-checked cursor over a received batch.
#[derive(Debug, Clone)]
pub struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Split off the next `n` bytes as their own reader.
    pub fn take(&mut self, n: usize) -> Result<BlobReader<'a>, CodecError> {
        Ok(BlobReader::new(self.bytes(n)?))
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub fn read_id(&mut self) -> Result<NodeId, CodecError> {
        Ok(NodeId(self.read_u32()?))
    }

    pub fn read_point(&mut self) -> Result<Point, CodecError> {
        Ok(Point::new(self.read_f64()?, self.read_f64()?))
    }

    pub fn read_vec2(&mut self) -> Result<Vec2, CodecError> {
        Ok(Vec2::new(self.read_f64()?, self.read_f64()?))
    }

    pub fn read_size(&mut self) -> Result<Size, CodecError> {
        Ok(Size::new(self.read_f64()?, self.read_f64()?))
    }

    pub fn read_color(&mut self) -> Result<NodeColor, CodecError> {
        let [r, g, b, a] = self.array()?;
        Ok(NodeColor::new(r, g, b, a))
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BlobWriter;

    #[test]
    fn test_truncated_read() {
        let mut reader = BlobReader::new(&[1, 2]);
        assert_eq!(
            reader.read_u32(),
            Err(CodecError::Truncated { needed: 4, remaining: 2 })
        );
        // A failed read consumes nothing.
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        let mut reader = BlobReader::new(&data);
        assert_eq!(reader.read_str(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_take_limits_sub_reader() {
        let mut writer = BlobWriter::new(0);
        writer.write_str("brush.png");
        writer.write_f64(3.5);
        let bytes = writer.finish();

        let mut reader = BlobReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), crate::codec::PROTOCOL_VERSION);
        assert_eq!(reader.read_u64().unwrap(), 0);
        let mut head = reader.take(4 + 9).unwrap();
        assert_eq!(head.read_str().unwrap(), "brush.png");
        assert!(head.read_u8().is_err());
        assert_eq!(reader.read_f64().unwrap(), 3.5);
        assert!(reader.is_empty());
    }
}
