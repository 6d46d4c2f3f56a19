// ByteReader - bounds-checked little-endian reads over a borrowed slice
// Used by the file parsers, which always have the whole file in memory.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// A read cursor over a borrowed byte slice.
/// Multi-byte reads are little-endian; reads past the end fail with
/// `UnexpectedEof` instead of panicking.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Length of the underlying slice
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current read position
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the read position to an absolute offset
    pub fn seek(&mut self, pos: usize) -> Result<(), std::io::Error> {
        if pos > self.data.len() {
            return Err(eof());
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the read position by `count` bytes
    pub fn skip(&mut self, count: usize) -> Result<(), std::io::Error> {
        let end = self.pos + count;
        if end > self.data.len() {
            return Err(eof());
        }
        self.pos = end;
        Ok(())
    }

    /// Fill `buf` from the current position
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), std::io::Error> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(eof());
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Borrow `count` bytes from the current position
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], std::io::Error> {
        let end = self.pos + count;
        if end > self.data.len() {
            return Err(eof());
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, std::io::Error> {
        if self.pos >= self.data.len() {
            return Err(eof());
        }
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16, std::io::Error> {
        if self.pos + 2 > self.data.len() {
            return Err(eof());
        }
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let val = cursor.read_u16::<LittleEndian>()?;
        self.pos += 2;
        Ok(val)
    }

    pub fn read_u32(&mut self) -> Result<u32, std::io::Error> {
        if self.pos + 4 > self.data.len() {
            return Err(eof());
        }
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let val = cursor.read_u32::<LittleEndian>()?;
        self.pos += 4;
        Ok(val)
    }

    pub fn read_f32(&mut self) -> Result<f32, std::io::Error> {
        if self.pos + 4 > self.data.len() {
            return Err(eof());
        }
        let mut cursor = Cursor::new(&self.data[self.pos..]);
        let val = cursor.read_f32::<LittleEndian>()?;
        self.pos += 4;
        Ok(val)
    }
}

fn eof() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "ByteReader read past end",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scalars() {
        let data = [0x2A, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x80, 0x3F];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x2A);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_f32().unwrap(), 1.0);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_u16() {
        let data = [0x34, 0x12];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
    }

    #[test]
    fn test_read_past_end() {
        let data = [1, 2, 3];
        let mut r = ByteReader::new(&data);
        assert!(r.read_u32().is_err());
        assert_eq!(r.pos(), 0);
        assert_eq!(r.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_seek_and_skip() {
        let data = [0, 1, 2, 3, 4, 5];
        let mut r = ByteReader::new(&data);
        r.seek(4).unwrap();
        assert_eq!(r.read_u8().unwrap(), 4);
        r.seek(0).unwrap();
        r.skip(2).unwrap();
        assert_eq!(r.read_u8().unwrap(), 2);
        assert!(r.seek(7).is_err());
        assert!(r.skip(10).is_err());
    }

    #[test]
    fn test_read_bytes_borrows() {
        let data = [9, 8, 7, 6];
        let mut r = ByteReader::new(&data);
        let head = r.read_bytes(2).unwrap();
        assert_eq!(head, &[9, 8]);
        assert_eq!(r.read_bytes(2).unwrap(), &[7, 6]);
        assert!(r.read_bytes(1).is_err());
        // the borrow outlives the reader
        drop(r);
        assert_eq!(head, &[9, 8]);
    }

    #[test]
    fn test_read_exact() {
        let data = [1, 2, 3, 4];
        let mut r = ByteReader::new(&data);
        let mut buf = [0u8; 3];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert!(r.read_exact(&mut buf).is_err());
    }
}
