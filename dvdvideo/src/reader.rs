//! Big-endian reads over an IFO byte source.
//!
//! Every multi-byte integer in an IFO file is big-endian, and most tables
//! are addressed by sector number rather than byte offset.

use std::io::{self, Read, Seek, SeekFrom};

use crate::{DvdError, Result, DVD_BLOCK_LEN};

pub struct IfoReader<R> {
    inner: R,
    sector_base: u32,
}

impl<R: Read + Seek> IfoReader<R> {
    pub fn new(inner: R) -> IfoReader<R> {
        IfoReader {
            inner,
            sector_base: 0,
        }
    }

    /// A reader whose sector addresses are relative to `sector_base` rather
    /// than the start of the byte source.
    pub fn with_sector_base(inner: R, sector_base: u32) -> IfoReader<R> {
        IfoReader { inner, sector_base }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn skip(&mut self, delta: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(delta))?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn sector_seek(&mut self, sector: u32) -> Result<()> {
        self.sector_seek_at(sector, 0)
    }

    pub fn sector_seek_at(&mut self, sector: u32, offset: u64) -> Result<()> {
        let base = u64::from(sector - self.sector_base) * DVD_BLOCK_LEN;
        self.seek(base + offset)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                DvdError::format("unexpected end of IFO data")
            } else {
                DvdError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_big_endian_integers() {
        let mut r = IfoReader::new(Cursor::new(vec![0x12, 0x34, 0x56, 0x78, 0x9A]));
        assert_eq!(r.read_u8().unwrap(), 0x12);
        assert_eq!(r.read_u16().unwrap(), 0x3456);
        r.seek(1).unwrap();
        assert_eq!(r.read_u32().unwrap(), 0x3456789A);
    }

    #[test]
    fn short_read_is_a_format_error() {
        let mut r = IfoReader::new(Cursor::new(vec![0x12]));
        assert!(matches!(r.read_u32(), Err(DvdError::Format(_))));
    }

    #[test]
    fn sector_seek_honors_base() {
        let mut data = vec![0u8; 3 * DVD_BLOCK_LEN as usize];
        data[2 * DVD_BLOCK_LEN as usize] = 0xAB;
        let mut r = IfoReader::with_sector_base(Cursor::new(data), 1);
        r.sector_seek(3).unwrap();
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        r.sector_seek_at(2, 1).unwrap();
        assert_eq!(r.tell().unwrap(), DVD_BLOCK_LEN + 1);
    }

    #[test]
    fn skip_moves_relative() {
        let mut r = IfoReader::new(Cursor::new(vec![0u8; 16]));
        r.seek(4).unwrap();
        r.skip(3).unwrap();
        assert_eq!(r.tell().unwrap(), 7);
        r.skip(-7).unwrap();
        assert_eq!(r.tell().unwrap(), 0);
    }
}
