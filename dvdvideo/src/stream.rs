//! A title's sectors as one linear, seekable stream.
//!
//! The program chain lists its cells as disk-order sector ranges over the
//! title set's VOB composite. `TitleStream` lays a sector map on top so the
//! ranges read back-to-back, in playback order, as a single virtual file.

use std::io::{self, Read, Seek, SeekFrom};

use crate::composite::CompositeFile;
use crate::DVD_BLOCK_LEN;

/// An inclusive range of sectors on a title set's VOB composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRange {
    pub start: u32,
    pub end: u32,
}

impl SectorRange {
    pub fn sectors(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }
}

/// Append `[start, end]` to an ordered sector list, extending the last
/// range in place when the new one touches it.
pub(crate) fn push_coalesced(list: &mut Vec<SectorRange>, start: u32, end: u32) {
    if let Some(last) = list.last_mut() {
        if last.end + 1 == start {
            last.end = end;
            return;
        }
    }
    list.push(SectorRange { start, end });
}

#[derive(Debug, Clone, Copy)]
struct MapEntry {
    /// Cumulative virtual end offset of this range.
    virt_end: u64,
    /// Byte offset of the range's first sector on the composite.
    real: u64,
}

pub struct TitleStream {
    cfile: CompositeFile,
    slist: Vec<SectorRange>,
    sects: u64,
    map: Option<Vec<MapEntry>>,
    srange: usize,
    off: u64,
    /// Virtual end offset of the current map entry.
    next_off: u64,
    closed: bool,
}

impl TitleStream {
    /// A stream over `cfile` with an empty sector list.
    pub fn new(cfile: CompositeFile) -> TitleStream {
        TitleStream {
            cfile,
            slist: Vec::new(),
            sects: 0,
            map: None,
            srange: 0,
            off: 0,
            next_off: 0,
            closed: false,
        }
    }

    /// A stream preloaded with an existing sector list.
    pub fn with_sectors<I>(cfile: CompositeFile, sectors: I) -> TitleStream
    where
        I: IntoIterator<Item = SectorRange>,
    {
        let mut ts = TitleStream::new(cfile);
        for range in sectors {
            ts.add_sectors(range.start, range.end);
        }
        ts
    }

    /// A fresh stream over the same composite and sector list, with its own
    /// position and handle state.
    pub fn clone_of(&self) -> TitleStream {
        TitleStream {
            cfile: self.cfile.clone_of(),
            slist: self.slist.clone(),
            sects: self.sects,
            map: None,
            srange: 0,
            off: 0,
            next_off: 0,
            closed: false,
        }
    }

    /// Append the inclusive sector range `[start, end]`, coalescing with the
    /// previous range when they touch. Invalidates the sector map.
    pub fn add_sectors(&mut self, start: u32, end: u32) {
        self.sects += u64::from(end - start) + 1;
        push_coalesced(&mut self.slist, start, end);
        self.map = None;
    }

    pub fn sector_list(&self) -> &[SectorRange] {
        &self.slist
    }

    /// Virtual size: every listed sector, at one DVD block each.
    pub fn size(&self) -> u64 {
        self.sects * DVD_BLOCK_LEN
    }

    /// Current virtual offset.
    pub fn tell(&self) -> u64 {
        self.off
    }

    /// The underlying composite's linear offset.
    pub fn tell_real(&self) -> u64 {
        self.cfile.tell()
    }

    pub fn close(&mut self) {
        self.cfile.close();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Build the sector map and position at virtual offset 0.
    fn ensure_map(&mut self) -> io::Result<()> {
        if self.map.is_some() {
            return Ok(());
        }
        let mut map = Vec::with_capacity(self.slist.len());
        let mut virt = 0;
        for range in &self.slist {
            virt += range.sectors() * DVD_BLOCK_LEN;
            map.push(MapEntry {
                virt_end: virt,
                real: u64::from(range.start) * DVD_BLOCK_LEN,
            });
        }
        let first = map.first().copied();
        self.map = Some(map);
        self.off = 0;
        self.srange = 0;
        match first {
            Some(entry) => {
                self.cfile.open()?;
                self.cfile.seek(SeekFrom::Start(entry.real))?;
                self.next_off = entry.virt_end;
            }
            None => self.close(),
        }
        Ok(())
    }

    /// Advance to the next mapped range, or close at the end of the list.
    fn next_range(&mut self) -> io::Result<()> {
        self.srange += 1;
        let entry = self
            .map
            .as_ref()
            .expect("map built before advancing")
            .get(self.srange)
            .copied();
        match entry {
            Some(entry) => {
                self.cfile.seek(SeekFrom::Start(entry.real))?;
                self.next_off = entry.virt_end;
            }
            None => self.close(),
        }
        Ok(())
    }
}

impl Read for TitleStream {
    /// Bytes come back in virtual-offset order with no gaps; a read that
    /// spans ranges seeks the composite between them. After the last mapped
    /// byte, and after `close`, reads yield 0 bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }
        self.ensure_map()?;
        let mut filled = 0;
        while filled < buf.len() && !self.closed {
            if self.off == self.next_off {
                self.next_range()?;
                continue;
            }
            let want = buf.len().min(filled + (self.next_off - self.off) as usize);
            let n = self.cfile.read(&mut buf[filled..want])?;
            if n == 0 {
                // The VOBs end before the sector list says they should.
                self.close();
                break;
            }
            filled += n;
            self.off += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for TitleStream {
    /// The resolved offset must land strictly inside the virtual file.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "seek on a closed title stream",
            ));
        }
        self.ensure_map()?;
        let size = self.size() as i128;
        let target = match pos {
            SeekFrom::Start(off) => off as i128,
            SeekFrom::Current(delta) => self.off as i128 + i128::from(delta),
            SeekFrom::End(delta) => size + i128::from(delta),
        };
        if target < 0 || target >= size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond the bounds of the title stream",
            ));
        }
        let target = target as u64;

        let map = self.map.as_ref().expect("map built above");
        let mut range_start = 0;
        let mut srange = 0;
        for entry in map {
            if entry.virt_end > target {
                break;
            }
            range_start = entry.virt_end;
            srange += 1;
        }
        let entry = map[srange];

        self.cfile
            .seek(SeekFrom::Start(entry.real + (target - range_start)))?;
        self.srange = srange;
        self.next_off = entry.virt_end;
        self.off = target;
        Ok(self.off)
    }
}
