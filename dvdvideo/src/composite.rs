//! A series of files presented as one seekable byte source.
//!
//! A title set's video is split across up to nine `VTS_nn_k.VOB` fragments
//! of at most 1 GB each; sector addresses in the IFO metadata span all of
//! them as if they were concatenated. `CompositeFile` provides that view
//! with at most one OS file handle open at a time.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

#[derive(Debug, Clone)]
struct Fragment {
    /// Cumulative end offset: the first linear offset past this fragment.
    end: u64,
    path: PathBuf,
}

#[derive(Debug)]
pub struct CompositeFile {
    map: Vec<Fragment>,
    handle: Option<File>,
    fileno: usize,
    /// Linear offset across all fragments.
    off: u64,
    /// End offset of the currently open fragment.
    next_off: u64,
    closed: bool,
}

impl CompositeFile {
    /// Build a composite from an ordered list of paths. Empty files and
    /// anything that is not a regular file are silently dropped. The
    /// composite starts closed.
    pub fn from_paths<I>(paths: I) -> CompositeFile
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut map = Vec::new();
        let mut off = 0;
        for path in paths {
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            if meta.is_file() && meta.len() > 0 {
                off += meta.len();
                map.push(Fragment { end: off, path });
            }
        }
        CompositeFile {
            map,
            handle: None,
            fileno: 0,
            off: 0,
            next_off: 0,
            closed: true,
        }
    }

    /// A fresh composite over the same fragments, with its own handle state.
    pub fn clone_of(&self) -> CompositeFile {
        CompositeFile {
            map: self.map.clone(),
            handle: None,
            fileno: 0,
            off: 0,
            next_off: 0,
            closed: true,
        }
    }

    /// Open the first fragment and position the linear offset at 0.
    /// A composite with no fragments stays closed.
    pub fn open(&mut self) -> io::Result<()> {
        if !self.closed {
            return Ok(());
        }
        self.off = 0;
        if let Some(first) = self.map.first() {
            self.handle = Some(File::open(&first.path)?);
            self.fileno = 0;
            self.next_off = first.end;
            self.closed = false;
        }
        Ok(())
    }

    /// Release the open handle. Idempotent.
    pub fn close(&mut self) {
        self.handle = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total size: the sum of all fragment sizes.
    pub fn size(&self) -> u64 {
        self.map.last().map(|f| f.end).unwrap_or(0)
    }

    /// The current linear offset.
    pub fn tell(&self) -> u64 {
        self.off
    }

    /// Close the current fragment and open the one after it, or close the
    /// composite when the last fragment is exhausted.
    fn next_fragment(&mut self) -> io::Result<()> {
        self.fileno += 1;
        match self.map.get(self.fileno) {
            Some(frag) => {
                self.handle = Some(File::open(&frag.path)?);
                self.next_off = frag.end;
            }
            None => self.close(),
        }
        Ok(())
    }
}

impl Read for CompositeFile {
    /// Reads cross fragment boundaries; the buffer comes back full unless
    /// the composite's end is reached. After `close` reads yield 0 bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() && !self.closed {
            if self.off == self.next_off {
                self.next_fragment()?;
                continue;
            }
            let handle = self.handle.as_mut().expect("open composite has a handle");
            let want = buf.len().min(filled + (self.next_off - self.off) as usize);
            let n = handle.read(&mut buf[filled..want])?;
            if n == 0 {
                // Fragment shorter on disk than when the map was built.
                self.close();
                break;
            }
            filled += n;
            self.off += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for CompositeFile {
    /// The resolved offset must land strictly inside the composite, so
    /// `SeekFrom::End` is only meaningful with a negative delta. Seeking a
    /// closed composite fails.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "seek on a closed composite file",
            ));
        }
        let size = self.size() as i128;
        let target = match pos {
            SeekFrom::Start(off) => off as i128,
            SeekFrom::Current(delta) => self.off as i128 + i128::from(delta),
            SeekFrom::End(delta) => size + i128::from(delta),
        };
        if target < 0 || target >= size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek beyond the bounds of the composite file",
            ));
        }
        let target = target as u64;

        // Locate the fragment holding the target offset.
        let mut start = 0;
        let mut fileno = 0;
        for frag in &self.map {
            if frag.end > target {
                break;
            }
            start = frag.end;
            fileno += 1;
        }

        if fileno != self.fileno || self.handle.is_none() {
            self.handle = Some(File::open(&self.map[fileno].path)?);
            self.fileno = fileno;
        }
        self.next_off = self.map[fileno].end;
        self.handle
            .as_mut()
            .expect("handle was just opened")
            .seek(SeekFrom::Start(target - start))?;
        self.off = target;
        Ok(self.off)
    }
}
