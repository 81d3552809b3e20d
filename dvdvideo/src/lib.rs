//! Read titles out of a DVD-Video `VIDEO_TS` tree and stream each one as a
//! single linear MPEG program stream.
//!
//! A DVD scatters one title across several `VTS_nn_k.VOB` fragments, in an
//! order described by the program chains of the title set's IFO file, with
//! multi-angle material physically interleaved. This crate parses the IFO
//! metadata, resolves interleaved units down to the first angle, and exposes
//! each title as a seekable byte stream backed by the VOB fragments.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod attrs;
pub mod composite;
pub mod folder;
pub mod ifo;
pub mod ilvu;
pub mod reader;
pub mod stream;
pub mod time;
pub mod virtual_dvd;

pub use attrs::{AudioAttributes, AvAttributes, VideoAttributes};
pub use composite::CompositeFile;
pub use folder::{DvdFolder, Title};
pub use ifo::{PgcInfo, TitleInfo, VmgIfo, VtsIfo};
pub use stream::{SectorRange, TitleStream};
pub use time::PlaybackTime;
pub use virtual_dvd::{DvdFolderCache, FileEntry, NoSidecar, Options, SidecarMetadata, VirtualDvd};

/// Size of one DVD sector in bytes.
pub const DVD_BLOCK_LEN: u64 = 2048;

#[derive(Debug, Error)]
pub enum DvdError {
    /// The path is not a DVD-Video tree at all. Distinct from a malformed
    /// disc so callers scanning a filesystem can skip quietly.
    #[error("no VIDEO_TS located in {}", .0.display())]
    NotDvd(PathBuf),

    /// Malformed IFO data: bad magic, short read, or an invariant violation.
    /// The message names the title set and program chain where that applies.
    #[error("{0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DvdError {
    pub(crate) fn format(msg: impl Into<String>) -> DvdError {
        DvdError::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DvdError>;

/// Look up `dosname` within `path`, matching case-insensitively the way a
/// DVD drive's filesystem would. Returns the entry's real path.
pub fn find_dos_filename(path: &Path, dosname: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(path).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().to_uppercase() == dosname {
            return Some(path.join(name));
        }
    }
    None
}
