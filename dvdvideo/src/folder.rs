//! Discover a `VIDEO_TS` tree and assemble its titles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::attrs::{AudioAttributes, AudioCoding};
use crate::ifo::{VmgIfo, VtsIfo};
use crate::stream::TitleStream;
use crate::time::PlaybackTime;
use crate::{find_dos_filename, DvdError, PgcInfo, Result};

/// One playable title: a VMG title record resolved to its title set and
/// entry program chain.
#[derive(Debug, Clone)]
pub struct Title {
    number: u16,
    vts: Arc<VtsIfo>,
    vts_number: u8,
    pgc_number: u8,
    audio_streams: Vec<AudioAttributes>,
}

impl Title {
    fn new(number: u16, vmg: &VmgIfo, vts_list: &[Arc<VtsIfo>]) -> Result<Title> {
        let tinfo = vmg
            .title_info(number)
            .ok_or_else(|| DvdError::format(format!("no title number {number}")))?;

        let vts = usize::from(tinfo.vts_num)
            .checked_sub(1)
            .and_then(|i| vts_list.get(i))
            .ok_or_else(|| {
                DvdError::format(format!(
                    "title number: {number} - VTS {} is out of range ({})",
                    tinfo.vts_num,
                    vts_list.len()
                ))
            })?
            .clone();

        let pgc = vts.pgc(u16::from(tinfo.vts_pgc_num)).ok_or_else(|| {
            DvdError::format(format!(
                "title number: {number} - PGC number {} in VTS {} is out of range ({})",
                tinfo.vts_pgc_num,
                tinfo.vts_num,
                vts.num_pgcs()
            ))
        })?;

        // Project the chain's stream indices through the title set's audio
        // attribute table.
        let audio_table = vts.title_attrs().audio_list();
        let mut audio_streams = Vec::with_capacity(pgc.audio_stream_nums.len());
        for &num in &pgc.audio_stream_nums {
            match audio_table.get(usize::from(num)) {
                Some(attrs) => audio_streams.push(*attrs),
                None => warn!(
                    "title {number}: audio stream {num} is not in the VTS {} audio table",
                    tinfo.vts_num
                ),
            }
        }

        Ok(Title {
            number,
            vts_number: tinfo.vts_num,
            pgc_number: tinfo.vts_pgc_num,
            vts,
            audio_streams,
        })
    }

    /// 1-based title number on the disc.
    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn vts(&self) -> &VtsIfo {
        &self.vts
    }

    pub fn vts_number(&self) -> u8 {
        self.vts_number
    }

    pub fn pgc_number(&self) -> u8 {
        self.pgc_number
    }

    pub fn pgc(&self) -> &PgcInfo {
        self.vts
            .pgc(u16::from(self.pgc_number))
            .expect("title construction verified the PGC exists")
    }

    pub fn time(&self) -> PlaybackTime {
        self.pgc().playtime
    }

    /// Size of the title's stream in bytes; always a whole number of
    /// DVD sectors.
    pub fn size(&self) -> u64 {
        self.pgc()
            .sectors
            .iter()
            .map(|r| r.sectors() * crate::DVD_BLOCK_LEN)
            .sum()
    }

    pub fn has_angles(&self) -> bool {
        self.pgc().angles
    }

    pub fn has_interleaved(&self) -> bool {
        self.pgc().ilvu
    }

    pub fn audio_streams(&self) -> &[AudioAttributes] {
        &self.audio_streams
    }

    /// Pick an audio stream id from a preference list like `"en:6,en:*"`,
    /// where each entry is a language code (or `*`) and a channel count
    /// (or `*`). Only plain AC3 streams qualify. Falls back to the first
    /// stream when nothing matches.
    pub fn find_best_audio_stream_id(&self, preferences: &str) -> Option<u8> {
        for part in preferences.split(',') {
            let Some((lang, chan)) = part.split_once(':') else {
                continue;
            };
            for stream in &self.audio_streams {
                if audio_attr_matches(stream, lang, chan) {
                    return Some(stream.stream_id());
                }
            }
        }
        self.audio_streams.first().map(|s| s.stream_id())
    }

    /// A fresh stream over this title's sectors, positioned at offset 0.
    /// Streams are independent; one per concurrent reader.
    pub fn stream(&self) -> TitleStream {
        TitleStream::with_sectors(self.vts.vob_composite(), self.pgc().sectors.iter().copied())
    }
}

fn audio_attr_matches(attrs: &AudioAttributes, lang: &str, chan: &str) -> bool {
    if lang != "*" && !lang.eq_ignore_ascii_case(&attrs.language_code()) {
        false
    } else if chan != "*" && chan.parse::<u8>() != Ok(attrs.channels()) {
        false
    } else {
        attrs.coding() == AudioCoding::Ac3 && attrs.code_extension_value() <= 1
    }
}

/// A DVD-Video folder: the directory holding a `VIDEO_TS` subdirectory.
///
/// Construction does only path-level discovery. `load_full` parses the
/// IFO metadata and captures the first failure, which then sticks: every
/// later query reports the same error without a retry.
#[derive(Debug)]
pub struct DvdFolder {
    path: PathBuf,
    videots_path: PathBuf,
    vmg_path: PathBuf,
    vmg: Option<VmgIfo>,
    vts_list: Vec<Arc<VtsIfo>>,
    titles: Vec<Title>,
    main_title: Option<usize>,
    error: Option<String>,
    loaded: bool,
}

impl DvdFolder {
    /// Locate `VIDEO_TS` and `VIDEO_TS.IFO` under `path`, matching DOS
    /// names case-insensitively. A directory without `VIDEO_TS` is
    /// `NotDvd`; one with `VIDEO_TS` but no VMG IFO is malformed.
    pub fn open(path: &Path) -> Result<DvdFolder> {
        if !path.is_dir() {
            return Err(DvdError::NotDvd(path.to_path_buf()));
        }
        let videots_path =
            find_dos_filename(path, "VIDEO_TS").ok_or_else(|| DvdError::NotDvd(path.to_path_buf()))?;
        let vmg_path = find_dos_filename(&videots_path, "VIDEO_TS.IFO").ok_or_else(|| {
            DvdError::format(format!(
                "couldn't locate VIDEO_TS.IFO in {}",
                videots_path.display()
            ))
        })?;

        Ok(DvdFolder {
            path: path.to_path_buf(),
            videots_path,
            vmg_path,
            vmg: None,
            vts_list: Vec::new(),
            titles: Vec::new(),
            main_title: None,
            error: None,
            loaded: false,
        })
    }

    /// Parse the VMG, every title set, and assemble the titles. The first
    /// error is captured and sticky.
    pub fn load_full(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        if let Err(err) = self.try_load() {
            self.error = Some(err.to_string());
        }
    }

    fn try_load(&mut self) -> Result<()> {
        let vmg = VmgIfo::open(&self.vmg_path)?;

        for num in 1..=vmg.num_vtses() {
            let name = format!("VTS_{num:02}_0.IFO");
            let ifo_path = find_dos_filename(&self.videots_path, &name).ok_or_else(|| {
                DvdError::format(format!(
                    "couldn't find file {name} in {}",
                    self.videots_path.display()
                ))
            })?;
            self.vts_list.push(Arc::new(VtsIfo::open(&ifo_path)?));
        }

        // Titles whose program chain pointer is stale are reported and
        // skipped; the rest of the disc stays usable.
        let mut best_secs = 0.0;
        for num in 1..=vmg.num_titles() {
            match Title::new(num, &vmg, &self.vts_list) {
                Ok(title) => {
                    if title.time().secs() > best_secs {
                        best_secs = title.time().secs();
                        self.main_title = Some(self.titles.len());
                    }
                    self.titles.push(title);
                }
                Err(DvdError::Format(msg)) => warn!("skipping title {num}: {msg}"),
                Err(err) => return Err(err),
            }
        }

        if self.titles.is_empty() {
            return Err(DvdError::format("No valid titles present"));
        }

        self.vmg = Some(vmg);
        Ok(())
    }

    pub fn folder(&self) -> &Path {
        &self.path
    }

    pub fn videots_path(&self) -> &Path {
        &self.videots_path
    }

    /// The parsed Video Manager, present once deep loading succeeded.
    pub fn vmg(&self) -> Option<&VmgIfo> {
        self.vmg.as_ref()
    }

    pub fn vts_list(&self) -> &[Arc<VtsIfo>] {
        &self.vts_list
    }

    pub fn titles(&self) -> &[Title] {
        &self.titles
    }

    /// The longest title: heuristically, the feature presentation.
    pub fn main_title(&self) -> Option<&Title> {
        self.titles.get(self.main_title?)
    }

    /// Deep validity: the disc parsed end to end. Path-level validity is
    /// established by `open` itself; a folder you hold has already passed
    /// the shallow check.
    pub fn valid(&self) -> bool {
        self.loaded && self.error.is_none()
    }

    pub fn has_errors(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_is_not_dvd() {
        assert!(matches!(
            DvdFolder::open(Path::new("/nonexistent/nowhere")),
            Err(DvdError::NotDvd(_))
        ));
    }

    #[test]
    fn dir_without_videots_is_not_dvd() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DvdFolder::open(dir.path()),
            Err(DvdError::NotDvd(_))
        ));
    }

    #[test]
    fn videots_without_vmg_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("VIDEO_TS")).unwrap();
        assert!(matches!(
            DvdFolder::open(dir.path()),
            Err(DvdError::Format(_))
        ));
    }

    #[test]
    fn load_error_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let videots = dir.path().join("VIDEO_TS");
        std::fs::create_dir(&videots).unwrap();
        std::fs::write(videots.join("VIDEO_TS.IFO"), b"NOTDVDVIDEO!").unwrap();

        let mut folder = DvdFolder::open(dir.path()).unwrap();
        assert!(!folder.valid());

        folder.load_full();
        assert!(!folder.valid());
        assert!(folder.has_errors());
        let first = folder.error().unwrap().to_string();

        // A second load doesn't retry or change the answer.
        folder.load_full();
        assert_eq!(folder.error().unwrap(), first);
    }
}
