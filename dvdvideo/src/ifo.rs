//! Parsers for the VMG and VTS IFO metadata files.
//!
//! `VIDEO_TS.IFO` (the Video Manager) names the disc's titles and which
//! title set and program chain each one lives in. Each `VTS_nn_0.IFO`
//! describes one title set: its A/V attributes and its program chains,
//! whose cell tables give the sector ranges that make up each title.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::warn;
use regex::Regex;

use crate::attrs::AvAttributes;
use crate::composite::CompositeFile;
use crate::ilvu::{self, IlvuError};
use crate::reader::IfoReader;
use crate::stream::{push_coalesced, SectorRange};
use crate::time::PlaybackTime;
use crate::{DvdError, Result};

const VMG_MAGIC: &[u8; 12] = b"DVDVIDEO-VMG";
const VTS_MAGIC: &[u8; 12] = b"DVDVIDEO-VTS";

static VTS_IFO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^VTS_([0-9]{2})_0\.IFO$").unwrap());
static VTS_VOB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^VTS_([0-9]{2})_([0-9])\.VOB$").unwrap());

/// One record of the Video Manager's table of titles.
#[derive(Debug, Clone, Copy)]
pub struct TitleInfo {
    /// 1-based title number on the disc.
    pub number: u16,
    pub title_type: u8,
    pub angles: u8,
    pub chapters: u16,
    pub parental: u16,
    pub vts_num: u8,
    pub vts_pgc_num: u8,
    pub vts_ifo_sector: u32,
}

/// The Video Manager IFO (`VIDEO_TS.IFO`).
#[derive(Debug)]
pub struct VmgIfo {
    path: PathBuf,
    last_sector_bup: u32,
    last_sector_ifo: u32,
    first_sector_menu: u32,
    version: u32,
    category: u32,
    num_volumes: u16,
    volume_number: u16,
    side_id: u8,
    num_vts: u16,
    provider_id: String,
    menu: AvAttributes,
    titles: Vec<TitleInfo>,
}

impl VmgIfo {
    pub fn open(path: &Path) -> Result<VmgIfo> {
        let mut r = IfoReader::new(BufReader::new(File::open(path)?));

        let magic = r.read_bytes(12)?;
        if magic != VMG_MAGIC {
            return Err(DvdError::format(format!(
                "{} is not a VMG IFO file",
                path.display()
            )));
        }

        r.seek(0x0C)?;
        let last_sector_bup = r.read_u32()?;
        r.seek(0x1C)?;
        let last_sector_ifo = r.read_u32()?;
        r.seek(0xC0)?;
        let first_sector_menu = r.read_u32()?;
        r.seek(0x20)?;
        let version = r.read_u32()?;

        let menu = AvAttributes::parse(&mut r, 0x100)?;

        r.seek(0x22)?;
        let category = r.read_u32()?;
        let num_volumes = r.read_u16()?;
        let volume_number = r.read_u16()?;
        let side_id = r.read_u8()?;
        r.seek(0x3E)?;
        let num_vts = r.read_u16()?;
        let provider_bytes = r.read_bytes(32)?;
        let provider_id = String::from_utf8_lossy(&provider_bytes)
            .trim_end_matches(['\0', ' '])
            .to_string();

        // Table of titles.
        r.seek(0xC4)?;
        let tt_srpt = r.read_u32()?;
        r.sector_seek(tt_srpt)?;
        let num_titles = r.read_u16()?;
        r.skip(6)?;

        let mut titles = Vec::with_capacity(usize::from(num_titles));
        for tn in 1..=num_titles {
            let title = TitleInfo {
                number: tn,
                title_type: r.read_u8()?,
                angles: r.read_u8()?,
                chapters: r.read_u16()?,
                parental: r.read_u16()?,
                vts_num: r.read_u8()?,
                vts_pgc_num: r.read_u8()?,
                vts_ifo_sector: r.read_u32()?,
            };
            if title.vts_num > 99 {
                return Err(DvdError::format(format!("title {tn} has a vts_num > 99")));
            }
            if title.vts_pgc_num > 99 {
                return Err(DvdError::format(format!(
                    "title {tn} has a vts_pgc_num > 99"
                )));
            }
            titles.push(title);
        }

        Ok(VmgIfo {
            path: path.to_path_buf(),
            last_sector_bup,
            last_sector_ifo,
            first_sector_menu,
            version,
            category,
            num_volumes,
            volume_number,
            side_id,
            num_vts,
            provider_id,
            menu,
            titles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_vtses(&self) -> u16 {
        self.num_vts
    }

    pub fn num_titles(&self) -> u16 {
        self.titles.len() as u16
    }

    /// Look up a title record by its 1-based number.
    pub fn title_info(&self, number: u16) -> Option<&TitleInfo> {
        self.titles.get(usize::from(number).checked_sub(1)?)
    }

    pub fn titles(&self) -> &[TitleInfo] {
        &self.titles
    }

    pub fn menu_attrs(&self) -> &AvAttributes {
        &self.menu
    }

    pub fn category(&self) -> u32 {
        self.category
    }

    pub fn num_volumes(&self) -> u16 {
        self.num_volumes
    }

    pub fn volume_number(&self) -> u16 {
        self.volume_number
    }

    pub fn side_id(&self) -> u8 {
        self.side_id
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn first_sector_menu(&self) -> u32 {
        self.first_sector_menu
    }

    pub fn last_sector_ifo(&self) -> u32 {
        self.last_sector_ifo
    }

    pub fn last_sector_bup(&self) -> u32 {
        self.last_sector_bup
    }
}

/// One entry program chain of a title set.
#[derive(Debug, Clone)]
pub struct PgcInfo {
    pub vts_number: u8,
    /// 1-based position in the title set's PGC table.
    pub number: u16,
    pub title_number: u8,
    pub parental_mask: u16,
    pub programs: u8,
    pub cells: u8,
    pub playtime: PlaybackTime,
    /// Indices into the title set's audio attribute table.
    pub audio_stream_nums: Vec<u8>,
    pub angles: bool,
    pub ilvu: bool,
    /// Sector ranges in playback order, coalesced where they touch.
    pub sectors: Vec<SectorRange>,
}

/// A Video Title Set IFO (`VTS_nn_0.IFO`) and its sibling VOB fragments.
#[derive(Debug)]
pub struct VtsIfo {
    path: PathBuf,
    number: u8,
    vob_files: Vec<PathBuf>,
    last_sector_bup: u32,
    last_sector_ifo: u32,
    first_sector_menu: u32,
    first_sector_title: u32,
    version: u32,
    menu: AvAttributes,
    title: AvAttributes,
    num_pgc: u16,
    pgcs: Vec<PgcInfo>,
}

impl VtsIfo {
    pub fn open(path: &Path) -> Result<VtsIfo> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DvdError::format("not a valid VTS file name"))?;
        let number = VTS_IFO_PATTERN
            .captures(name)
            .and_then(|caps| caps[1].parse::<u8>().ok())
            .ok_or_else(|| DvdError::format(format!("{name} is not a valid VTS file name")))?;

        // The VOB fragments backing this title set, in filename order.
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut vob_files = Vec::new();
        for entry in std::fs::read_dir(dir)?.flatten() {
            let fname = entry.file_name();
            let Some(fname) = fname.to_str() else {
                continue;
            };
            if let Some(caps) = VTS_VOB_PATTERN.captures(fname) {
                let vts: u8 = caps[1].parse().unwrap_or(0);
                let part: u8 = caps[2].parse().unwrap_or(0);
                if vts == number && part > 0 {
                    vob_files.push(dir.join(fname));
                }
            }
        }
        vob_files.sort();

        let mut r = IfoReader::new(BufReader::new(File::open(path)?));

        let magic = r.read_bytes(12)?;
        if magic != VTS_MAGIC {
            return Err(DvdError::format(format!(
                "{} is not a VTS IFO file",
                path.display()
            )));
        }

        r.seek(0x0C)?;
        let last_sector_bup = r.read_u32()?;
        r.seek(0x1C)?;
        let last_sector_ifo = r.read_u32()?;
        r.seek(0xC0)?;
        let first_sector_menu = r.read_u32()?;
        let first_sector_title = r.read_u32()?;
        r.seek(0x20)?;
        let version = r.read_u32()?;

        let menu = AvAttributes::parse(&mut r, 0x100)?;
        let mut title = AvAttributes::parse(&mut r, 0x200)?;

        // Program chain table.
        r.seek(0xCC)?;
        let pgci_sector = r.read_u32()?;
        r.sector_seek(pgci_sector)?;
        let pgci_offset = r.tell()?;

        let num_pgc = r.read_u16()?;
        r.skip(2)?;
        let _pgc_end_off = r.read_u32()?;

        let mut composite = CompositeFile::from_paths(vob_files.iter().cloned());
        let mut pgcs = Vec::new();
        for pgc_idx in 0..num_pgc {
            let t1 = r.read_u8()?;
            r.skip(1)?;
            let parental_mask = r.read_u16()?;
            let pgc_off = r.read_u32()?;

            // Non-entry program chains are reachable only through menu
            // navigation, which we don't model.
            if t1 & 0x80 != 0x80 {
                continue;
            }

            let cur_off = r.tell()?;
            let parsed = parse_pgc_body(
                &mut r,
                pgci_offset,
                pgc_off,
                PgcHeader {
                    vts_number: number,
                    number: pgc_idx + 1,
                    title_number: t1 & 0x3F,
                    parental_mask,
                },
                &mut composite,
            )?;
            if let Some(info) = parsed {
                pgcs.push(info);
            }
            r.seek(cur_off)?;
        }

        // The video attribute word has no frame rate field; it comes from
        // the first program chain's playback time.
        if let Some(first) = pgcs.first() {
            title.video_mut().set_frame_rate(first.playtime.frame_rate());
        }

        Ok(VtsIfo {
            path: path.to_path_buf(),
            number,
            vob_files,
            last_sector_bup,
            last_sector_ifo,
            first_sector_menu,
            first_sector_title,
            version,
            menu,
            title,
            num_pgc,
            pgcs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `nn` in `VTS_nn_0.IFO`.
    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn vob_files(&self) -> &[PathBuf] {
        &self.vob_files
    }

    /// A fresh composite over this title set's VOB fragments.
    pub fn vob_composite(&self) -> CompositeFile {
        CompositeFile::from_paths(self.vob_files.iter().cloned())
    }

    pub fn menu_attrs(&self) -> &AvAttributes {
        &self.menu
    }

    pub fn title_attrs(&self) -> &AvAttributes {
        &self.title
    }

    /// Number of program chains in the table, counting non-entry ones.
    pub fn num_pgcs(&self) -> u16 {
        self.num_pgc
    }

    /// Look up an entry program chain by 1-based number.
    pub fn pgc(&self, number: u16) -> Option<&PgcInfo> {
        self.pgcs.get(usize::from(number).checked_sub(1)?)
    }

    pub fn pgcs(&self) -> &[PgcInfo] {
        &self.pgcs
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn first_sector_menu(&self) -> u32 {
        self.first_sector_menu
    }

    pub fn first_sector_title(&self) -> u32 {
        self.first_sector_title
    }

    /// Sector count of the VOB set, from the layout fields in the header.
    pub fn vob_sectors(&self) -> u32 {
        self.last_sector_bup
            .saturating_sub(self.last_sector_ifo.saturating_mul(2))
    }

    pub fn vob_size(&self) -> u64 {
        u64::from(self.vob_sectors()) * crate::DVD_BLOCK_LEN
    }
}

struct PgcHeader {
    vts_number: u8,
    number: u16,
    title_number: u8,
    parental_mask: u16,
}

/// Parse one program chain body. `Ok(None)` means the chain was discarded
/// after an interleave resolution failure; the table walk continues.
fn parse_pgc_body<R: Read + Seek>(
    r: &mut IfoReader<R>,
    pgci_offset: u64,
    pgc_off: u32,
    header: PgcHeader,
    composite: &mut CompositeFile,
) -> Result<Option<PgcInfo>> {
    let base = pgci_offset + u64::from(pgc_off);

    r.seek(base + 2)?;
    let programs = r.read_u8()?;
    let cells = r.read_u8()?;

    let time_bytes = r.read_bytes(4)?;
    let playtime = PlaybackTime::from_bcd([time_bytes[0], time_bytes[1], time_bytes[2], time_bytes[3]])?;

    // Past the prohibited user operations, then the audio stream control
    // table: eight two-byte entries, available streams flagged in bit 7.
    r.skip(4)?;
    let mut audio_stream_nums = Vec::new();
    for _ in 0..8 {
        let strnum = r.read_u8()?;
        r.skip(1)?;
        if strnum & 0x80 != 0 {
            audio_stream_nums.push(strnum & 0x7);
        }
    }

    r.seek(base + 0xE8)?;
    let playback_off = r.read_u16()?;
    r.seek(base + u64::from(playback_off))?;

    let mut angles = false;
    let mut ilvu = false;
    let mut sectors = Vec::new();
    for _ in 0..cells {
        let category = r.read_u8()?;
        r.skip(1)?;
        if category & 0xF0 != 0 {
            angles = true;
        }
        r.skip(6)?;
        let start = r.read_u32()?;
        let first_ilvu_end = r.read_u32()?;
        r.skip(4)?;
        let end = r.read_u32()?;

        // A zero "first ILVU end sector" marks an ordinary cell.
        if first_ilvu_end == 0 {
            push_coalesced(&mut sectors, start, end);
            continue;
        }

        ilvu = true;
        match ilvu::compute_real_sectors(start, end, composite) {
            Ok(ranges) => {
                for (rs, re) in ranges {
                    push_coalesced(&mut sectors, rs, re);
                }
            }
            Err(err @ IlvuError::BadStartCode(_)) => {
                // The cell's VOB data isn't walkable; fall back to the
                // whole interleave so playback still gets every angle.
                warn!(
                    "cell [{start}, {end}] in title set {}, program chain {}: {err}; keeping raw range",
                    header.vts_number, header.number
                );
                push_coalesced(&mut sectors, start, end);
            }
            Err(err) => {
                warn!(
                    "error processing ILVU block within title set {}, program chain {}: {err}",
                    header.vts_number, header.number
                );
                return Ok(None);
            }
        }
    }

    Ok(Some(PgcInfo {
        vts_number: header.vts_number,
        number: header.number,
        title_number: header.title_number,
        parental_mask: header.parental_mask,
        programs,
        cells,
        playtime,
        audio_stream_nums,
        angles,
        ilvu,
        sectors,
    }))
}
