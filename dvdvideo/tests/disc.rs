//! End-to-end tests over a synthetic `VIDEO_TS` tree written to disk.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dvdvideo::{
    DvdFolder, DvdFolderCache, DvdError, NoSidecar, Options, SectorRange, SidecarMetadata,
    VirtualDvd,
};

const BLOCK: usize = 2048;

fn be16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
}

fn be32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

/// One program chain of the synthetic title set.
struct PgcSpec {
    /// BCD playback time: hours, minutes, seconds, frame-rate byte.
    playtime: [u8; 4],
    /// `(start, first_ilvu_end, end)` per cell.
    cells: Vec<(u32, u32, u32)>,
}

/// Write a `VIDEO_TS` tree with one title set and one title per program
/// chain. Returns the disc's root directory.
fn build_disc(dir: &TempDir, pgcs: &[PgcSpec], vob_sectors: &[u8]) -> PathBuf {
    let root = dir.path().to_path_buf();
    let videots = root.join("VIDEO_TS");
    std::fs::create_dir(&videots).unwrap();

    // VMG: one VTS, one title per PGC.
    let mut vmg = vec![0u8; 2 * BLOCK];
    vmg[0..12].copy_from_slice(b"DVDVIDEO-VMG");
    be16(&mut vmg, 0x3E, 1);
    be32(&mut vmg, 0xC4, 1);
    be16(&mut vmg, BLOCK, pgcs.len() as u16);
    for i in 0..pgcs.len() {
        let rec = BLOCK + 8 + i * 12;
        vmg[rec + 6] = 1; // vts_num
        vmg[rec + 7] = (i + 1) as u8; // vts_pgc_num
    }
    std::fs::write(videots.join("VIDEO_TS.IFO"), vmg).unwrap();

    // VTS: header sector plus the PGC table sector.
    let mut vts = vec![0u8; 2 * BLOCK];
    vts[0..12].copy_from_slice(b"DVDVIDEO-VTS");
    be16(&mut vts, 0x200, 0x4400); // MPEG-2 NTSC 16:9 720x480
    be16(&mut vts, 0x202, 1);
    vts[0x204..0x206].copy_from_slice(&[0x00, 0x01]); // AC3 2ch
    vts[0x206..0x208].copy_from_slice(b"en");
    be32(&mut vts, 0xCC, 1);

    be16(&mut vts, BLOCK, pgcs.len() as u16);
    for (i, pgc) in pgcs.iter().enumerate() {
        let entry = BLOCK + 8 + i * 8;
        vts[entry] = 0x80 | (i as u8 + 1); // entry PGC
        let body = 0x40 + i * 0x140;
        be32(&mut vts, entry + 4, body as u32);

        let body = BLOCK + body;
        vts[body + 2] = 1; // programs
        vts[body + 3] = pgc.cells.len() as u8;
        vts[body + 4..body + 8].copy_from_slice(&pgc.playtime);
        vts[body + 12] = 0x80; // audio stream 0 available
        be16(&mut vts, body + 0xE8, 0xF0);
        for (c, &(s, ilvu, e)) in pgc.cells.iter().enumerate() {
            let cell = body + 0xF0 + c * 24;
            be32(&mut vts, cell + 8, s);
            be32(&mut vts, cell + 12, ilvu);
            be32(&mut vts, cell + 20, e);
        }
    }
    std::fs::write(videots.join("VTS_01_0.IFO"), vts).unwrap();

    // VOB fragments: every sector filled with its own number, split
    // 12 / rest across two fragments.
    let fragment = |range: std::ops::Range<usize>| -> Vec<u8> {
        let mut data = Vec::new();
        for s in range {
            data.extend_from_slice(&vec![vob_sectors[s]; BLOCK]);
        }
        data
    };
    let split = vob_sectors.len().min(12);
    std::fs::write(videots.join("VTS_01_1.VOB"), fragment(0..split)).unwrap();
    if split < vob_sectors.len() {
        std::fs::write(videots.join("VTS_01_2.VOB"), fragment(split..vob_sectors.len())).unwrap();
    }

    root
}

/// Playtimes 300 s, 1800 s, 1200 s over a 20-sector VOB set.
fn feature_disc(dir: &TempDir) -> PathBuf {
    let sectors: Vec<u8> = (0..20).collect();
    build_disc(
        dir,
        &[
            PgcSpec {
                playtime: [0x00, 0x05, 0x00, 0xC0],
                cells: vec![(0, 0, 4)],
            },
            PgcSpec {
                playtime: [0x00, 0x30, 0x00, 0xC0],
                cells: vec![(5, 0, 11), (12, 0, 14)],
            },
            PgcSpec {
                playtime: [0x00, 0x20, 0x00, 0xC0],
                cells: vec![(15, 0, 19)],
            },
        ],
        &sectors,
    )
}

#[test]
fn parses_folder_and_picks_main_title() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);

    let mut folder = DvdFolder::open(&root).unwrap();
    folder.load_full();
    assert!(folder.valid(), "unexpected error: {:?}", folder.error());

    assert_eq!(folder.titles().len(), 3);
    let main = folder.main_title().unwrap();
    assert_eq!(main.number(), 2);
    assert_eq!(main.time().secs(), 1800.0);

    // Touching cells coalesce into one range.
    assert_eq!(
        main.pgc().sectors,
        vec![SectorRange { start: 5, end: 14 }]
    );
    assert_eq!(main.size(), 10 * BLOCK as u64);

    // Every title's audio streams come from the VTS table.
    for title in folder.titles() {
        assert_eq!(title.audio_streams().len(), 1);
        assert_eq!(title.audio_streams()[0].language_code(), "en");
        assert_eq!(title.audio_streams()[0].stream_id(), 0x80);
        assert_eq!(title.find_best_audio_stream_id("en:2"), Some(0x80));
    }
}

#[test]
fn title_stream_reads_mapped_sectors() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);

    let mut folder = DvdFolder::open(&root).unwrap();
    folder.load_full();
    let main = folder.main_title().unwrap();

    let mut stream = main.stream();
    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert_eq!(all.len() as u64, main.size());

    // Virtual sector k maps to disc sector 5 + k, crossing the VOB
    // fragment boundary at disc sector 12.
    for k in 0..10 {
        assert_eq!(all[k * BLOCK], 5 + k as u8);
    }

    // Seek then read matches the linear pass.
    let mut stream = main.stream();
    stream.seek(SeekFrom::Start(7 * BLOCK as u64 - 3)).unwrap();
    let mut buf = [0u8; 6];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, &all[7 * BLOCK - 3..7 * BLOCK + 3]);
}

#[test]
fn listing_follows_duration_threshold() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::default();

    let options = Options {
        title_min_seconds: 600.0,
        ..Options::default()
    };
    let vdvd = VirtualDvd::new(&root, &cache, options);
    assert!(vdvd.valid());
    let files = vdvd.get_files(&NoSidecar);
    assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![0, 2, 3]);
    assert_eq!(vdvd.num_files(&NoSidecar), 3);
    assert_eq!(files[0].title, "Main Feature");
    assert_eq!(files[0].size, 10 * BLOCK as u64);
    assert!(files[1].title.starts_with("Title 2 (0:30:00"));

    let strict = VirtualDvd::new(
        &root,
        &cache,
        Options {
            title_min_seconds: 1500.0,
            ..Options::default()
        },
    );
    assert_eq!(strict.num_files(&NoSidecar), 2);
}

#[test]
fn listing_is_stable() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::default();
    let vdvd = VirtualDvd::new(&root, &cache, Options::default());

    let first = vdvd.get_files(&NoSidecar);
    let second = vdvd.get_files(&NoSidecar);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.id, b.id);
        assert_eq!(a.title, b.title);
        assert_eq!(a.size, b.size);
        assert!(!a.is_dir);
    }
}

struct MapSidecar(HashMap<PathBuf, HashMap<String, String>>);

impl SidecarMetadata for MapSidecar {
    fn metadata_for(&self, path: &Path) -> HashMap<String, String> {
        self.0.get(path).cloned().unwrap_or_default()
    }
}

#[test]
fn sidecar_suppresses_listing_but_not_resolution() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::default();
    let vdvd = VirtualDvd::new(&root, &cache, Options::default());

    let mut entries = HashMap::new();
    entries.insert(
        root.join("__T02.mpg"),
        HashMap::from([(String::from("episodeTitle"), String::from("ignore trailer"))]),
    );
    let sidecar = MapSidecar(entries);

    let ids: Vec<i32> = vdvd.get_files(&sidecar).iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0, 1, 3]);

    // Suppressed from the listing, still resolvable by name.
    let title = vdvd.file_title(Some("__T02.mpg")).unwrap();
    assert_eq!(title.number(), 2);
}

#[test]
fn sidecar_fallback_key_counts_too() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::default();
    let vdvd = VirtualDvd::new(&root, &cache, Options::default());

    let mut entries = HashMap::new();
    entries.insert(
        root.join("__T03.mpg"),
        HashMap::from([(String::from("Title 3"), String::from("IGNORED extras"))]),
    );
    let sidecar = MapSidecar(entries);

    let ids: Vec<i32> = vdvd.get_files(&sidecar).iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn pseudo_path_opens_a_title() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::default();

    let vdvd = VirtualDvd::new(&root.join("__T03.mpg"), &cache, Options::default());
    assert_eq!(vdvd.title_number(), 3);
    assert!(vdvd.is_supported());

    let title = vdvd.file_title(None).unwrap();
    assert_eq!(title.number(), 3);
    assert_eq!(title.time().secs(), 1200.0);

    let mut stream = title.stream();
    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert_eq!(all.len(), 5 * BLOCK);
    assert_eq!(all[0], 15);
}

#[test]
fn cache_returns_the_same_folder() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    let cache = DvdFolderCache::new(4);

    let a = VirtualDvd::new(&root, &cache, Options::default());
    // Corrupt the tree after the first parse; a cached folder means the
    // second lookup never rereads it.
    std::fs::remove_file(root.join("VIDEO_TS").join("VIDEO_TS.IFO")).unwrap();
    let b = VirtualDvd::new(&root, &cache, Options::default());

    assert!(a.valid());
    assert!(b.valid());
    assert_eq!(b.num_files(&NoSidecar), a.num_files(&NoSidecar));
}

#[test]
fn stale_pgc_pointer_skips_title_only() {
    let dir = TempDir::new().unwrap();
    let sectors: Vec<u8> = (0..20).collect();
    // Second title points at PGC 9, which the title set doesn't have.
    let root = build_disc(
        &dir,
        &[PgcSpec {
            playtime: [0x00, 0x05, 0x00, 0xC0],
            cells: vec![(0, 0, 9)],
        }],
        &sectors,
    );
    let videots = root.join("VIDEO_TS");
    let mut vmg = std::fs::read(videots.join("VIDEO_TS.IFO")).unwrap();
    be16(&mut vmg, BLOCK, 2);
    vmg[BLOCK + 8 + 12 + 6] = 1;
    vmg[BLOCK + 8 + 12 + 7] = 9;
    std::fs::write(videots.join("VIDEO_TS.IFO"), vmg).unwrap();

    let mut folder = DvdFolder::open(&root).unwrap();
    folder.load_full();
    assert!(folder.valid(), "unexpected error: {:?}", folder.error());
    assert_eq!(folder.titles().len(), 1);
    assert_eq!(folder.titles()[0].number(), 1);
}

#[test]
fn missing_vts_is_fatal() {
    let dir = TempDir::new().unwrap();
    let root = feature_disc(&dir);
    std::fs::remove_file(root.join("VIDEO_TS").join("VTS_01_0.IFO")).unwrap();

    let mut folder = DvdFolder::open(&root).unwrap();
    folder.load_full();
    assert!(!folder.valid());
    assert!(folder.error().unwrap().contains("VTS_01_0.IFO"));
}

#[test]
fn non_dvd_is_distinguished_from_malformed() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        DvdFolder::open(dir.path()),
        Err(DvdError::NotDvd(_))
    ));

    std::fs::create_dir(dir.path().join("VIDEO_TS")).unwrap();
    assert!(matches!(
        DvdFolder::open(dir.path()),
        Err(DvdError::Format(_))
    ));
}

#[test]
fn interleaved_cell_resolves_to_first_angle() {
    let dir = TempDir::new().unwrap();

    // A 20-sector VOB where sectors 0, 5, 10 and 15 start interleaved
    // units of 5 sectors, alternating between two angles.
    let mut vob = Vec::new();
    for _ in 0..4 {
        let base = vob.len();
        vob.extend_from_slice(&[0x00, 0x00, 0x01, 0xBA]);
        let mut pack_body = [0u8; 10];
        pack_body[9] = 0x00;
        vob.extend_from_slice(&pack_body);
        vob.extend_from_slice(&[0x00, 0x00, 0x01, 0xBF]);
        vob.extend_from_slice(&1018u16.to_be_bytes());
        vob.push(1);
        let mut payload = vec![0u8; 1017];
        payload[32] = 0x60;
        payload[34..38].copy_from_slice(&4u32.to_be_bytes());
        payload[38..42].copy_from_slice(&10u32.to_be_bytes());
        vob.extend_from_slice(&payload);
        vob.resize(base + BLOCK, 0xFF);

        // Four filler sectors holding an audio packet each.
        for _ in 0..4 {
            let base = vob.len();
            vob.extend_from_slice(&[0x00, 0x00, 0x01, 0xC0]);
            vob.extend_from_slice(&(BLOCK as u16 - 6).to_be_bytes());
            vob.resize(base + BLOCK, 0x00);
        }
    }

    let root = build_disc(
        &dir,
        &[PgcSpec {
            playtime: [0x00, 0x05, 0x00, 0xC0],
            cells: vec![(0, 4, 19)],
        }],
        &[],
    );
    let videots = root.join("VIDEO_TS");
    std::fs::write(videots.join("VTS_01_1.VOB"), vob).unwrap();

    // Reparse with the VOB in place; the builder's cache-free folder API
    // reads the tree on demand.
    let mut folder = DvdFolder::open(&root).unwrap();
    folder.load_full();
    assert!(folder.valid(), "unexpected error: {:?}", folder.error());

    let title = &folder.titles()[0];
    assert!(title.has_interleaved());
    assert_eq!(
        title.pgc().sectors,
        vec![
            SectorRange { start: 0, end: 4 },
            SectorRange { start: 10, end: 14 }
        ]
    );
    assert_eq!(title.size(), 10 * BLOCK as u64);
}
