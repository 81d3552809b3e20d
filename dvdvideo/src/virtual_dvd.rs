//! Present a DVD folder as a flat directory of synthetic `.mpg` files.
//!
//! Every enumerable title appears as `__Tnn.mpg`: id 0 is the main title,
//! ids 1..N are the disc's titles, and id -99 marks a disc whose parse
//! failed. Opening one of the synthetic names resolves back to a `Title`
//! whose stream serves the bytes.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::SystemTime;

use log::warn;
use lru::LruCache;
use regex::Regex;

use crate::folder::{DvdFolder, Title};
use crate::DvdError;

static TITLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^__T(-?[0-9]+)\.mpg$").unwrap());

/// Synthetic file name for a title id, `__T%02d.mpg`.
pub fn title_file_name(id: i32) -> String {
    format!("__T{id:02}.mpg")
}

/// Id of the synthetic entry reporting a parse failure.
pub const ERROR_TITLE_ID: i32 = -99;

/// Tuning knobs for the virtual DVD layer.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Titles at or below this duration are left out of listings.
    pub title_min_seconds: f64,
    /// Capacity of the parsed-folder cache.
    pub lru_capacity: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            title_min_seconds: 10.0,
            lru_capacity: 20,
        }
    }
}

/// Sidecar metadata supplied by an external parser, keyed per synthetic
/// path. Consulted for listing suppression only.
pub trait SidecarMetadata {
    fn metadata_for(&self, path: &Path) -> HashMap<String, String>;
}

/// A metadata source that knows nothing.
pub struct NoSidecar;

impl SidecarMetadata for NoSidecar {
    fn metadata_for(&self, _path: &Path) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Cache of parsed DVD folders, keyed by directory. Entries are fully
/// loaded before insertion and immutable afterwards, so lookups can be
/// shared freely across threads.
pub struct DvdFolderCache {
    inner: Mutex<LruCache<PathBuf, Arc<DvdFolder>>>,
}

impl DvdFolderCache {
    pub fn new(capacity: usize) -> DvdFolderCache {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        DvdFolderCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, path: &Path) -> Option<Arc<DvdFolder>> {
        self.inner.lock().expect("cache lock").get(path).cloned()
    }

    fn insert(&self, path: PathBuf, folder: Arc<DvdFolder>) {
        self.inner.lock().expect("cache lock").put(path, folder);
    }
}

impl Default for DvdFolderCache {
    fn default() -> DvdFolderCache {
        DvdFolderCache::new(Options::default().lru_capacity)
    }
}

/// One synthetic directory entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Full synthetic path, `<dir>/__Tnn.mpg`.
    pub name: PathBuf,
    pub id: i32,
    /// Human label: the title's name or, for the error entry, the message.
    pub title: String,
    pub size: u64,
    /// Always the wall clock: the directory's own mtime says nothing
    /// about when the synthetic entries changed.
    pub mtime: SystemTime,
    pub is_dir: bool,
}

/// A DVD folder viewed as a directory of synthetic title files, or one
/// such file resolved from a pseudo-path.
pub struct VirtualDvd {
    path: PathBuf,
    file_id: i32,
    folder: Option<Arc<DvdFolder>>,
    valid: bool,
    options: Options,
}

impl VirtualDvd {
    /// `path` is either a DVD directory (listing mode) or a pseudo-path
    /// `<dir>/__Tnn.mpg` (open mode). Parsed folders come from `cache`;
    /// a miss parses eagerly and fills it.
    pub fn new(path: &Path, cache: &DvdFolderCache, options: Options) -> VirtualDvd {
        let (dir, file): (PathBuf, Option<String>) = if path.is_dir() {
            (path.to_path_buf(), None)
        } else {
            (
                path.parent().unwrap_or_else(|| Path::new("")).to_path_buf(),
                path.file_name().map(|n| n.to_string_lossy().into_owned()),
            )
        };

        let folder = cache.get(&dir).or_else(|| match DvdFolder::open(&dir) {
            Ok(mut folder) => {
                folder.load_full();
                let folder = Arc::new(folder);
                // Sticky-error folders are cached too: later lookups get
                // the same answer without a re-parse.
                cache.insert(dir.clone(), folder.clone());
                Some(folder)
            }
            Err(DvdError::NotDvd(_)) => None,
            Err(err) => {
                warn!("while reading DVD {}: {err}", dir.display());
                None
            }
        });

        // Path-level validity: a folder was discovered at all.
        let valid = folder.is_some();
        let file_id = match (&file, valid) {
            (Some(name), true) => TITLE_PATTERN
                .captures(name)
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(-1),
            _ => -1,
        };

        VirtualDvd {
            path: dir,
            file_id,
            folder,
            valid,
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The title id decoded from the pseudo-path, or -1.
    pub fn title_number(&self) -> i32 {
        self.file_id
    }

    /// Deep validity: the folder parsed end to end.
    pub fn valid(&self) -> bool {
        self.valid && self.folder.as_ref().is_some_and(|f| f.valid())
    }

    /// Path-level validity only.
    pub fn quick_valid(&self) -> bool {
        self.valid
    }

    pub fn has_errors(&self) -> bool {
        self.folder.as_ref().is_some_and(|f| f.has_errors())
    }

    /// A valid DVD pseudo-path names a playable title; anything else is
    /// unsupported.
    pub fn is_supported(&self) -> bool {
        self.valid() && self.file_id != -1
    }

    /// The name of the DVD itself: the folder's basename.
    pub fn dvd_title_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Human label for a title id.
    pub fn title_name(&self, id: i32) -> String {
        let titles = self.folder.as_ref().map(|f| f.titles()).unwrap_or(&[]);
        match id {
            0 => "Main Feature".to_string(),
            ERROR_TITLE_ID => self
                .folder
                .as_ref()
                .and_then(|f| f.error())
                .unwrap_or("<unknown error>")
                .to_string(),
            id if id > 0 => match titles.get(id as usize - 1) {
                Some(title) => format!("Title {id} ({})", title.time()),
                None => format!("<invalid title id {id}>"),
            },
            id => format!("<negative title id {id}>"),
        }
    }

    /// Resolve a title id: 0 is the main title, 1..N the disc's titles.
    pub fn id_to_title(&self, id: i32) -> Option<&Title> {
        if !self.valid() || id < 0 {
            return None;
        }
        let folder = self.folder.as_ref()?;
        if id == 0 {
            folder.main_title()
        } else {
            folder.titles().get(id as usize - 1)
        }
    }

    /// Resolve a synthetic file name, or the constructor's pseudo-path
    /// when `name` is `None`.
    pub fn file_title(&self, name: Option<&str>) -> Option<&Title> {
        match name {
            None => self.id_to_title(self.file_id),
            Some(name) => {
                let id = TITLE_PATTERN.captures(name)?.get(1)?.as_str().parse().ok()?;
                self.id_to_title(id)
            }
        }
    }

    /// Count of entries `get_files` would list.
    pub fn num_files(&self, sidecar: &dyn SidecarMetadata) -> usize {
        if self.valid() {
            self.get_files(sidecar).len()
        } else {
            0
        }
    }

    /// The synthetic directory listing: the main title first, then every
    /// title over the duration threshold, in disc order. A sidecar entry
    /// whose title starts with "ignore" suppresses its file. When the
    /// parse failed, a single error entry is listed instead.
    pub fn get_files(&self, sidecar: &dyn SidecarMetadata) -> Vec<FileEntry> {
        let mut files = Vec::new();
        let Some(folder) = self.folder.as_ref() else {
            return files;
        };

        if self.valid() && !folder.titles().is_empty() {
            if !self.ignored_by_sidecar(sidecar, 0) {
                let size = folder.main_title().map(|t| t.size()).unwrap_or(0);
                files.push(self.entry(0, size));
            }
            for title in folder.titles() {
                if title.time().secs() <= self.options.title_min_seconds {
                    continue;
                }
                let id = i32::from(title.number());
                if !self.ignored_by_sidecar(sidecar, id) {
                    files.push(self.entry(id, title.size()));
                }
            }
        } else if folder.has_errors() {
            files.push(self.entry(ERROR_TITLE_ID, 0));
        }
        files
    }

    fn entry(&self, id: i32, size: u64) -> FileEntry {
        FileEntry {
            name: self.path.join(title_file_name(id)),
            id,
            title: self.title_name(id),
            size,
            mtime: SystemTime::now(),
            is_dir: false,
        }
    }

    /// The sidecar can name a title `ignore...` (under `episodeTitle`, or
    /// the fallback key `Title <n>`) to keep it out of listings.
    fn ignored_by_sidecar(&self, sidecar: &dyn SidecarMetadata, id: i32) -> bool {
        let data = sidecar.metadata_for(&self.path.join(title_file_name(id)));
        let episode_title = data
            .get("episodeTitle")
            .or_else(|| data.get(&format!("Title {id}")));
        match episode_title {
            Some(title) => title.to_lowercase().starts_with("ignore"),
            None => false,
        }
    }
}
