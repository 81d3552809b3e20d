use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dvdvideo::attrs::TvStandard;
use dvdvideo::{DvdFolder, DvdFolderCache, NoSidecar, Options, VirtualDvd};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
enum Dvd2MpgError {
    #[error("{path} is not a DVD-Video folder")]
    #[diagnostic(help("expected a directory containing a VIDEO_TS subdirectory"))]
    NotDvd { path: String },

    #[error("DVD could not be parsed: {message}")]
    #[diagnostic(help("the VIDEO_TS tree is present but its IFO metadata is malformed"))]
    Malformed { message: String },

    #[error("the disc has no title with id {id}")]
    #[diagnostic(help("run the list command to see the available title ids"))]
    NoSuchTitle { id: i32 },

    #[error(transparent)]
    Dvd(dvdvideo::DvdError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl From<dvdvideo::DvdError> for Dvd2MpgError {
    fn from(err: dvdvideo::DvdError) -> Dvd2MpgError {
        match err {
            dvdvideo::DvdError::NotDvd(path) => Dvd2MpgError::NotDvd {
                path: path.display().to_string(),
            },
            dvdvideo::DvdError::Format(message) => Dvd2MpgError::Malformed { message },
            other => Dvd2MpgError::Dvd(other),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Expose the titles of a DVD-Video folder as plain MPEG program streams"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the synthetic title files of a DVD folder.
    List {
        path: PathBuf,
        /// Leave out titles at or below this duration, in seconds.
        #[arg(long, default_value_t = Options::default().title_min_seconds)]
        min_seconds: f64,
    },
    /// Show disc-level details: title sets, attributes, and titles.
    Info { path: PathBuf },
    /// Write one title's program stream to a file or stdout.
    Dump {
        path: PathBuf,
        /// Title id as listed; 0 is the main title.
        #[arg(long, default_value_t = 0)]
        title: i32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), miette::Report> {
    env_logger::init();
    work()?;
    Ok(())
}

fn work() -> Result<(), Dvd2MpgError> {
    let args = Args::parse();

    match args.command {
        Command::List { path, min_seconds } => list(path, min_seconds),
        Command::Info { path } => info(path),
        Command::Dump {
            path,
            title,
            output,
        } => dump(path, title, output),
    }
}

fn list(path: PathBuf, min_seconds: f64) -> Result<(), Dvd2MpgError> {
    let cache = DvdFolderCache::default();
    let options = Options {
        title_min_seconds: min_seconds,
        ..Options::default()
    };
    let vdvd = VirtualDvd::new(&path, &cache, options);
    if !vdvd.quick_valid() {
        return Err(Dvd2MpgError::NotDvd {
            path: path.display().to_string(),
        });
    }

    for entry in vdvd.get_files(&NoSidecar) {
        let name = entry
            .name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{name}  {:>12}  {}", entry.size, entry.title);
    }
    Ok(())
}

fn info(path: PathBuf) -> Result<(), Dvd2MpgError> {
    let mut folder = DvdFolder::open(&path)?;
    folder.load_full();
    if let Some(message) = folder.error() {
        return Err(Dvd2MpgError::Malformed {
            message: message.to_string(),
        });
    }

    if let Some(vmg) = folder.vmg() {
        println!("provider: {}", vmg.provider_id());
        println!("title sets: {}", vmg.num_vtses());
    }
    for vts in folder.vts_list() {
        let video = vts.title_attrs().video();
        let standard = match video.standard() {
            TvStandard::Ntsc => "NTSC",
            TvStandard::Pal => "PAL",
        };
        println!(
            "VTS {:02}: {} {} {} @ {:.2} fps, {} VOB file(s), {} program chain(s)",
            vts.number(),
            video.resolution(),
            standard,
            video.aspect_ratio(),
            video.frame_rate(),
            vts.vob_files().len(),
            vts.num_pgcs(),
        );
    }
    for title in folder.titles() {
        let flags = match (title.has_angles(), title.has_interleaved()) {
            (true, true) => " [angles, interleaved]",
            (true, false) => " [angles]",
            (false, true) => " [interleaved]",
            (false, false) => "",
        };
        println!(
            "title {:02}: VTS {:02} PGC {:02}, {}, {} bytes, {} audio stream(s){}",
            title.number(),
            title.vts_number(),
            title.pgc_number(),
            title.time(),
            title.size(),
            title.audio_streams().len(),
            flags,
        );
        for audio in title.audio_streams() {
            println!(
                "  audio 0x{:02X}: {:?} {} {}ch",
                audio.stream_id(),
                audio.coding(),
                audio.language_code(),
                audio.channels(),
            );
        }
    }
    if let Some(main) = folder.main_title() {
        println!("main title: {:02} ({})", main.number(), main.time());
    }
    Ok(())
}

fn dump(path: PathBuf, title_id: i32, output: Option<PathBuf>) -> Result<(), Dvd2MpgError> {
    let cache = DvdFolderCache::default();
    let vdvd = VirtualDvd::new(&path, &cache, Options::default());
    if !vdvd.quick_valid() {
        return Err(Dvd2MpgError::NotDvd {
            path: path.display().to_string(),
        });
    }

    let title = vdvd
        .id_to_title(title_id)
        .ok_or(Dvd2MpgError::NoSuchTitle { id: title_id })?;
    let mut stream = title.stream();

    match output {
        Some(out_path) => {
            let mut out = File::create(out_path)?;
            io::copy(&mut stream, &mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            io::copy(&mut stream, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
