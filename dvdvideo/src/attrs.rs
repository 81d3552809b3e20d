//! Audio and video attribute records from IFO files.

use std::fmt;
use std::io::{Read, Seek};

use crate::reader::IfoReader;
use crate::time::FRAME_RATE_NTSC;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCoding {
    Mpeg1,
    Mpeg2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvStandard {
    Ntsc,
    Pal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    /// 4:3 full frame.
    Standard,
    /// 16:9 anamorphic.
    Wide,
    Reserved,
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectRatio::Standard => write!(f, "4:3"),
            AspectRatio::Wide => write!(f, "16:9"),
            AspectRatio::Reserved => write!(f, "<unknown>"),
        }
    }
}

/// The 16-bit video attribute word at the head of an A/V attribute table.
///
/// The frame rate is not part of the word; it is filled in afterwards from
/// the playback time of the title set's first program chain.
#[derive(Debug, Clone, Copy)]
pub struct VideoAttributes {
    word: u16,
    frame_rate: f64,
}

impl VideoAttributes {
    pub fn from_word(word: u16) -> VideoAttributes {
        VideoAttributes {
            word,
            frame_rate: FRAME_RATE_NTSC,
        }
    }

    pub fn coding(&self) -> VideoCoding {
        if (self.word & 0xC000) >> 14 == 0 {
            VideoCoding::Mpeg1
        } else {
            VideoCoding::Mpeg2
        }
    }

    pub fn standard(&self) -> TvStandard {
        if self.word & 0x3000 == 0 {
            TvStandard::Ntsc
        } else {
            TvStandard::Pal
        }
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        match (self.word & 0x0C00) >> 10 {
            0 => AspectRatio::Standard,
            1 | 3 => AspectRatio::Wide,
            _ => AspectRatio::Reserved,
        }
    }

    pub fn width(&self) -> u16 {
        [720, 704, 352, 352][usize::from((self.word & 0x38) >> 3) & 0x3]
    }

    pub fn height(&self) -> u16 {
        let idx = usize::from((self.word & 0x38) >> 3) & 0x3;
        match self.standard() {
            TvStandard::Ntsc => [480, 480, 480, 240][idx],
            TvStandard::Pal => [576, 576, 576, 288][idx],
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width(), self.height())
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn set_frame_rate(&mut self, rate: f64) {
        self.frame_rate = rate;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCoding {
    Ac3,
    Mpeg1,
    Mpeg2,
    Lpcm,
    Dts,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeExtension {
    Unspecified,
    Normal,
    ForTheBlind,
    DirectorsComments,
    AlternateComments,
}

/// One 8-byte audio stream attribute record.
#[derive(Debug, Clone, Copy)]
pub struct AudioAttributes {
    word: u16,
    lang: [u8; 2],
    code_ext: u8,
    stream_id: u8,
}

impl AudioAttributes {
    /// Decode a record. `num` is the stream's index within its table; the
    /// MPEG stream id is the coding's base id plus that index.
    pub fn from_record(record: [u8; 8], num: u8) -> AudioAttributes {
        let word = u16::from_be_bytes([record[0], record[1]]);
        let base = [0x80, 0, 0xC0, 0xC0, 0xA0, 0, 0x88, 0][usize::from((word & 0xE000) >> 13)];
        AudioAttributes {
            word,
            lang: [record[2], record[3]],
            code_ext: record[5],
            stream_id: base + num,
        }
    }

    pub fn coding(&self) -> AudioCoding {
        match (self.word & 0xE000) >> 13 {
            0 => AudioCoding::Ac3,
            2 => AudioCoding::Mpeg1,
            3 => AudioCoding::Mpeg2,
            4 => AudioCoding::Lpcm,
            6 => AudioCoding::Dts,
            _ => AudioCoding::Unknown,
        }
    }

    /// Two-letter ISO 639 language code, lowercased on disc by convention.
    pub fn language_code(&self) -> String {
        String::from_utf8_lossy(&self.lang).into_owned()
    }

    pub fn code_extension(&self) -> CodeExtension {
        match self.code_ext {
            1 => CodeExtension::Normal,
            2 => CodeExtension::ForTheBlind,
            3 => CodeExtension::DirectorsComments,
            4 => CodeExtension::AlternateComments,
            _ => CodeExtension::Unspecified,
        }
    }

    pub fn code_extension_value(&self) -> u8 {
        self.code_ext
    }

    pub fn channels(&self) -> u8 {
        (self.word as u8 & 0x7) + 1
    }

    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    /// Dynamic range compression, meaningful for the MPEG codings only.
    pub fn drc(&self) -> bool {
        let cmode = (self.word & 0xE000) >> 13;
        (cmode == 2 || cmode == 3) && self.word & 0xC0 == 0xC0
    }

    /// Sample depth in bits; everything but LPCM is fixed at 16.
    pub fn quantization(&self) -> u8 {
        if (self.word & 0xE000) >> 13 == 4 {
            [16, 20, 24, 0][usize::from((self.word & 0xC0) >> 6)]
        } else {
            16
        }
    }
}

/// A full A/V attribute table: one video word, a stream count, then one
/// 8-byte audio record per stream. Appears at 0x100 (menu) and, in VTS
/// files, 0x200 (title).
#[derive(Debug, Clone)]
pub struct AvAttributes {
    video: VideoAttributes,
    audio: Vec<AudioAttributes>,
}

impl AvAttributes {
    pub fn parse<R: Read + Seek>(r: &mut IfoReader<R>, offset: u64) -> Result<AvAttributes> {
        r.seek(offset)?;
        let video = VideoAttributes::from_word(r.read_u16()?);
        let num_streams = r.read_u16()?;
        let mut audio = Vec::with_capacity(usize::from(num_streams));
        for num in 0..num_streams {
            let mut record = [0; 8];
            record.copy_from_slice(&r.read_bytes(8)?);
            audio.push(AudioAttributes::from_record(record, num as u8));
        }
        Ok(AvAttributes { video, audio })
    }

    pub fn video(&self) -> &VideoAttributes {
        &self.video
    }

    pub(crate) fn video_mut(&mut self) -> &mut VideoAttributes {
        &mut self.video
    }

    pub fn audio_list(&self) -> &[AudioAttributes] {
        &self.audio
    }
}
