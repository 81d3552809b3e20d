//! Resolve interleaved units down to a single angle.
//!
//! Multi-angle cells physically interleave the angles' sectors, so the cell
//! range in the IFO covers every angle at once. The DSI navigation packets
//! embedded in the MPEG program stream describe, per interleaved unit, how
//! far the unit runs and where the next unit of the same angle starts. This
//! walk reads just those packets and emits the sector ranges belonging to
//! the first angle.

use std::io::{self, Read, Seek, SeekFrom};

use log::debug;
use thiserror::Error;

use crate::composite::CompositeFile;
use crate::DVD_BLOCK_LEN;

/// DSI packets are Private Stream 2 packets of exactly this length.
const DSI_PACKET_LEN: u16 = 1018;
const DSI_SUBSTREAM_ID: u8 = 1;

const STREAM_ID_PACK_HEADER: u8 = 0xBA;
const STREAM_ID_PRIVATE_2: u8 = 0xBF;

#[derive(Debug, Error)]
pub enum IlvuError {
    /// The bytes at the cursor are not an MPEG program-stream packet. The
    /// cell is not walkable; callers fall back to its raw sector range.
    #[error("packet header id {0:#08x} doesn't match 0x000001")]
    BadStartCode(u32),

    /// The stream ended in the middle of a packet or DSI payload.
    #[error("truncated program stream while scanning for a DSI packet")]
    Truncated,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scan forward from the current position to the next DSI packet. Returns
/// its payload (the 1017 bytes after the substream id), or `None` at a
/// clean end of stream.
fn next_dsi_packet(cfile: &mut CompositeFile) -> Result<Option<Vec<u8>>, IlvuError> {
    loop {
        let mut start_code = [0u8; 3];
        match read_all(cfile, &mut start_code)? {
            0 => return Ok(None),
            3 => {}
            _ => return Err(IlvuError::Truncated),
        }
        if start_code != [0x00, 0x00, 0x01] {
            return Err(IlvuError::BadStartCode(
                (u32::from(start_code[0]) << 16)
                    | (u32::from(start_code[1]) << 8)
                    | u32::from(start_code[2]),
            ));
        }

        let stream_id = read_u8(cfile)?;
        if stream_id == STREAM_ID_PACK_HEADER {
            // The pack header has a fixed 10-byte body followed by stuffing
            // bytes counted in the low bits of its last byte.
            let mut body = [0u8; 10];
            if read_all(cfile, &mut body)? != 10 {
                return Err(IlvuError::Truncated);
            }
            let stuffing = i64::from(body[9] & 0x07);
            cfile.seek(SeekFrom::Current(stuffing))?;
            continue;
        }

        let len = u16::from_be_bytes([read_u8(cfile)?, read_u8(cfile)?]);
        if stream_id == STREAM_ID_PRIVATE_2 {
            let substream_id = read_u8(cfile)?;
            if len == DSI_PACKET_LEN && substream_id == DSI_SUBSTREAM_ID {
                let mut payload = vec![0u8; usize::from(DSI_PACKET_LEN) - 1];
                if read_all(cfile, &mut payload)? != payload.len() {
                    return Err(IlvuError::Truncated);
                }
                return Ok(Some(payload));
            }
            cfile.seek(SeekFrom::Current(i64::from(len) - 1))?;
        } else {
            cfile.seek(SeekFrom::Current(i64::from(len)))?;
        }
    }
}

/// Walk the interleaved units of the cell `[start, end]` and return the
/// sector ranges of the first angle, in playback order.
///
/// If the first DSI found says the cell is not interleaved at all, the raw
/// range comes back unchanged.
pub fn compute_real_sectors(
    start: u32,
    end: u32,
    cfile: &mut CompositeFile,
) -> Result<Vec<(u32, u32)>, IlvuError> {
    cfile.open()?;

    let mut ranges = Vec::new();
    let mut cursor = start;
    let mut first = true;

    while cursor >= start && cursor <= end {
        // Leaving the backing files entirely ends the walk.
        if cfile
            .seek(SeekFrom::Start(u64::from(cursor) * DVD_BLOCK_LEN))
            .is_err()
        {
            break;
        }

        let Some(dsi) = next_dsi_packet(cfile)? else {
            break;
        };
        if dsi.len() < 42 {
            return Err(IlvuError::Truncated);
        }

        let category = dsi[32];
        if category & 0x40 == 0 && first {
            // Not interleaved after all; the raw range stands.
            return Ok(vec![(start, end)]);
        }

        // Both fields are sector distances from the cursor: to the last
        // sector of this unit, and to the next unit of the same angle.
        let end_ilvu_block = u32::from_be_bytes([dsi[34], dsi[35], dsi[36], dsi[37]]);
        let next_ilvu_block = u32::from_be_bytes([dsi[38], dsi[39], dsi[40], dsi[41]]);

        if category & 0x60 != 0x60 {
            // Inside a unit rather than at its start; skip ahead.
            debug!("sector {cursor} is not an ILVU start, skipping");
            if next_ilvu_block == 0 {
                break;
            }
            cursor = cursor.saturating_add(next_ilvu_block);
            continue;
        }

        ranges.push((cursor, cursor.saturating_add(end_ilvu_block)));
        first = false;

        if next_ilvu_block == 0 {
            break;
        }
        cursor = cursor.saturating_add(next_ilvu_block);
    }

    Ok(ranges)
}

fn read_u8(cfile: &mut CompositeFile) -> Result<u8, IlvuError> {
    let mut buf = [0u8; 1];
    if read_all(cfile, &mut buf)? != 1 {
        return Err(IlvuError::Truncated);
    }
    Ok(buf[0])
}

fn read_all(cfile: &mut CompositeFile, buf: &mut [u8]) -> Result<usize, IlvuError> {
    Ok(cfile.read(buf)?)
}
