//! Opus packet inspection.
//!
//! Parses the table-of-contents byte and the frame framing of an Opus packet
//! (RFC 6716, section 3) far enough to locate the first coded frame. This is
//! all that is needed to tell whether a packet carries an in-band redundant
//! copy of the previous frame (SILK LBRR), independently of the libopus
//! version the codec backend is linked against.

use crate::utils::errors::PacketError;

/// Longest audio a single packet may carry, in samples at 48 kHz (120 ms).
pub const MAX_PACKET_SAMPLES_48K: usize = 5760;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketMode {
    SilkOnly,
    Hybrid,
    CeltOnly,
}

/// Decoded table-of-contents byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toc {
    pub config: u8,
    pub stereo: bool,
    pub code: u8,
}

impl Toc {
    pub fn from_byte(toc: u8) -> Self {
        Self {
            config: toc >> 3,
            stereo: toc & 0x04 != 0,
            code: toc & 0x03,
        }
    }

    pub fn mode(&self) -> PacketMode {
        match self.config {
            0..=11 => PacketMode::SilkOnly,
            12..=15 => PacketMode::Hybrid,
            _ => PacketMode::CeltOnly,
        }
    }

    /// Duration of one frame in samples at `sample_rate`.
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        let sample_rate = sample_rate as usize;
        let size = (self.config & 0x03) as usize;
        match self.mode() {
            PacketMode::CeltOnly => (sample_rate << size) / 400,
            PacketMode::Hybrid => {
                if self.config & 0x01 != 0 {
                    sample_rate / 50
                } else {
                    sample_rate / 100
                }
            }
            PacketMode::SilkOnly => {
                if size == 3 {
                    sample_rate * 60 / 1000
                } else {
                    (sample_rate << size) / 100
                }
            }
        }
    }
}

/// Frame layout of a parsed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketLayout<'a> {
    pub toc: Toc,
    pub frame_count: usize,
    pub first_frame: &'a [u8],
}

/// Reads a frame length coded on one or two bytes.
fn read_frame_length(data: &[u8], pos: &mut usize) -> Result<usize, PacketError> {
    let first = *data
        .get(*pos)
        .ok_or(PacketError::Truncated("frame length"))? as usize;
    *pos += 1;
    if first < 252 {
        return Ok(first);
    }
    let second = *data
        .get(*pos)
        .ok_or(PacketError::Truncated("frame length"))? as usize;
    *pos += 1;
    Ok(second * 4 + first)
}

/// Splits a packet into its TOC and first frame.
pub fn parse(packet: &[u8]) -> Result<PacketLayout<'_>, PacketError> {
    let (&toc_byte, _) = packet.split_first().ok_or(PacketError::Empty)?;
    let toc = Toc::from_byte(toc_byte);
    let mut pos = 1usize;

    let (frame_count, first_len) = match toc.code {
        0 => (1, packet.len() - pos),
        1 => {
            let payload = packet.len() - pos;
            if payload % 2 != 0 {
                return Err(PacketError::UnevenCbrPair(payload));
            }
            (2, payload / 2)
        }
        2 => {
            let len = read_frame_length(packet, &mut pos)?;
            if pos + len > packet.len() {
                return Err(PacketError::Truncated("first frame"));
            }
            (2, len)
        }
        _ => {
            let count_byte = *packet
                .get(pos)
                .ok_or(PacketError::Truncated("frame count"))?;
            pos += 1;
            let vbr = count_byte & 0x80 != 0;
            let padded = count_byte & 0x40 != 0;
            let count = count_byte & 0x3F;
            let per_frame = toc.samples_per_frame(48000);
            if count == 0 || count as usize * per_frame > MAX_PACKET_SAMPLES_48K {
                return Err(PacketError::InvalidFrameCount(count));
            }

            let mut padding = 0usize;
            if padded {
                loop {
                    let byte = *packet
                        .get(pos)
                        .ok_or(PacketError::Truncated("padding length"))?;
                    pos += 1;
                    if byte == 255 {
                        padding += 254;
                    } else {
                        padding += byte as usize;
                        break;
                    }
                }
            }

            let first_len = if vbr {
                let first = read_frame_length(packet, &mut pos)?;
                for _ in 1..count.saturating_sub(1) {
                    read_frame_length(packet, &mut pos)?;
                }
                first
            } else {
                let body = packet
                    .len()
                    .checked_sub(pos + padding)
                    .ok_or(PacketError::Truncated("padding"))?;
                if body % count as usize != 0 {
                    return Err(PacketError::UnevenCbrFrames {
                        len: body,
                        frames: count,
                    });
                }
                body / count as usize
            };

            if pos + padding + first_len > packet.len() {
                return Err(PacketError::Truncated("first frame"));
            }
            (count as usize, first_len)
        }
    };

    Ok(PacketLayout {
        toc,
        frame_count,
        first_frame: &packet[pos..pos + first_len],
    })
}

/// Whether the packet embeds a low bit-rate copy of the preceding frame.
///
/// Only SILK and hybrid packets can carry one. The flag sits right after
/// the per-frame voice activity bits of the first SILK frame, once for the
/// mid channel and once more for the side channel of stereo packets.
pub fn has_redundancy_tail(packet: &[u8]) -> Result<bool, PacketError> {
    let layout = parse(packet)?;
    if layout.toc.mode() == PacketMode::CeltOnly {
        return Ok(false);
    }

    let Some(&first) = layout.first_frame.first() else {
        return Ok(false);
    };

    let frame_size = layout.toc.samples_per_frame(48000);
    let silk_frames = if frame_size > 960 { frame_size / 960 } else { 1 };

    let mut lbrr = (first >> (7 - silk_frames)) & 1 != 0;
    if layout.toc.stereo {
        lbrr |= (first >> (6 - 2 * silk_frames)) & 1 != 0;
    }
    Ok(lbrr)
}
