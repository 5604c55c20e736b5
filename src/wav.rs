use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use log::warn;
use voxloss::structs::buffer::AudioBuffer;
use voxlossd_macros::{LeBytes, riff_chunk};

use crate::byteorder::{ReadBytesLe, WriteBytesLe};

/// Size of the canonical header: RIFF, fmt and data chunk headers.
pub const HEADER_SIZE: usize = 44;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;

const PCM_FORMAT: u16 = 1;

#[derive(thiserror::Error, Debug)]
pub enum WavError {
    #[error("Expected {expected:?} tag, found {found:?}")]
    BadMagic {
        expected: &'static str,
        found: String,
    },

    #[error("Format chunk must be 16 bytes, got {0}")]
    FormatChunkSize(u32),

    #[error("Only PCM (format code 1) is supported, got format code {0}")]
    UnsupportedFormat(u16),

    #[error("Only 16-bit samples are supported, got {0} bits")]
    UnsupportedBitDepth(u16),

    #[error("Channel count is 0")]
    NoChannels,

    #[error("{channels} channels at {sample_rate} Hz overflow the header's byte rate fields")]
    FormatOverflow { sample_rate: u32, channels: u16 },

    #[error("Truncated {what}: expected {expected} bytes, found {found}")]
    Truncated {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Body of a RIFF chunk identified by a four-byte tag.
pub trait RiffChunk {
    const ID: [u8; 4];

    fn chunk_body(&self) -> Vec<u8>;

    fn chunk_header(&self) -> ChunkHeader {
        ChunkHeader {
            id: Self::ID,
            size: self.chunk_body().len() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, LeBytes)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    pub size: u32,
}

#[riff_chunk(b"fmt ")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, LeBytes)]
pub struct FormatChunk {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Result<Self, WavError> {
        let (block_align, byte_rate) = frame_sizes(sample_rate, channels)?;
        Ok(Self {
            audio_format: PCM_FORMAT,
            channels,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample: 16,
        })
    }
}

/// The fixed 44-byte header of a canonical PCM WAV file.
#[derive(Debug, Clone, PartialEq, Eq, LeBytes)]
pub struct WavHeader {
    pub riff: ChunkHeader,
    pub wave: [u8; 4],
    pub fmt: ChunkHeader,
    pub format: FormatChunk,
    pub data: ChunkHeader,
}

impl WavHeader {
    pub fn new(format: FormatChunk, data_size: u32) -> Self {
        Self {
            riff: ChunkHeader {
                id: *b"RIFF",
                size: 36 + data_size,
            },
            wave: *b"WAVE",
            fmt: format.chunk_header(),
            format,
            data: ChunkHeader {
                id: *b"data",
                size: data_size,
            },
        }
    }

    fn validate(&self) -> Result<(), WavError> {
        check_tag("RIFF", &self.riff.id)?;
        check_tag("WAVE", &self.wave)?;
        check_tag("fmt ", &self.fmt.id)?;
        if self.fmt.size != 16 {
            return Err(WavError::FormatChunkSize(self.fmt.size));
        }
        if self.format.audio_format != PCM_FORMAT {
            return Err(WavError::UnsupportedFormat(self.format.audio_format));
        }
        if self.format.bits_per_sample != 16 {
            return Err(WavError::UnsupportedBitDepth(self.format.bits_per_sample));
        }
        if self.format.channels == 0 {
            return Err(WavError::NoChannels);
        }
        frame_sizes(self.format.sample_rate, self.format.channels)?;
        check_tag("data", &self.data.id)
    }
}

/// Block align and byte rate of 16-bit PCM, if they fit the header fields.
fn frame_sizes(sample_rate: u32, channels: u16) -> Result<(u16, u32), WavError> {
    let overflow = WavError::FormatOverflow {
        sample_rate,
        channels,
    };
    let Some(block_align) = channels.checked_mul(2) else {
        return Err(overflow);
    };
    match sample_rate.checked_mul(block_align as u32) {
        Some(byte_rate) => Ok((block_align, byte_rate)),
        None => Err(overflow),
    }
}

fn check_tag(expected: &'static str, found: &[u8; 4]) -> Result<(), WavError> {
    if found != expected.as_bytes() {
        return Err(WavError::BadMagic {
            expected,
            found: String::from_utf8_lossy(found).into_owned(),
        });
    }
    Ok(())
}

/// A parsed WAV file.
#[derive(Debug, Clone)]
pub struct WavFile {
    pub header: WavHeader,
    pub samples: Vec<i16>,
}

impl WavFile {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.header.format.channels as usize
    }

    pub fn into_buffer(self) -> anyhow::Result<AudioBuffer> {
        let format = self.header.format;
        Ok(AudioBuffer::new(
            self.samples,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
        )?)
    }
}

/// Parses a canonical 44-byte-header PCM WAV file.
///
/// Bytes after the data chunk are ignored. A trailing partial frame is
/// dropped.
pub fn parse_wav(bytes: &[u8]) -> Result<WavFile, WavError> {
    if bytes.len() < HEADER_SIZE {
        return Err(WavError::Truncated {
            what: "header",
            expected: HEADER_SIZE,
            found: bytes.len(),
        });
    }

    let (mut head, body) = bytes.split_at(HEADER_SIZE);
    let header = WavHeader::read_le(&mut head)?;
    header.validate()?;

    let data_size = header.data.size as usize;
    let data = body.get(..data_size).ok_or(WavError::Truncated {
        what: "data chunk",
        expected: data_size,
        found: body.len(),
    })?;

    let frame_bytes = header.format.channels as usize * 2;
    let whole = data_size - data_size % frame_bytes;
    if whole != data_size {
        warn!(
            "Dropping {} trailing bytes that do not form a whole frame",
            data_size - whole
        );
    }

    let samples = data[..whole]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    Ok(WavFile { header, samples })
}

/// Canonical PCM WAV writer for 16-bit samples.
///
/// Sizes in the header are placeholders until [`finish`](Self::finish).
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: FormatChunk,
    data_written: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> Result<Self, WavError> {
        Ok(Self {
            writer: BufWriter::new(writer),
            format: FormatChunk::pcm16(sample_rate, channels)?,
            data_written: 0,
        })
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        WavHeader::new(self.format, 0).write_le(&mut bytes);
        self.writer.write_all(&bytes)
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        samples.write_le(&mut bytes);
        self.writer.write_all(&bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Patches the RIFF and data chunk sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        let data_size = u32::try_from(self.data_written)
            .ok()
            .filter(|size| size.checked_add(36).is_some())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} bytes of audio do not fit in a WAV file", self.data_written),
                )
            })?;

        self.writer.flush()?;
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.writer.write_all(&(36 + data_size).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Writes the whole buffer as a WAV file.
pub fn write_wav<W: Write + Seek>(writer: W, buffer: &AudioBuffer) -> Result<W, WavError> {
    let mut writer = WavWriter::new(writer, buffer.sample_rate(), buffer.channels())?;
    writer.write_header()?;
    writer.write_samples(buffer.samples())?;
    writer.finish()?;
    Ok(writer.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let buffer = AudioBuffer::new(samples.to_vec(), sample_rate, channels, 16).unwrap();
        write_wav(Cursor::new(Vec::new()), &buffer)
            .unwrap()
            .into_inner()
    }

    #[test]
    fn test_header_layout() {
        let bytes = wav_bytes(&[1, -1, 2, -2], 48000, 2);
        assert_eq!(bytes.len(), HEADER_SIZE + 8);

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 36 + 8);
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 48000);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 192000);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 4);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 8);
        assert_eq!(&bytes[44..46], &1i16.to_le_bytes());
    }

    #[test]
    fn test_parse_written_file() {
        let samples = [100, -200, 300, i16::MIN, i16::MAX, 0];
        let wav = parse_wav(&wav_bytes(&samples, 16000, 1)).unwrap();
        assert_eq!(wav.samples, samples);
        assert_eq!(wav.header.format, FormatChunk::pcm16(16000, 1).unwrap());
        assert_eq!(wav.frames(), 6);

        let buffer = wav.into_buffer().unwrap();
        assert_eq!(buffer.sample_rate(), 16000);
    }

    #[test]
    fn test_rejects_malformed() {
        let good = wav_bytes(&[0; 4], 48000, 2);

        let mut bad = good.clone();
        bad[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(parse_wav(&bad), Err(WavError::BadMagic { expected: "RIFF", .. })));

        let mut bad = good.clone();
        bad[20] = 3; // IEEE float
        assert!(matches!(parse_wav(&bad), Err(WavError::UnsupportedFormat(3))));

        let mut bad = good.clone();
        bad[34] = 24;
        assert!(matches!(parse_wav(&bad), Err(WavError::UnsupportedBitDepth(24))));

        let mut bad = good.clone();
        bad[16] = 18; // extended fmt chunk
        assert!(matches!(parse_wav(&bad), Err(WavError::FormatChunkSize(18))));

        let mut bad = good.clone();
        bad[36..40].copy_from_slice(b"LIST");
        assert!(matches!(parse_wav(&bad), Err(WavError::BadMagic { expected: "data", .. })));

        assert!(matches!(
            parse_wav(&good[..30]),
            Err(WavError::Truncated { what: "header", .. })
        ));
        assert!(matches!(
            parse_wav(&good[..good.len() - 1]),
            Err(WavError::Truncated { what: "data chunk", .. })
        ));
    }

    #[test]
    fn test_partial_frame_dropped() {
        let mut bytes = wav_bytes(&[1, 2, 3, 4], 8000, 2);
        // Claim one extra sample
        bytes[40] = 10;
        bytes.extend_from_slice(&5i16.to_le_bytes());
        let wav = parse_wav(&bytes).unwrap();
        assert_eq!(wav.samples, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_writer_patches_sizes() -> Result<(), WavError> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 8000, 1)?;
        writer.write_header()?;
        writer.write_samples(&[1, 2, 3])?;
        writer.write_samples(&[4])?;
        writer.finish()?;

        let bytes = writer.into_inner()?.into_inner();
        let wav = parse_wav(&bytes).unwrap();
        assert_eq!(wav.header.riff.size, 44);
        assert_eq!(wav.header.data.size, 8);
        assert_eq!(wav.samples, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_oversized_format_rejected() {
        // 40000 channels: block align no longer fits in 16 bits.
        let mut bytes = wav_bytes(&[0; 2], 8000, 1);
        bytes[22..24].copy_from_slice(&40000u16.to_le_bytes());
        bytes[40..44].copy_from_slice(&80000u32.to_le_bytes());
        bytes.resize(HEADER_SIZE + 80000, 0);
        assert!(matches!(
            parse_wav(&bytes),
            Err(WavError::FormatOverflow {
                channels: 40000,
                ..
            })
        ));

        // Byte rate past u32 with a valid block align.
        let mut bytes = wav_bytes(&[0; 2], 8000, 1);
        bytes[24..28].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            parse_wav(&bytes),
            Err(WavError::FormatOverflow { .. })
        ));

        let buffer = AudioBuffer::new(vec![0; 40000], 8000, 40000, 16).unwrap();
        assert!(matches!(
            write_wav(Cursor::new(Vec::new()), &buffer),
            Err(WavError::FormatOverflow { .. })
        ));
        assert!(FormatChunk::pcm16(48000, 32767).is_ok());
    }
}
