use std::fmt::Display;

use crate::structs::buffer::AudioBuffer;

/// Sample rate and channel layout of an interleaved 16-bit PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn of(buffer: &AudioBuffer) -> Self {
        Self::new(buffer.sample_rate(), buffer.channels())
    }

    /// Samples per channel covering `millis` milliseconds.
    pub fn frames_per_ms(&self, millis: u32) -> usize {
        (self.sample_rate as u64 * millis as u64 / 1000) as usize
    }
}

impl Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz, {} ch", self.sample_rate, self.channels)
    }
}

#[test]
fn test_frames_per_ms() {
    let format = StreamFormat::new(48000, 2);
    assert_eq!(format.frames_per_ms(10), 480);
    assert_eq!(format.frames_per_ms(1000), 48000);
    assert_eq!(StreamFormat::new(44100, 1).frames_per_ms(10), 441);
}
