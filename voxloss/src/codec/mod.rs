//! Speech codec interface.
//!
//! The pipeline treats the codec as an external collaborator. A
//! [`CodecBackend`] creates one [`FrameEncoder`] per encode pass and one
//! [`FrameDecoder`] per decode session; the decoder exposes the three
//! concealment primitives the loss-resilient decoder chooses between.

use crate::structs::format::StreamFormat;
use crate::utils::errors::CodecError;

pub mod toc;

/// Opus backend over libopus.
#[cfg(feature = "opus")]
pub mod libopus;

#[cfg(test)]
pub(crate) mod scripted;

/// Duration of one encoded frame.
pub const FRAME_PERIOD_MS: u32 = 10;

/// Largest frame a decoder may return, in samples per channel (120 ms at 48 kHz).
pub const MAX_FRAME_SAMPLES: usize = 5760;

/// Upper bound for the deep redundancy duration, in frames of 10 ms.
pub const MAX_DEEP_REDUNDANCY_FRAMES: u8 = 104;

/// Encoder tuning taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    /// 0 (fastest) to 10 (best). `None` keeps the codec default.
    pub complexity: Option<u8>,

    /// Expected loss, also used as the simulated drop probability.
    /// Non-zero values enable in-band forward error correction.
    pub packet_loss_percent: u8,

    /// Target bit rate in bits per second. `None` lets the codec decide.
    pub bit_rate: Option<u32>,

    /// Deep redundancy duration in 10 ms units. 0 disables it.
    pub deep_redundancy_frames: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            complexity: None,
            packet_loss_percent: 0,
            bit_rate: None,
            deep_redundancy_frames: 0,
        }
    }
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(complexity) = self.complexity {
            if complexity > 10 {
                return Err(CodecError::InvalidSetting(format!(
                    "encoder complexity must be 0-10, got {complexity}"
                )));
            }
        }
        if self.packet_loss_percent > 100 {
            return Err(CodecError::InvalidSetting(format!(
                "packet loss must be 0-100%, got {}",
                self.packet_loss_percent
            )));
        }
        if let Some(bit_rate) = self.bit_rate {
            if !(500..=512_000).contains(&bit_rate) {
                return Err(CodecError::InvalidSetting(format!(
                    "bit rate must be 500-512000 bps, got {bit_rate}"
                )));
            }
        }
        if self.deep_redundancy_frames > MAX_DEEP_REDUNDANCY_FRAMES {
            return Err(CodecError::InvalidSetting(format!(
                "deep redundancy duration must be at most {MAX_DEEP_REDUNDANCY_FRAMES}, got {}",
                self.deep_redundancy_frames
            )));
        }
        Ok(())
    }
}

/// Decoder tuning taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSettings {
    /// 0 to 10. `None` keeps the codec default.
    pub complexity: Option<u8>,

    /// Ceiling for the history requested from the deep redundancy side
    /// channel when filling one gap.
    pub max_deep_redundancy_ms: u32,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            complexity: None,
            max_deep_redundancy_ms: 1000,
        }
    }
}

impl DecoderSettings {
    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(complexity) = self.complexity {
            if complexity > 10 {
                return Err(CodecError::InvalidSetting(format!(
                    "decoder complexity must be 0-10, got {complexity}"
                )));
            }
        }
        Ok(())
    }
}

/// Which optional tuning knobs a backend can honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub encoder_complexity: bool,
    pub decoder_complexity: bool,
    pub deep_redundancy: bool,
}

pub trait FrameEncoder {
    /// Encodes exactly one frame of interleaved samples.
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError>;
}

pub trait FrameDecoder {
    /// Decodes a received packet into `out`.
    ///
    /// Returns the number of samples per channel written.
    fn decode(&mut self, payload: &[u8], out: &mut [i16]) -> Result<usize, CodecError>;

    /// Whether `payload` embeds a redundant copy of the frame before it.
    fn has_redundancy_tail(&self, payload: &[u8]) -> bool;

    /// Recovers the frame preceding `payload` from its embedded copy.
    ///
    /// `out` is sized to exactly the frame to recover.
    fn decode_redundancy_tail(&mut self, payload: &[u8], out: &mut [i16])
    -> Result<usize, CodecError>;

    /// Parses deep redundancy out of `payload`, looking back at most
    /// `max_samples` samples per channel.
    ///
    /// Returns how many samples per channel before the packet can be
    /// recovered, 0 when the packet carries none. An error means the side
    /// channel is corrupt.
    fn parse_deep_redundancy(
        &mut self,
        payload: &[u8],
        max_samples: usize,
    ) -> Result<usize, CodecError>;

    /// Decodes one frame from the last parsed side channel, starting
    /// `offset` samples per channel before the packet it was parsed from.
    fn decode_deep_redundancy(&mut self, offset: usize, out: &mut [i16])
    -> Result<usize, CodecError>;

    /// Synthesizes one frame from decoder history alone.
    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError>;

    /// Duration of the last frame produced, in samples per channel.
    fn last_frame_duration(&mut self) -> Result<usize, CodecError>;
}

pub trait CodecBackend {
    type Encoder: FrameEncoder;
    type Decoder: FrameDecoder;

    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn create_encoder(
        &self,
        format: StreamFormat,
        settings: &EncoderSettings,
    ) -> Result<Self::Encoder, CodecError>;

    fn create_decoder(
        &self,
        format: StreamFormat,
        settings: &DecoderSettings,
    ) -> Result<Self::Decoder, CodecError>;
}

#[test]
fn test_settings_validation() {
    assert!(EncoderSettings::default().validate().is_ok());

    let settings = EncoderSettings {
        complexity: Some(11),
        ..Default::default()
    };
    assert!(settings.validate().is_err());

    let settings = EncoderSettings {
        bit_rate: Some(499),
        ..Default::default()
    };
    assert!(settings.validate().is_err());

    let settings = EncoderSettings {
        packet_loss_percent: 101,
        ..Default::default()
    };
    assert!(settings.validate().is_err());

    let settings = EncoderSettings {
        complexity: Some(10),
        packet_loss_percent: 100,
        bit_rate: Some(512_000),
        deep_redundancy_frames: MAX_DEEP_REDUNDANCY_FRAMES,
    };
    assert!(settings.validate().is_ok());

    let settings = DecoderSettings {
        complexity: Some(12),
        ..Default::default()
    };
    assert!(settings.validate().is_err());
}
