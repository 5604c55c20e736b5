use log::debug;

use super::toc;
use super::{
    Capabilities, CodecBackend, DecoderSettings, EncoderSettings, FrameDecoder, FrameEncoder,
};
use crate::structs::format::StreamFormat;
use crate::utils::errors::CodecError;

/// Opus through the `opus` crate bindings.
///
/// The bound libopus predates the deep redundancy (DRED) API, so the
/// decoder reports no recoverable side-channel history and gap filling
/// falls through to the other strategies.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpusBackend;

fn channels_of(format: StreamFormat, component: &'static str) -> Result<opus::Channels, CodecError> {
    match format.channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        n => Err(CodecError::Initialization {
            component,
            reason: format!("Opus supports 1 or 2 channels, got {n}"),
        }),
    }
}

impl CodecBackend for OpusBackend {
    type Encoder = OpusFrameEncoder;
    type Decoder = OpusFrameDecoder;

    fn name(&self) -> &'static str {
        "opus"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            encoder_complexity: false,
            decoder_complexity: false,
            deep_redundancy: false,
        }
    }

    fn create_encoder(
        &self,
        format: StreamFormat,
        settings: &EncoderSettings,
    ) -> Result<Self::Encoder, CodecError> {
        let init_err = |e: opus::Error| CodecError::Initialization {
            component: "Opus encoder",
            reason: e.to_string(),
        };

        let channels = channels_of(format, "Opus encoder")?;
        let mut encoder =
            opus::Encoder::new(format.sample_rate, channels, opus::Application::Audio)
                .map_err(init_err)?;

        let bitrate = match settings.bit_rate {
            Some(bits) => opus::Bitrate::Bits(bits as i32),
            None => opus::Bitrate::Auto,
        };
        encoder.set_bitrate(bitrate).map_err(init_err)?;
        debug!("Opus encoder bit rate set to {:?} bps (None = auto)", settings.bit_rate);

        if settings.packet_loss_percent > 0 {
            encoder.set_inband_fec(true).map_err(init_err)?;
            encoder
                .set_packet_loss_perc(settings.packet_loss_percent as i32)
                .map_err(init_err)?;
            debug!(
                "Opus in-band FEC enabled, expected loss {}%",
                settings.packet_loss_percent
            );
        }

        Ok(OpusFrameEncoder {
            encoder,
            channels: format.channels as usize,
        })
    }

    fn create_decoder(
        &self,
        format: StreamFormat,
        _settings: &DecoderSettings,
    ) -> Result<Self::Decoder, CodecError> {
        let channels = channels_of(format, "Opus decoder")?;
        let decoder = opus::Decoder::new(format.sample_rate, channels).map_err(|e| {
            CodecError::Initialization {
                component: "Opus decoder",
                reason: e.to_string(),
            }
        })?;

        Ok(OpusFrameDecoder {
            decoder,
            channels: format.channels as usize,
        })
    }
}

pub struct OpusFrameEncoder {
    encoder: opus::Encoder,
    channels: usize,
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError> {
        // Never larger than the raw frame, doubled for headroom.
        let frame_size = pcm.len() / self.channels;
        let max_packet = (frame_size * self.channels * size_of::<i16>() * 2).max(256);

        let mut packet = vec![0u8; max_packet];
        let written = self
            .encoder
            .encode(pcm, &mut packet)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        packet.truncate(written);
        Ok(packet)
    }
}

pub struct OpusFrameDecoder {
    decoder: opus::Decoder,
    channels: usize,
}

impl OpusFrameDecoder {
    fn run(&mut self, payload: &[u8], out: &mut [i16], fec: bool) -> Result<usize, CodecError> {
        let usable = out.len() - out.len() % self.channels;
        self.decoder
            .decode(payload, &mut out[..usable], fec)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl FrameDecoder for OpusFrameDecoder {
    fn decode(&mut self, payload: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
        self.run(payload, out, false)
    }

    fn has_redundancy_tail(&self, payload: &[u8]) -> bool {
        toc::has_redundancy_tail(payload).unwrap_or(false)
    }

    fn decode_redundancy_tail(
        &mut self,
        payload: &[u8],
        out: &mut [i16],
    ) -> Result<usize, CodecError> {
        self.run(payload, out, true)
    }

    fn parse_deep_redundancy(
        &mut self,
        _payload: &[u8],
        _max_samples: usize,
    ) -> Result<usize, CodecError> {
        Ok(0)
    }

    fn decode_deep_redundancy(
        &mut self,
        _offset: usize,
        _out: &mut [i16],
    ) -> Result<usize, CodecError> {
        Err(CodecError::Unsupported("deep redundancy decoding"))
    }

    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError> {
        self.run(&[], out, false)
    }

    fn last_frame_duration(&mut self) -> Result<usize, CodecError> {
        self.decoder
            .get_last_packet_duration()
            .map(|d| d as usize)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_surround() {
        let result = OpusBackend.create_decoder(StreamFormat::new(48000, 6), &DecoderSettings::default());
        assert!(matches!(result, Err(CodecError::Initialization { .. })));
    }

    #[test]
    fn test_frame_roundtrip_length() {
        let format = StreamFormat::new(48000, 2);
        let mut encoder = OpusBackend
            .create_encoder(format, &EncoderSettings::default())
            .unwrap();
        let mut decoder = OpusBackend
            .create_decoder(format, &DecoderSettings::default())
            .unwrap();

        let pcm = vec![0i16; 480 * 2];
        let packet = encoder.encode(&pcm).unwrap();
        let mut out = vec![0i16; super::super::MAX_FRAME_SAMPLES * 2];
        assert_eq!(decoder.decode(&packet, &mut out).unwrap(), 480);
        assert_eq!(decoder.last_frame_duration().unwrap(), 480);

        let mut concealed = vec![0i16; 480 * 2];
        assert_eq!(decoder.conceal(&mut concealed).unwrap(), 480);
    }
}
