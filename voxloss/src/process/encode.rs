use anyhow::{Result, bail};
use log::{Level, debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{CodecBackend, EncoderSettings, FRAME_PERIOD_MS, FrameEncoder};
use crate::log_or_err;
use crate::process::Handler;
use crate::structs::buffer::AudioBuffer;
use crate::structs::format::StreamFormat;
use crate::utils::errors::CodecError;

/// Independent per-packet drop decision.
///
/// Every packet is kept or dropped by a uniform draw in `[0, 100)` compared
/// against the loss percentage, so 0 never drops and 100 always does.
#[derive(Debug)]
pub struct LossyChannel {
    loss_percent: u8,
    rng: StdRng,
    sent: u64,
    dropped: u64,
}

impl LossyChannel {
    /// `seed` makes the drop pattern reproducible; `None` seeds from entropy.
    pub fn new(loss_percent: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            loss_percent: loss_percent.min(100),
            rng,
            sent: 0,
            dropped: 0,
        }
    }

    /// Returns whether the next packet reaches the receiver.
    pub fn admit(&mut self) -> bool {
        self.sent += 1;
        let draw: u8 = self.rng.gen_range(0..100);
        if draw < self.loss_percent {
            self.dropped += 1;
            false
        } else {
            true
        }
    }

    pub fn loss_percent(&self) -> u8 {
        self.loss_percent
    }

    /// Packets offered to the channel.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    /// Frames encoded, dropped ones included.
    pub sent: u64,
    pub dropped: u64,
    /// Payload bytes of the packets that were kept.
    pub encoded_bytes: usize,
}

struct EncoderSession<E> {
    encoder: E,
    format: StreamFormat,
}

/// Handler encoding the buffer into packets and passing them through a
/// [`LossyChannel`].
///
/// The PCM is left untouched; surviving packets are appended to the buffer
/// with sequence numbers that keep counting across dropped ones.
pub struct PacketEncoder<B: CodecBackend> {
    backend: B,
    settings: EncoderSettings,
    channel: LossyChannel,
    session: Option<EncoderSession<B::Encoder>>,
    next_sequence: u32,
    stats: EncodeStats,
    fail_level: Level,
}

impl<B: CodecBackend> PacketEncoder<B> {
    pub fn new(backend: B, settings: EncoderSettings, seed: Option<u64>) -> Result<Self, CodecError> {
        settings.validate()?;
        let channel = LossyChannel::new(settings.packet_loss_percent, seed);
        Ok(Self {
            backend,
            settings,
            channel,
            session: None,
            next_sequence: 1,
            stats: EncodeStats::default(),
            fail_level: Level::Error,
        })
    }

    /// Sets the level at which unsupported settings become errors.
    ///
    /// - `log::Level::Error`: warn and carry on (default)
    /// - `log::Level::Warn`: fail (strict mode)
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn stats(&self) -> EncodeStats {
        self.stats
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn check_capabilities(&self) -> Result<()> {
        let capabilities = self.backend.capabilities();
        if self.settings.complexity.is_some() && !capabilities.encoder_complexity {
            log_or_err!(
                self,
                Level::Warn,
                CodecError::Unsupported("encoder complexity, ignoring it")
            );
        }
        if self.settings.deep_redundancy_frames > 0 && !capabilities.deep_redundancy {
            log_or_err!(
                self,
                Level::Warn,
                CodecError::Unsupported("deep redundancy encoding, ignoring its duration")
            );
        }
        Ok(())
    }

    fn session(&mut self, format: StreamFormat) -> Result<&mut EncoderSession<B::Encoder>> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                self.check_capabilities()?;
                let encoder = self.backend.create_encoder(format, &self.settings)?;
                info!("{} encoder initialized for {format}", self.backend.name());
                EncoderSession { encoder, format }
            }
        };

        let session = self.session.insert(session);
        if session.format != format {
            bail!(
                "Stream format changed from {} to {format} between encode calls",
                session.format
            );
        }
        Ok(session)
    }
}

impl<B: CodecBackend> Handler for PacketEncoder<B> {
    fn name(&self) -> &'static str {
        "encoder"
    }

    fn handle(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let format = StreamFormat::of(buffer);
        let frame_len = format.frames_per_ms(FRAME_PERIOD_MS) * format.channels as usize;
        if frame_len == 0 {
            bail!("Sample rate {} Hz is too low for {FRAME_PERIOD_MS} ms frames", format.sample_rate);
        }

        let session = self.session(format)?;
        let mut packets = Vec::new();
        let mut padded = vec![0i16; frame_len];

        for chunk in buffer.samples().chunks(frame_len) {
            let pcm = if chunk.len() == frame_len {
                chunk
            } else {
                padded[..chunk.len()].copy_from_slice(chunk);
                padded[chunk.len()..].fill(0);
                &padded[..]
            };
            packets.push(session.encoder.encode(pcm)?);
        }

        let mut kept = 0usize;
        for payload in packets {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.stats.sent += 1;

            if self.channel.admit() {
                self.stats.encoded_bytes += payload.len();
                buffer.push_packet(sequence, payload)?;
                kept += 1;
            } else {
                self.stats.dropped += 1;
                trace!("Dropped packet {sequence}");
            }
        }

        debug!(
            "Channel drew {} times, dropped {}",
            self.channel.sent(),
            self.channel.dropped()
        );
        info!(
            "Encoded {} frames of {FRAME_PERIOD_MS} ms, kept {kept}, dropped {} at {}% loss",
            self.stats.sent,
            self.stats.dropped,
            self.channel.loss_percent()
        );
        Ok(())
    }
}
