use anyhow::{Result, bail};
use log::{Level, debug, info, trace, warn};

use crate::codec::{
    CodecBackend, DecoderSettings, FRAME_PERIOD_MS, FrameDecoder, MAX_FRAME_SAMPLES,
};
use crate::log_or_err;
use crate::process::Handler;
use crate::structs::buffer::{AudioBuffer, EncodedPacket};
use crate::structs::format::StreamFormat;
use crate::utils::errors::{CodecError, DecodeError};

/// How many lost frames each strategy recovered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConcealmentStats {
    /// Contiguous loss runs filled.
    pub gaps: u64,
    /// Frames recovered from the copy embedded in the next packet.
    pub redundancy_tail: u64,
    /// Frames recovered from deep redundancy history.
    pub deep_redundancy: u64,
    /// Frames synthesized from decoder state alone.
    pub blind: u64,
}

impl ConcealmentStats {
    pub fn concealed(&self) -> u64 {
        self.redundancy_tail + self.deep_redundancy + self.blind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    RedundancyTail,
    DeepRedundancy { offset: usize },
    Blind,
}

/// Decoder state for one packet stream.
///
/// Lives as long as the handler so codec history carries across calls.
struct DecoderSession<D> {
    decoder: D,
    format: StreamFormat,
    last_decoded_sequence: u32,
    stats: ConcealmentStats,
    /// Scratch for a single decoded frame, interleaved.
    frame: Vec<i16>,
    /// Upper bound for the deep redundancy request, in samples per channel.
    deep_window: usize,
}

impl<D: FrameDecoder> DecoderSession<D> {
    fn new(decoder: D, format: StreamFormat, settings: &DecoderSettings) -> Self {
        Self {
            decoder,
            format,
            last_decoded_sequence: 0,
            stats: ConcealmentStats::default(),
            frame: vec![0; MAX_FRAME_SAMPLES * format.channels as usize],
            deep_window: format.frames_per_ms(settings.max_deep_redundancy_ms),
        }
    }

    fn channels(&self) -> usize {
        self.format.channels as usize
    }

    /// Duration of the last frame the codec produced.
    ///
    /// Before anything was decoded the codec reports 0, in which case one
    /// nominal frame period is assumed.
    fn frame_duration(&mut self) -> usize {
        let nominal = self.format.frames_per_ms(FRAME_PERIOD_MS);
        match self.decoder.last_frame_duration() {
            Ok(0) => nominal,
            Ok(duration) => duration.min(MAX_FRAME_SAMPLES),
            Err(e) => {
                warn!("Cannot query the last frame duration, assuming {nominal}: {e}");
                nominal
            }
        }
    }

    fn decode_all(&mut self, packets: &[EncodedPacket]) -> Result<Vec<i16>, DecodeError> {
        let mut output = Vec::new();

        for (index, packet) in packets.iter().enumerate() {
            let current = packet.sequence_number;
            let gap = current as i64 - self.last_decoded_sequence as i64;

            if gap <= 0 {
                return Err(DecodeError::Sequence {
                    index,
                    previous: self.last_decoded_sequence,
                    current,
                });
            }
            if gap > 1 {
                self.fill_gap(packet, (gap - 1) as usize, &mut output)?;
            }

            self.decode_received(packet, &mut output)?;
            self.last_decoded_sequence = current;
        }

        Ok(output)
    }

    fn decode_received(
        &mut self,
        packet: &EncodedPacket,
        output: &mut Vec<i16>,
    ) -> Result<(), DecodeError> {
        let channels = self.channels();
        let produced = self
            .decoder
            .decode(&packet.payload, &mut self.frame)
            .map_err(|source| DecodeError::ReceivedPacket {
                sequence: packet.sequence_number,
                source,
            })?;
        output.extend_from_slice(&self.frame[..produced.min(MAX_FRAME_SAMPLES) * channels]);
        Ok(())
    }

    /// Reconstructs the `lost` frames preceding `current`, oldest first.
    fn fill_gap(
        &mut self,
        current: &EncodedPacket,
        lost: usize,
        output: &mut Vec<i16>,
    ) -> Result<(), DecodeError> {
        let sequence = current.sequence_number;
        let channels = self.channels();
        self.stats.gaps += 1;

        let duration = self.frame_duration();
        let request = (lost * duration).min(self.deep_window);
        let available = self
            .decoder
            .parse_deep_redundancy(&current.payload, request)
            .map_err(|e| DecodeError::CorruptSideChannel {
                sequence,
                reason: e.to_string(),
            })?;
        debug!(
            "Filling {lost} frames before packet {sequence}, {available} samples of deep redundancy"
        );

        for k in 0..lost {
            let duration = self.frame_duration();
            let offset = (lost - k) * duration;

            let strategy = if k == lost - 1 && self.decoder.has_redundancy_tail(&current.payload) {
                Strategy::RedundancyTail
            } else if available > 0 && offset <= available {
                Strategy::DeepRedundancy { offset }
            } else {
                Strategy::Blind
            };

            let produced = self.conceal_frame(current, strategy, duration * channels)?;
            trace!("Frame {k} of {lost} before packet {sequence}: {strategy:?}, {produced} samples");
            output.extend_from_slice(&self.frame[..produced.min(duration) * channels]);
        }
        Ok(())
    }

    /// Runs `strategy` into the first `len` samples of the scratch frame,
    /// falling back to blind concealment if it fails.
    fn conceal_frame(
        &mut self,
        current: &EncodedPacket,
        strategy: Strategy,
        len: usize,
    ) -> Result<usize, DecodeError> {
        let frame = &mut self.frame[..len];
        let attempt = match strategy {
            Strategy::RedundancyTail => Some(
                self.decoder
                    .decode_redundancy_tail(&current.payload, frame),
            ),
            Strategy::DeepRedundancy { offset } => {
                Some(self.decoder.decode_deep_redundancy(offset, frame))
            }
            Strategy::Blind => None,
        };

        match attempt {
            Some(Ok(produced)) => {
                match strategy {
                    Strategy::RedundancyTail => self.stats.redundancy_tail += 1,
                    Strategy::DeepRedundancy { .. } => self.stats.deep_redundancy += 1,
                    Strategy::Blind => self.stats.blind += 1,
                }
                return Ok(produced);
            }
            Some(Err(e)) => warn!(
                "{strategy:?} failed before packet {}, concealing blindly: {e}",
                current.sequence_number
            ),
            None => {}
        }

        let produced = self
            .decoder
            .conceal(&mut self.frame[..len])
            .map_err(|source| DecodeError::Concealment {
                sequence: current.sequence_number,
                source,
            })?;
        self.stats.blind += 1;
        Ok(produced)
    }
}

/// Handler rebuilding continuous PCM from the buffer's packets.
///
/// Gaps in the sequence numbers are filled frame by frame, preferring the
/// redundant copy in the next packet, then deep redundancy history, then
/// blind concealment.
pub struct PacketDecoder<B: CodecBackend> {
    backend: B,
    settings: DecoderSettings,
    session: Option<DecoderSession<B::Decoder>>,
    fail_level: Level,
}

impl<B: CodecBackend> PacketDecoder<B> {
    pub fn new(backend: B, settings: DecoderSettings) -> Result<Self, CodecError> {
        settings.validate()?;
        Ok(Self {
            backend,
            settings,
            session: None,
            fail_level: Level::Error,
        })
    }

    /// Sets the level at which unsupported settings become errors.
    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn stats(&self) -> ConcealmentStats {
        self.session
            .as_ref()
            .map(|s| s.stats)
            .unwrap_or_default()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Sequence number of the last packet decoded, 0 before the first.
    pub fn last_decoded_sequence(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(0, |s| s.last_decoded_sequence)
    }

    fn session(&mut self, format: StreamFormat) -> Result<&mut DecoderSession<B::Decoder>> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                if self.settings.complexity.is_some()
                    && !self.backend.capabilities().decoder_complexity
                {
                    log_or_err!(
                        self,
                        Level::Warn,
                        CodecError::Unsupported("decoder complexity, ignoring it")
                    );
                }
                let decoder = self.backend.create_decoder(format, &self.settings)?;
                info!("{} decoder initialized for {format}", self.backend.name());
                DecoderSession::new(decoder, format, &self.settings)
            }
        };

        let session = self.session.insert(session);
        if session.format != format {
            bail!(
                "Stream format changed from {} to {format} between decode calls",
                session.format
            );
        }
        Ok(session)
    }

    /// Decodes `packets` in order, concealing every gap between them.
    ///
    /// The session is created on the first call and reused afterwards, so
    /// sequence numbers must keep increasing across calls.
    pub fn decode_all(&mut self, format: StreamFormat, packets: &[EncodedPacket]) -> Result<Vec<i16>> {
        let session = self.session(format)?;
        Ok(session.decode_all(packets)?)
    }
}

impl<B: CodecBackend> Handler for PacketDecoder<B> {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn handle(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let format = StreamFormat::of(buffer);
        let samples = self.decode_all(format, buffer.packets())?;
        let decoded = samples.len();
        buffer.replace_samples(samples)?;

        let stats = self.stats();
        info!(
            "Decoded {} packets into {decoded} samples, {} gaps",
            buffer.packets().len(),
            stats.gaps
        );
        info!(
            "Concealed frames: {} by redundancy tail, {} by deep redundancy, {} blindly",
            stats.redundancy_tail, stats.deep_redundancy, stats.blind
        );
        Ok(())
    }
}
