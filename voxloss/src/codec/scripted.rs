//! Deterministic codec used by the pipeline tests.
//!
//! Packets are `[flags, pcm...]` with the frame stored verbatim, so a
//! lossless round trip is exact. Concealed frames are filled with a marker
//! value naming the strategy that produced them.

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    Capabilities, CodecBackend, DecoderSettings, EncoderSettings, FrameDecoder, FrameEncoder,
};
use crate::structs::format::StreamFormat;
use crate::utils::errors::CodecError;

/// Packet carries a redundant copy of the previous frame.
pub(crate) const TAIL: u8 = 0x01;
/// Deep redundancy parsing of this packet fails.
pub(crate) const CORRUPT: u8 = 0x02;

pub(crate) const TAIL_MARK: i16 = 1111;
pub(crate) const DEEP_MARK: i16 = 2222;
pub(crate) const BLIND_MARK: i16 = 3333;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Decode,
    Tail,
    ParseDeep { max_samples: usize },
    Deep { offset: usize },
    Conceal,
}

#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub capabilities: Capabilities,
    /// Samples per channel reported by every deep redundancy parse.
    pub deep_available: usize,
    pub fail_tail: bool,
    pub fail_conceal: bool,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            calls: Rc::default(),
            capabilities: Capabilities {
                encoder_complexity: true,
                decoder_complexity: true,
                deep_redundancy: true,
            },
            deep_available: 0,
            fail_tail: false,
            fail_conceal: false,
        }
    }
}

impl ScriptedBackend {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// A packet holding `samples` interleaved samples, all equal to `value`.
    pub(crate) fn packet(flags: u8, value: i16, samples: usize) -> Vec<u8> {
        let mut payload = vec![flags];
        for _ in 0..samples {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }
}

pub(crate) struct ScriptedEncoder;

impl FrameEncoder for ScriptedEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::with_capacity(1 + pcm.len() * 2);
        payload.push(0);
        for sample in pcm {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(payload)
    }
}

pub(crate) struct ScriptedDecoder {
    script: ScriptedBackend,
    channels: usize,
    last_duration: usize,
}

impl ScriptedDecoder {
    fn fill(&mut self, out: &mut [i16], mark: i16) -> usize {
        out.fill(mark);
        self.last_duration = out.len() / self.channels;
        self.last_duration
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&mut self, payload: &[u8], out: &mut [i16]) -> Result<usize, CodecError> {
        self.script.calls.borrow_mut().push(Call::Decode);
        let pcm = payload
            .get(1..)
            .ok_or_else(|| CodecError::Decode("empty packet".into()))?;
        let samples = pcm.len() / 2;
        if samples > out.len() || samples % self.channels != 0 {
            return Err(CodecError::Decode(format!("bad frame of {samples} samples")));
        }
        for (dst, bytes) in out.iter_mut().zip(pcm.chunks_exact(2)) {
            *dst = i16::from_le_bytes([bytes[0], bytes[1]]);
        }
        self.last_duration = samples / self.channels;
        Ok(self.last_duration)
    }

    fn has_redundancy_tail(&self, payload: &[u8]) -> bool {
        payload.first().is_some_and(|f| f & TAIL != 0)
    }

    fn decode_redundancy_tail(
        &mut self,
        _payload: &[u8],
        out: &mut [i16],
    ) -> Result<usize, CodecError> {
        self.script.calls.borrow_mut().push(Call::Tail);
        if self.script.fail_tail {
            return Err(CodecError::Decode("scripted tail failure".into()));
        }
        Ok(self.fill(out, TAIL_MARK))
    }

    fn parse_deep_redundancy(
        &mut self,
        payload: &[u8],
        max_samples: usize,
    ) -> Result<usize, CodecError> {
        self.script
            .calls
            .borrow_mut()
            .push(Call::ParseDeep { max_samples });
        if payload.first().is_some_and(|f| f & CORRUPT != 0) {
            return Err(CodecError::Decode("scripted corrupt side channel".into()));
        }
        Ok(self.script.deep_available.min(max_samples))
    }

    fn decode_deep_redundancy(
        &mut self,
        offset: usize,
        out: &mut [i16],
    ) -> Result<usize, CodecError> {
        self.script.calls.borrow_mut().push(Call::Deep { offset });
        Ok(self.fill(out, DEEP_MARK))
    }

    fn conceal(&mut self, out: &mut [i16]) -> Result<usize, CodecError> {
        self.script.calls.borrow_mut().push(Call::Conceal);
        if self.script.fail_conceal {
            return Err(CodecError::Decode("scripted concealment failure".into()));
        }
        Ok(self.fill(out, BLIND_MARK))
    }

    fn last_frame_duration(&mut self) -> Result<usize, CodecError> {
        Ok(self.last_duration)
    }
}

impl CodecBackend for ScriptedBackend {
    type Encoder = ScriptedEncoder;
    type Decoder = ScriptedDecoder;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_encoder(
        &self,
        _format: StreamFormat,
        _settings: &EncoderSettings,
    ) -> Result<Self::Encoder, CodecError> {
        Ok(ScriptedEncoder)
    }

    fn create_decoder(
        &self,
        format: StreamFormat,
        _settings: &DecoderSettings,
    ) -> Result<Self::Decoder, CodecError> {
        Ok(ScriptedDecoder {
            script: self.clone(),
            channels: format.channels as usize,
            last_duration: 0,
        })
    }
}
