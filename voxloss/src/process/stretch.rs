use std::time::Instant;

use anyhow::Result;
use log::{debug, info};

use crate::process::Handler;
use crate::structs::buffer::AudioBuffer;
use crate::tempo::{Engine, TempoTransform, checked_speed};
use crate::utils::errors::StretchError;
use crate::utils::sample::{to_float, to_i16_saturating};

/// Interleaved samples pushed into the transform per step.
pub const CHUNK_SAMPLES: usize = 1920;

/// Outcome of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub samples: Vec<i16>,
    /// Number of chunks pushed into the transform.
    pub chunks: usize,
}

/// Time-stretches `input` with a fresh session of `engine`.
pub fn convert(
    input: &[i16],
    sample_rate: u32,
    channels: u16,
    speed: f32,
    engine: Engine,
) -> Result<Conversion, StretchError> {
    let mut transform = engine.create(sample_rate, channels as usize, speed)?;
    convert_with(transform.as_mut(), input, speed)
}

/// Drives `transform` over the whole of `input`.
///
/// Output is written into a buffer of `ceil(input.len() / speed)` samples;
/// a transform producing more than that fails with
/// [`StretchError::BufferOverrun`].
pub fn convert_with(
    transform: &mut dyn TempoTransform,
    input: &[i16],
    speed: f32,
) -> Result<Conversion, StretchError> {
    let speed = checked_speed(speed)?;
    let channels = transform.channels().max(1);
    let chunk_len = (CHUNK_SAMPLES / channels).max(1) * channels;

    let capacity = (input.len() as f64 / speed).ceil() as usize;
    let mut output = vec![0i16; capacity];
    let mut written = 0usize;

    let mut staged = vec![0.0f32; chunk_len];
    let mut scratch = vec![0.0f32; chunk_len];
    let mut chunks = 0usize;

    for chunk in input.chunks(chunk_len) {
        // Drop a trailing partial frame rather than desync the channels.
        let whole = chunk.len() - chunk.len() % channels;
        for (dst, &src) in staged.iter_mut().zip(&chunk[..whole]) {
            *dst = to_float(src);
        }
        transform.put_samples(&staged[..whole]);
        chunks += 1;

        drain(transform, &mut scratch, &mut output, &mut written)?;
    }

    transform.flush();
    drain(transform, &mut scratch, &mut output, &mut written)?;

    output.truncate(written);
    Ok(Conversion {
        samples: output,
        chunks,
    })
}

fn drain(
    transform: &mut dyn TempoTransform,
    scratch: &mut [f32],
    output: &mut [i16],
    written: &mut usize,
) -> Result<(), StretchError> {
    let channels = transform.channels().max(1);
    loop {
        let frames = transform.receive_samples(scratch);
        if frames == 0 {
            return Ok(());
        }

        let len = frames * channels;
        let needed = *written + len;
        if needed > output.len() {
            return Err(StretchError::BufferOverrun {
                needed,
                capacity: output.len(),
            });
        }
        for (dst, &src) in output[*written..needed].iter_mut().zip(&scratch[..len]) {
            *dst = to_i16_saturating(src);
        }
        *written = needed;
    }
}

/// Handler changing the playback speed of the buffer without changing pitch.
pub struct RateConverter {
    engine: Engine,
    speed: f32,
}

impl RateConverter {
    pub fn new(engine: Engine, speed: f32) -> Result<Self, StretchError> {
        checked_speed(speed)?;
        Ok(Self { engine, speed })
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

impl Handler for RateConverter {
    fn name(&self) -> &'static str {
        "rate converter"
    }

    fn handle(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let start = Instant::now();
        let input_len = buffer.samples().len();

        let conversion = convert(
            buffer.samples(),
            buffer.sample_rate(),
            buffer.channels(),
            self.speed,
            self.engine,
        )?;
        debug!(
            "{} pushed {} chunks of up to {CHUNK_SAMPLES} samples",
            self.engine, conversion.chunks
        );

        let output_len = conversion.samples.len();
        buffer.replace_samples(conversion.samples)?;

        info!(
            "Time-stretched with {} at {}x in {:.2?}: {input_len} -> {output_len} samples",
            self.engine,
            self.speed,
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits twice as many frames as it receives.
    struct Doubler {
        pending: Vec<f32>,
    }

    impl TempoTransform for Doubler {
        fn channels(&self) -> usize {
            1
        }

        fn put_samples(&mut self, samples: &[f32]) {
            for &s in samples {
                self.pending.extend([s, s]);
            }
        }

        fn receive_samples(&mut self, out: &mut [f32]) -> usize {
            let n = out.len().min(self.pending.len());
            out[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            n
        }

        fn flush(&mut self) {}
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 37) % 20000) as i16 - 10000).collect()
    }

    #[test]
    fn test_one_second_stereo_at_1_5() {
        let input = ramp(96000);
        for engine in [Engine::Sonic, Engine::SoundTouch] {
            let conversion = convert(&input, 48000, 2, 1.5, engine).unwrap();
            assert_eq!(conversion.samples.len(), 64000, "{engine}");
            assert_eq!(conversion.chunks, 50);
        }
    }

    #[test]
    fn test_length_within_bounds() {
        let input = ramp(20000);
        for engine in [Engine::Sonic, Engine::SoundTouch] {
            for speed in [0.5f32, 0.75, 1.0, 1.3, 2.0] {
                let out = convert(&input, 16000, 2, speed, engine).unwrap().samples;
                let capacity = (input.len() as f64 / speed as f64).ceil() as usize;
                assert!(out.len() <= capacity);
                assert!(capacity - out.len() <= 2, "{engine} at {speed}: {}", out.len());
                assert_eq!(out.len() % 2, 0);
            }
        }
    }

    #[test]
    fn test_overrun_is_an_error() {
        let mut doubler = Doubler {
            pending: Vec::new(),
        };
        let err = convert_with(&mut doubler, &ramp(4000), 1.0).unwrap_err();
        assert!(matches!(err, StretchError::BufferOverrun { capacity: 4000, .. }));
    }

    #[test]
    fn test_invalid_speed() {
        assert_eq!(
            convert(&[0; 4], 48000, 1, 0.0, Engine::Sonic).unwrap_err(),
            StretchError::InvalidSpeed(0.0)
        );
        assert!(RateConverter::new(Engine::SoundTouch, -2.0).is_err());
        assert!(RateConverter::new(Engine::SoundTouch, f32::NAN).is_err());
    }

    #[test]
    fn test_empty_input() {
        let conversion = convert(&[], 48000, 2, 1.5, Engine::SoundTouch).unwrap();
        assert!(conversion.samples.is_empty());
        assert_eq!(conversion.chunks, 0);
    }

    #[test]
    fn test_handler_replaces_samples() {
        let mut buffer = AudioBuffer::new(ramp(9600), 48000, 2, 16).unwrap();
        buffer.push_packet(1, vec![1]).unwrap();
        let mut converter = RateConverter::new(Engine::Sonic, 2.0).unwrap();
        converter.handle(&mut buffer).unwrap();

        assert_eq!(buffer.samples().len(), 4800);
        assert_eq!(buffer.packets().len(), 1);
    }
}
