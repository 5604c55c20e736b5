//! Streaming time-stretch transforms.
//!
//! A [`TempoTransform`] changes the duration of interleaved floating point
//! audio by a fixed speed factor while keeping its pitch. Input is pushed in
//! arbitrary chunks and output is pulled as it becomes available; [`flush`]
//! releases whatever the engine still holds once the input is exhausted.
//!
//! Every engine emits exactly `floor(frames_in / speed)` frames over the life
//! of a session and never more than that at any point while streaming.
//!
//! [`flush`]: TempoTransform::flush

use std::collections::VecDeque;
use std::fmt::Display;

use crate::utils::errors::StretchError;

pub mod pitch;
pub mod wsola;

pub use pitch::PitchPeriodStretcher;
pub use wsola::WsolaStretcher;

pub trait TempoTransform {
    /// Number of interleaved channels.
    fn channels(&self) -> usize;

    /// Queues interleaved samples. The length must be a whole number of frames.
    fn put_samples(&mut self, samples: &[f32]);

    /// Moves ready output into `out`, returning the number of frames written.
    fn receive_samples(&mut self, out: &mut [f32]) -> usize;

    /// Processes the buffered tail. Input pushed afterwards is ignored.
    fn flush(&mut self);
}

/// Time-stretch engine selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Pitch-period skipping and insertion, tuned for speech.
    Sonic,
    /// Waveform-similarity overlap-add.
    SoundTouch,
}

impl Engine {
    pub fn create(
        self,
        sample_rate: u32,
        channels: usize,
        speed: f32,
    ) -> Result<Box<dyn TempoTransform>, StretchError> {
        let speed = checked_speed(speed)?;
        Ok(match self {
            Self::Sonic => Box::new(PitchPeriodStretcher::new(sample_rate, channels, speed)),
            Self::SoundTouch => Box::new(WsolaStretcher::new(sample_rate, channels, speed)),
        })
    }
}

impl Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sonic => write!(f, "sonic"),
            Self::SoundTouch => write!(f, "soundtouch"),
        }
    }
}

/// Rejects speeds that are zero, negative, NaN or infinite.
pub fn checked_speed(speed: f32) -> Result<f64, StretchError> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(StretchError::InvalidSpeed(speed));
    }
    Ok(speed as f64)
}

/// Output staging shared by the engines.
///
/// Tracks how many frames went in and out so the emitted length follows the
/// speed factor exactly, regardless of the latency of the engine feeding it.
#[derive(Debug)]
pub(crate) struct OutputQueue {
    samples: VecDeque<f32>,
    channels: usize,
    speed: f64,
    frames_in: u64,
    frames_out: u64,
}

impl OutputQueue {
    pub(crate) fn new(channels: usize, speed: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            channels,
            speed,
            frames_in: 0,
            frames_out: 0,
        }
    }

    pub(crate) fn record_input(&mut self, frames: usize) {
        self.frames_in += frames as u64;
    }

    /// Frames the session may emit for the input seen so far.
    pub(crate) fn limit(&self) -> u64 {
        (self.frames_in as f64 / self.speed).floor() as u64
    }

    pub(crate) fn push(&mut self, samples: &[f32]) {
        self.samples.extend(samples);
    }

    pub(crate) fn push_frame(&mut self, frame: impl IntoIterator<Item = f32>) {
        self.samples.extend(frame);
    }

    /// Frames produced by the engine so far, emitted or not.
    pub(crate) fn produced(&self) -> u64 {
        self.frames_out + (self.samples.len() / self.channels) as u64
    }

    /// Pads with silence up to the final length. Called once the engine has
    /// drained its state.
    pub(crate) fn finish(&mut self) {
        let missing = self.limit().saturating_sub(self.produced()) as usize;
        self.samples
            .extend(std::iter::repeat_n(0.0, missing * self.channels));
    }

    pub(crate) fn receive(&mut self, out: &mut [f32]) -> usize {
        let allowed = self.limit().saturating_sub(self.frames_out) as usize;
        let queued = self.samples.len() / self.channels;
        let room = out.len() / self.channels;
        let frames = allowed.min(queued).min(room);

        for (dst, src) in out
            .iter_mut()
            .zip(self.samples.drain(..frames * self.channels))
        {
            *dst = src;
        }
        self.frames_out += frames as u64;
        frames
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sine(sample_rate: u32, channels: usize, frames: usize, freq: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / sample_rate as f32;
                let v = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin();
                std::iter::repeat_n(v, channels)
            })
            .collect()
    }

    /// Pushes `input` in 1920-sample chunks and drains everything, checking
    /// the streaming bound along the way.
    pub(crate) fn run(transform: &mut dyn TempoTransform, input: &[f32], speed: f64) -> Vec<f32> {
        let channels = transform.channels();
        let mut out = Vec::new();
        let mut scratch = vec![0.0f32; 1920];
        let mut frames_in = 0usize;

        for chunk in input.chunks(1920) {
            transform.put_samples(chunk);
            frames_in += chunk.len() / channels;
            loop {
                let n = transform.receive_samples(&mut scratch);
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&scratch[..n * channels]);
            }
            assert!(out.len() / channels <= (frames_in as f64 / speed).floor() as usize);
        }

        transform.flush();
        loop {
            let n = transform.receive_samples(&mut scratch);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&scratch[..n * channels]);
        }
        out
    }

    #[test]
    fn test_checked_speed() {
        assert_eq!(checked_speed(1.5).unwrap(), 1.5);
        assert_eq!(checked_speed(0.0), Err(StretchError::InvalidSpeed(0.0)));
        assert!(checked_speed(-1.0).is_err());
        assert!(checked_speed(f32::INFINITY).is_err());
        assert!(checked_speed(f32::NAN).is_err());
    }

    #[test]
    fn test_output_queue_bounds() {
        let mut queue = OutputQueue::new(2, 2.0);
        queue.record_input(5);
        queue.push(&[1.0; 12]);
        assert_eq!(queue.produced(), 6);

        let mut out = [0.0; 16];
        // floor(5 / 2) = 2 frames allowed
        assert_eq!(queue.receive(&mut out), 2);
        assert_eq!(queue.receive(&mut out), 0);

        queue.record_input(5);
        assert_eq!(queue.receive(&mut out), 3);

        let mut queue = OutputQueue::new(1, 0.5);
        queue.record_input(3);
        queue.push(&[1.0, 1.0]);
        queue.finish();
        assert_eq!(queue.receive(&mut out), 6);
        assert_eq!(&out[..6], &[1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_engine_factory() {
        let transform = Engine::Sonic.create(48000, 2, 1.25).unwrap();
        assert_eq!(transform.channels(), 2);
        assert!(Engine::SoundTouch.create(48000, 1, 0.0).is_err());
        assert_eq!(Engine::SoundTouch.to_string(), "soundtouch");
    }
}
