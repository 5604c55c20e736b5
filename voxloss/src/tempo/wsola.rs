use super::{OutputQueue, TempoTransform};

const SEQUENCE_MS: u32 = 40;
const SEEK_WINDOW_MS: u32 = 15;
const OVERLAP_MS: u32 = 8;

/// Waveform-similarity overlap-add stretcher.
///
/// Cuts the input into overlapping sequences, spacing their start points by
/// `speed` times the output hop, and splices each one where it correlates
/// best with the tail of the previous one.
pub struct WsolaStretcher {
    channels: usize,
    sequence: usize,
    seek_window: usize,
    overlap: usize,
    nominal_skip: f64,
    skip_fract: f64,
    input: Vec<f32>,
    mid_buffer: Vec<f32>,
    primed: bool,
    flushed: bool,
    queue: OutputQueue,
}

impl WsolaStretcher {
    pub fn new(sample_rate: u32, channels: usize, speed: f64) -> Self {
        let per_ms = |ms: u32| (sample_rate as u64 * ms as u64 / 1000) as usize;
        let overlap = per_ms(OVERLAP_MS).max(1);
        let sequence = per_ms(SEQUENCE_MS).max(2 * overlap + 1);
        let seek_window = per_ms(SEEK_WINDOW_MS).max(1);

        Self {
            channels,
            sequence,
            seek_window,
            overlap,
            nominal_skip: speed * (sequence - overlap) as f64,
            skip_fract: 0.0,
            input: Vec::new(),
            mid_buffer: vec![0.0; overlap * channels],
            primed: false,
            flushed: false,
            queue: OutputQueue::new(channels, speed),
        }
    }

    /// Input frames needed before one sequence can be processed.
    fn required_frames(&self) -> usize {
        let skip = (self.nominal_skip + 0.5) as usize;
        (skip + self.overlap).max(self.sequence) + self.seek_window
    }

    fn input_frames(&self) -> usize {
        self.input.len() / self.channels
    }

    /// Offset within the seek window where the input best continues the
    /// previous sequence.
    fn seek_best_overlap(&self) -> usize {
        let ch = self.channels;
        let len = self.overlap * ch;
        let mut best_offset = 0;
        let mut best_corr = f64::MIN;

        for offset in 0..self.seek_window {
            let candidate = &self.input[offset * ch..offset * ch + len];
            let mut corr = 0.0f64;
            let mut norm = 0.0f64;
            for (&a, &b) in self.mid_buffer.iter().zip(candidate) {
                corr += a as f64 * b as f64;
                norm += b as f64 * b as f64;
            }
            let corr = corr / (norm + 1e-9).sqrt();
            if corr > best_corr {
                best_corr = corr;
                best_offset = offset;
            }
        }
        best_offset
    }

    fn process(&mut self) {
        let ch = self.channels;
        let required = self.required_frames();

        while self.input_frames() >= required {
            let offset = if self.primed {
                self.seek_best_overlap()
            } else {
                0
            };
            let start = offset * ch;

            if self.primed {
                for i in 0..self.overlap {
                    let fade_in = i as f32 / self.overlap as f32;
                    let frame = (0..ch).map(|c| {
                        let old = self.mid_buffer[i * ch + c];
                        let new = self.input[start + i * ch + c];
                        old * (1.0 - fade_in) + new * fade_in
                    });
                    self.queue.push_frame(frame);
                }
            } else {
                self.queue
                    .push(&self.input[start..start + self.overlap * ch]);
                self.primed = true;
            }

            let body_end = start + (self.sequence - self.overlap) * ch;
            self.queue
                .push(&self.input[start + self.overlap * ch..body_end]);
            self.mid_buffer
                .copy_from_slice(&self.input[body_end..body_end + self.overlap * ch]);

            self.skip_fract += self.nominal_skip;
            let skip = self.skip_fract.floor();
            self.skip_fract -= skip;
            self.input.drain(..skip as usize * ch);
        }
    }
}

impl TempoTransform for WsolaStretcher {
    fn channels(&self) -> usize {
        self.channels
    }

    fn put_samples(&mut self, samples: &[f32]) {
        if self.flushed {
            return;
        }
        self.input.extend_from_slice(samples);
        self.queue.record_input(samples.len() / self.channels);
        self.process();
    }

    fn receive_samples(&mut self, out: &mut [f32]) -> usize {
        self.queue.receive(out)
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        // One window of silence pushes every real input frame through.
        let pad = self.required_frames() * self.channels;
        self.input.extend(std::iter::repeat_n(0.0, pad));
        self.process();

        if self.primed {
            self.queue.push(&self.mid_buffer);
        }
        self.input.clear();
        self.queue.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::tests::{run, sine};

    #[test]
    fn test_output_length() {
        for &(speed, channels, frames) in &[
            (1.5, 2, 48000),
            (0.5, 1, 12345),
            (2.0, 2, 4000),
            (0.8, 2, 96000),
            (1.0, 1, 100),
        ] {
            let input = sine(48000, channels, frames, 220.0);
            let mut stretcher = WsolaStretcher::new(48000, channels, speed);
            let out = run(&mut stretcher, &input, speed);
            assert_eq!(
                out.len(),
                (frames as f64 / speed).floor() as usize * channels,
                "speed {speed}"
            );
        }
    }

    #[test]
    fn test_keeps_level() {
        let input = sine(16000, 1, 32000, 200.0);
        let mut stretcher = WsolaStretcher::new(16000, 1, 1.5);
        let out = run(&mut stretcher, &input, 1.5);

        let rms = |s: &[f32]| (s.iter().map(|v| v * v).sum::<f32>() / s.len() as f32).sqrt();
        let middle = &out[2000..out.len() - 2000];
        assert!((rms(middle) - rms(&input)).abs() < 0.1);
        assert!(out.iter().all(|v| v.abs() <= 0.5 + 1e-3));
    }

    #[test]
    fn test_empty_input() {
        let mut stretcher = WsolaStretcher::new(48000, 2, 1.5);
        assert!(run(&mut stretcher, &[], 1.5).is_empty());
    }
}
