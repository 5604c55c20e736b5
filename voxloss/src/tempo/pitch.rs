use super::{OutputQueue, TempoTransform};

const MIN_PITCH_HZ: u32 = 65;
const MAX_PITCH_HZ: u32 = 400;
/// Rate the coarse pitch search runs at.
const AMDF_RATE_HZ: u32 = 4000;

/// Speech-oriented stretcher that removes or repeats whole pitch periods.
///
/// Each edit cross-fades two adjacent periods into one (faster) or inserts a
/// blend of them (slower); the input between edits is copied unchanged, so
/// voiced speech keeps its waveform and pitch.
pub struct PitchPeriodStretcher {
    channels: usize,
    speed: f64,
    min_period: usize,
    max_period: usize,
    decimation: usize,
    input: Vec<f32>,
    /// Frames to copy verbatim before the next edit.
    copy_pending: usize,
    copy_fract: f64,
    flushed: bool,
    queue: OutputQueue,
}

impl PitchPeriodStretcher {
    pub fn new(sample_rate: u32, channels: usize, speed: f64) -> Self {
        let min_period = (sample_rate / MAX_PITCH_HZ).max(1) as usize;
        let max_period = ((sample_rate / MIN_PITCH_HZ) as usize).max(min_period + 1);
        let decimation = (sample_rate / AMDF_RATE_HZ).max(1) as usize;

        Self {
            channels,
            speed,
            min_period,
            max_period,
            decimation,
            input: Vec::new(),
            copy_pending: 0,
            copy_fract: 0.0,
            flushed: false,
            queue: OutputQueue::new(channels, speed),
        }
    }

    fn passthrough(&self) -> bool {
        (self.speed - 1.0).abs() < 1e-5
    }

    fn required_frames(&self) -> usize {
        2 * self.max_period
    }

    fn input_frames(&self) -> usize {
        self.input.len() / self.channels
    }

    fn mono(&self, frame: usize) -> f32 {
        let ch = self.channels;
        self.input[frame * ch..(frame + 1) * ch].iter().sum::<f32>() / ch as f32
    }

    /// Average magnitude difference over `period` frames starting at `pos`,
    /// sampled every `step` frames. Normalised by the number of terms.
    fn amdf(&self, pos: usize, period: usize, step: usize) -> f32 {
        let mut diff = 0.0f32;
        let mut terms = 0usize;
        let mut i = 0;
        while i < period {
            diff += (self.mono(pos + i) - self.mono(pos + i + period)).abs();
            terms += 1;
            i += step;
        }
        diff / terms.max(1) as f32
    }

    /// Pitch period at `pos` in frames. Needs `2 * max_period` frames.
    fn find_pitch_period(&self, pos: usize) -> usize {
        let step = self.decimation;
        let best_of = |periods: &mut dyn Iterator<Item = usize>, step: usize| {
            let mut best = (self.min_period, f32::MAX);
            for period in periods {
                let diff = self.amdf(pos, period, step);
                if diff < best.1 {
                    best = (period, diff);
                }
            }
            best.0
        };

        // Coarse search on the decimated signal, then refine around it.
        let coarse = best_of(
            &mut (self.min_period..=self.max_period).step_by(step),
            step,
        );
        if step == 1 {
            return coarse;
        }
        let low = coarse.saturating_sub(step).max(self.min_period);
        let high = (coarse + step).min(self.max_period);
        best_of(&mut (low..=high), 1)
    }

    /// Cross-fades `frames` frames from `down_at` (fading out) into `up_at`
    /// (fading in).
    fn overlap_add(&mut self, frames: usize, down_at: usize, up_at: usize) {
        let ch = self.channels;
        for i in 0..frames {
            let up = i as f32 / frames as f32;
            let frame = (0..ch).map(|c| {
                self.input[(down_at + i) * ch + c] * (1.0 - up)
                    + self.input[(up_at + i) * ch + c] * up
            });
            self.queue.push_frame(frame);
        }
    }

    fn take_copy_length(&mut self, exact: f64) {
        self.copy_fract += exact;
        let whole = self.copy_fract.floor();
        self.copy_fract -= whole;
        self.copy_pending = whole as usize;
    }

    /// Drops one period. Returns input frames consumed.
    fn skip_period(&mut self, pos: usize, period: usize) -> usize {
        let new_frames = if self.speed >= 2.0 {
            (period as f64 / (self.speed - 1.0)) as usize
        } else {
            self.take_copy_length(period as f64 * (2.0 - self.speed) / (self.speed - 1.0));
            period
        };
        self.overlap_add(new_frames, pos, pos + period);
        period + new_frames
    }

    /// Repeats one period. Returns input frames consumed.
    fn insert_period(&mut self, pos: usize, period: usize) -> usize {
        let new_frames = if self.speed < 0.5 {
            ((period as f64 * self.speed / (1.0 - self.speed)) as usize).max(1)
        } else {
            self.take_copy_length(
                period as f64 * (2.0 * self.speed - 1.0) / (1.0 - self.speed),
            );
            period
        };
        let ch = self.channels;
        self.queue.push(&self.input[pos * ch..(pos + period) * ch]);
        self.overlap_add(new_frames, pos + period, pos);
        new_frames
    }

    fn process(&mut self) {
        let ch = self.channels;

        if self.passthrough() {
            self.queue.push(&self.input);
            self.input.clear();
            return;
        }

        let required = self.required_frames();
        let mut pos = 0;
        while self.input_frames() - pos >= required {
            if self.copy_pending > 0 {
                let n = self.copy_pending.min(required);
                self.queue.push(&self.input[pos * ch..(pos + n) * ch]);
                self.copy_pending -= n;
                pos += n;
                continue;
            }

            let period = self.find_pitch_period(pos);
            pos += if self.speed > 1.0 {
                self.skip_period(pos, period)
            } else {
                self.insert_period(pos, period)
            };
        }
        self.input.drain(..pos * ch);
    }
}

impl TempoTransform for PitchPeriodStretcher {
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

        let pad = self.required_frames() * self.channels;
        self.input.extend(std::iter::repeat_n(0.0, pad));
        self.process();
        self.input.clear();
        self.queue.finish();
    }
}
