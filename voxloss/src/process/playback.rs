use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};

use crate::process::Handler;
use crate::structs::buffer::AudioBuffer;
use crate::structs::format::StreamFormat;
use crate::utils::errors::PlaybackError;

/// Output device driven by the cpal default host.
#[cfg(feature = "cpal")]
pub mod host;

/// Pull side of a playback session, handed to the device.
///
/// The device calls [`pull`](Self::pull) from its own thread whenever it
/// needs another block of samples.
pub struct PlaybackFeed {
    consumer: HeapCons<i16>,
    finished: Arc<AtomicBool>,
    done: Option<mpsc::Sender<()>>,
}

impl PlaybackFeed {
    /// Fills `out` with the next interleaved samples, padding with silence
    /// when the ring runs dry. Returns the number of real samples copied.
    ///
    /// Signals completion once all input has been consumed.
    pub fn pull(&mut self, out: &mut [i16]) -> usize {
        let copied = self.consumer.pop_slice(out);
        out[copied..].fill(0);

        if self.finished.load(Ordering::Acquire) && self.consumer.is_empty() {
            if let Some(done) = self.done.take() {
                // The sink may have given up waiting already.
                let _ = done.send(());
            }
        }
        copied
    }

    pub fn is_complete(&self) -> bool {
        self.done.is_none()
    }
}

/// Audio output the sink can render to.
pub trait OutputDevice {
    /// Running stream. Dropping it stops and closes the device.
    type Stream;

    fn open(
        &mut self,
        format: StreamFormat,
        feed: PlaybackFeed,
    ) -> Result<Self::Stream, PlaybackError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Extra time allowed beyond the audio duration before giving up.
    pub grace: Duration,
    /// Ring buffer size in samples.
    pub ring_capacity: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            ring_capacity: 16384,
        }
    }
}

/// Handler playing the buffer to an [`OutputDevice`] and waiting for the
/// device to consume all of it.
pub struct PlaybackSink<D: OutputDevice> {
    device: D,
    settings: PlaybackSettings,
}

impl<D: OutputDevice> PlaybackSink<D> {
    pub fn new(device: D, settings: PlaybackSettings) -> Self {
        Self { device, settings }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }
}

impl<D: OutputDevice> Handler for PlaybackSink<D> {
    fn name(&self) -> &'static str {
        "player"
    }

    fn handle(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let format = StreamFormat::of(buffer);
        let (mut producer, consumer) = HeapRb::<i16>::new(self.settings.ring_capacity.max(1)).split();
        let finished = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();

        let feed = PlaybackFeed {
            consumer,
            finished: finished.clone(),
            done: Some(done_tx),
        };

        let budget = buffer.duration() + self.settings.grace;
        let deadline = Instant::now() + budget;
        let stream = self.device.open(format, feed)?;
        info!("Playing {:.2?} of audio at {format}", buffer.duration());

        let mut pending = buffer.samples();
        while !pending.is_empty() {
            let pushed = producer.push_slice(pending);
            pending = &pending[pushed..];
            if pushed == 0 {
                if Instant::now() >= deadline {
                    return Err(PlaybackError::Timeout(budget).into());
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        finished.store(true, Ordering::Release);
        debug!("All samples queued, waiting for the device to drain");

        let result = match done_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(PlaybackError::Timeout(budget)),
            Err(RecvTimeoutError::Disconnected) => Err(PlaybackError::Device(
                "device stopped before playback completed".into(),
            )),
        };
        drop(stream);

        result?;
        info!("Playback finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::JoinHandle;

    /// Pulls fixed blocks on a background thread, recording what it plays.
    #[derive(Default)]
    struct ThreadDevice {
        played: Arc<Mutex<Vec<i16>>>,
        opened_with: Option<StreamFormat>,
    }

    struct ThreadStream {
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl Drop for ThreadStream {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Release);
            if let Some(handle) = self.handle.take() {
                handle.join().unwrap();
            }
        }
    }

    impl OutputDevice for ThreadDevice {
        type Stream = ThreadStream;

        fn open(
            &mut self,
            format: StreamFormat,
            mut feed: PlaybackFeed,
        ) -> Result<ThreadStream, PlaybackError> {
            self.opened_with = Some(format);
            let played = self.played.clone();
            let stop = Arc::new(AtomicBool::new(false));
            let thread_stop = stop.clone();

            let handle = std::thread::spawn(move || {
                let mut block = vec![0i16; 256];
                while !thread_stop.load(Ordering::Acquire) {
                    let n = feed.pull(&mut block);
                    played.lock().unwrap().extend_from_slice(&block[..n]);
                    std::thread::sleep(Duration::from_micros(200));
                }
            });

            Ok(ThreadStream {
                stop,
                handle: Some(handle),
            })
        }
    }

    /// Accepts the feed and never pulls from it.
    struct StuckDevice;

    impl OutputDevice for StuckDevice {
        type Stream = PlaybackFeed;

        fn open(&mut self, _: StreamFormat, feed: PlaybackFeed) -> Result<PlaybackFeed, PlaybackError> {
            Ok(feed)
        }
    }

    struct BrokenDevice;

    impl OutputDevice for BrokenDevice {
        type Stream = ();

        fn open(&mut self, _: StreamFormat, _: PlaybackFeed) -> Result<(), PlaybackError> {
            Err(PlaybackError::Device("no output device".into()))
        }
    }

    fn feed(samples: &[i16]) -> (PlaybackFeed, Arc<AtomicBool>, mpsc::Receiver<()>) {
        let (mut producer, consumer) = HeapRb::<i16>::new(64).split();
        producer.push_slice(samples);
        let finished = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let feed = PlaybackFeed {
            consumer,
            finished: finished.clone(),
            done: Some(tx),
        };
        (feed, finished, rx)
    }

    #[test]
    fn test_feed_pads_and_completes_once() {
        let (mut feed, finished, rx) = feed(&[1, 2, 3]);
        let mut out = [9i16; 4];

        assert_eq!(feed.pull(&mut out), 3);
        assert_eq!(out, [1, 2, 3, 0]);
        assert!(rx.try_recv().is_err());

        finished.store(true, Ordering::Release);
        assert_eq!(feed.pull(&mut out), 0);
        assert_eq!(out, [0; 4]);
        assert!(rx.try_recv().is_ok());
        assert!(feed.is_complete());

        feed.pull(&mut out);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_plays_whole_buffer() {
        // Larger than the ring, so the producer has to wait for the device.
        let samples: Vec<i16> = (0..20000).map(|i| (i % 1000) as i16).collect();
        let mut buffer = AudioBuffer::new(samples.clone(), 48000, 2, 16).unwrap();
        let settings = PlaybackSettings {
            ring_capacity: 1024,
            ..Default::default()
        };

        let mut sink = PlaybackSink::new(ThreadDevice::default(), settings);
        sink.handle(&mut buffer).unwrap();

        assert_eq!(sink.device().opened_with, Some(StreamFormat::new(48000, 2)));
        assert_eq!(*sink.device().played.lock().unwrap(), samples);
        assert_eq!(buffer.samples(), &samples[..]);
    }

    #[test]
    fn test_empty_buffer_completes() {
        let mut buffer = AudioBuffer::new(vec![], 48000, 1, 16).unwrap();
        let mut sink = PlaybackSink::new(ThreadDevice::default(), PlaybackSettings::default());
        sink.handle(&mut buffer).unwrap();
    }

    #[test]
    fn test_stuck_device_times_out() {
        let settings = PlaybackSettings {
            grace: Duration::from_millis(50),
            ring_capacity: 64,
        };

        for len in [32, 4800] {
            let mut buffer = AudioBuffer::new(vec![1; len], 48000, 1, 16).unwrap();
            let mut sink = PlaybackSink::new(StuckDevice, settings);
            let err = sink.handle(&mut buffer).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PlaybackError>(),
                Some(PlaybackError::Timeout(_))
            ));
        }
    }

    #[test]
    fn test_device_error() {
        let mut buffer = AudioBuffer::new(vec![0; 4], 48000, 1, 16).unwrap();
        let mut sink = PlaybackSink::new(BrokenDevice, PlaybackSettings::default());
        let err = sink.handle(&mut buffer).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlaybackError>(),
            Some(PlaybackError::Device(_))
        ));
    }
}
