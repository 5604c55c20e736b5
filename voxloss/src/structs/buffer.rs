use std::time::Duration;

use crate::utils::errors::BufferError;

/// One codec packet as it arrived at the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Assigned at encode time, starting at 1. Packets lost in transit still
    /// consume their number, so gaps between stored packets reveal losses.
    pub sequence_number: u32,

    /// Opaque codec payload.
    pub payload: Vec<u8>,
}

/// Interleaved 16-bit PCM plus the encoded packets derived from it.
///
/// This is the single object every pipeline handler mutates in place. The
/// sample count is always a whole number of frames.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    packets: Vec<EncodedPacket>,
}

impl AudioBuffer {
    pub fn new(
        samples: Vec<i16>,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> Result<Self, BufferError> {
        if channels == 0 {
            return Err(BufferError::NoChannels);
        }
        if bits_per_sample != 16 {
            return Err(BufferError::UnsupportedSampleSize(bits_per_sample));
        }
        check_whole_frames(samples.len(), channels)?;

        Ok(Self {
            samples,
            sample_rate,
            channels,
            bits_per_sample,
            packets: Vec::new(),
        })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Replaces the PCM content, keeping the stream format and packets.
    pub fn replace_samples(&mut self, samples: Vec<i16>) -> Result<(), BufferError> {
        check_whole_frames(samples.len(), self.channels)?;
        self.samples = samples;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn packets(&self) -> &[EncodedPacket] {
        &self.packets
    }

    /// Appends a packet in arrival order.
    ///
    /// Sequence numbers must be strictly increasing across the list.
    pub fn push_packet(&mut self, sequence_number: u32, payload: Vec<u8>) -> Result<(), BufferError> {
        if let Some(last) = self.packets.last() {
            if sequence_number <= last.sequence_number {
                return Err(BufferError::OutOfOrder {
                    previous: last.sequence_number,
                    current: sequence_number,
                });
            }
        }

        self.packets.push(EncodedPacket {
            sequence_number,
            payload,
        });
        Ok(())
    }

    /// Removes the packet with the given sequence number, returning it if present.
    pub fn remove_packet(&mut self, sequence_number: u32) -> Option<EncodedPacket> {
        let index = self
            .packets
            .binary_search_by_key(&sequence_number, |p| p.sequence_number)
            .ok()?;
        Some(self.packets.remove(index))
    }

    pub fn take_packets(&mut self) -> Vec<EncodedPacket> {
        std::mem::take(&mut self.packets)
    }

    /// Total payload bytes across all stored packets.
    pub fn encoded_bytes(&self) -> usize {
        self.packets.iter().map(|p| p.payload.len()).sum()
    }
}

fn check_whole_frames(samples: usize, channels: u16) -> Result<(), BufferError> {
    if samples % channels as usize != 0 {
        return Err(BufferError::PartialFrame { samples, channels });
    }
    Ok(())
}
