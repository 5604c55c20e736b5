use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use voxloss::structs::buffer::AudioBuffer;

/// YAML summary of one `process` run.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub input: AudioSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AudioSummary>,
    pub stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<DecoderReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_converter: Option<RateConverterReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback: Option<PlaybackReport>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSummary {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
    pub duration_ms: u64,
}

impl AudioSummary {
    pub fn of(path: &Path, buffer: &AudioBuffer) -> Self {
        Self {
            path: path.to_path_buf(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
            frames: buffer.frames(),
            duration_ms: buffer.duration().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderReport {
    pub codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u8>,
    pub packet_loss_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u32>,
    pub deep_redundancy_frames: u8,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub encoded_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderReport {
    pub codec: String,
    pub last_sequence: u32,
    pub gaps: u64,
    pub redundancy_tail: u64,
    pub deep_redundancy: u64,
    pub blind: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateConverterReport {
    pub engine: String,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackReport {
    pub grace_ms: u64,
}

impl RunReport {
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Cannot write report {}", path.display()))
    }
}
