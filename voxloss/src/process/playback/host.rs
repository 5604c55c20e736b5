use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error};

use super::{OutputDevice, PlaybackFeed};
use crate::structs::format::StreamFormat;
use crate::utils::errors::PlaybackError;

/// Default output device of the default host, fed 16-bit samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevice;

impl OutputDevice for CpalDevice {
    type Stream = cpal::Stream;

    fn open(
        &mut self,
        format: StreamFormat,
        mut feed: PlaybackFeed,
    ) -> Result<cpal::Stream, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device".into()))?;
        if let Ok(name) = device.name() {
            debug!("Opening output device {name} on {:?}", host.id());
        }

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    feed.pull(data);
                },
                |err| error!("Output stream error: {err}"),
                None,
            )
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        Ok(stream)
    }
}
