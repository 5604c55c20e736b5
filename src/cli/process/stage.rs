use voxloss::codec::CodecBackend;
use voxloss::process::Handler;
use voxloss::process::decode::PacketDecoder;
use voxloss::process::encode::PacketEncoder;
use voxloss::process::playback::{OutputDevice, PlaybackSink};
use voxloss::process::stretch::RateConverter;

use super::report::{
    DecoderReport, EncoderReport, PlaybackReport, RateConverterReport, RunReport,
};

/// A pipeline handler that can describe what it did.
pub trait Stage: Handler {
    fn report(&self, report: &mut RunReport);
}

impl<B: CodecBackend> Stage for PacketEncoder<B> {
    fn report(&self, report: &mut RunReport) {
        let settings = self.settings();
        let stats = self.stats();
        report.encoder = Some(EncoderReport {
            codec: self.backend_name().to_string(),
            complexity: settings.complexity,
            packet_loss_percent: settings.packet_loss_percent,
            bit_rate: settings.bit_rate,
            deep_redundancy_frames: settings.deep_redundancy_frames,
            packets_sent: stats.sent,
            packets_dropped: stats.dropped,
            encoded_bytes: stats.encoded_bytes,
        });
    }
}

impl<B: CodecBackend> Stage for PacketDecoder<B> {
    fn report(&self, report: &mut RunReport) {
        let stats = self.stats();
        report.decoder = Some(DecoderReport {
            codec: self.backend_name().to_string(),
            last_sequence: self.last_decoded_sequence(),
            gaps: stats.gaps,
            redundancy_tail: stats.redundancy_tail,
            deep_redundancy: stats.deep_redundancy,
            blind: stats.blind,
        });
    }
}

impl Stage for RateConverter {
    fn report(&self, report: &mut RunReport) {
        report.rate_converter = Some(RateConverterReport {
            engine: self.engine().to_string(),
            speed: self.speed(),
        });
    }
}

impl<D: OutputDevice> Stage for PlaybackSink<D> {
    fn report(&self, report: &mut RunReport) {
        report.playback = Some(PlaybackReport {
            grace_ms: self.settings().grace.as_millis() as u64,
        });
    }
}
