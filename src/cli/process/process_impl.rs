use std::fs::File;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use log::{Level, debug, info, warn};
use voxloss::codec::{DecoderSettings, EncoderSettings};
use voxloss::process::HandlerChain;
use voxloss::process::playback::PlaybackSettings;
use voxloss::process::stretch::RateConverter;
use voxloss::structs::format::StreamFormat;
use voxloss::tempo::Engine;

use super::progress::{create_stage_bar, enter_stage, finish_stage_bar};
use super::report::{AudioSummary, RunReport};
use super::stage::Stage;
use crate::cli::command::{Accelerator, Cli, CodecKind, ProcessArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;
use crate::wav::{parse_wav, write_wav};

pub fn cmd_process(args: &ProcessArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    info!(
        "Processing {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    let start_time = Instant::now();

    let mut reader = InputReader::new(&args.input)?;
    if reader.is_pipe() {
        debug!("Reading WAV input from stdin");
    }
    let bytes = reader.read_all()?;
    let wav = parse_wav(&bytes)
        .with_context(|| format!("Cannot read WAV input {}", args.input.display()))?;
    let mut buffer = wav.into_buffer()?;
    info!(
        "Input: {}, {} frames ({})",
        StreamFormat::of(&buffer),
        buffer.frames(),
        time_str(buffer.duration())
    );

    let mut report = RunReport {
        input: AudioSummary::of(&args.input, &buffer),
        ..Default::default()
    };

    let mut stages = build_stages(args, fail_level)?;
    report.stages = stages.iter().map(|s| s.name().to_string()).collect();
    if stages.is_empty() {
        info!("No stages selected, writing the input unchanged");
    } else {
        info!("Pipeline: {}", report.stages.join(" -> "));
    }

    let pb = match multi {
        Some(multi) => Some(create_stage_bar(multi, stages.len())?),
        None => None,
    };

    let result = {
        let mut chain = HandlerChain::new();
        for stage in stages.iter_mut() {
            chain.add(stage.as_mut());
        }
        chain.process_observed(&mut buffer, |index, name| {
            if let Some(ref pb) = pb {
                enter_stage(pb, index, name);
            }
        })
    };

    if let Err(e) = result {
        if let Some(pb) = pb {
            pb.finish_with_message("processing failed");
        }
        return Err(e);
    }

    let output = File::create(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    write_wav(output, &buffer)?;
    info!(
        "Wrote {}: {} frames ({})",
        args.output.display(),
        buffer.frames(),
        time_str(buffer.duration())
    );

    report.output = Some(AudioSummary::of(&args.output, &buffer));
    for stage in &stages {
        stage.report(&mut report);
    }
    report.set_elapsed(start_time.elapsed());

    if let Some(ref path) = args.report {
        report.write(path)?;
        info!("Wrote run report {}", path.display());
    }

    if let Some(pb) = pb {
        finish_stage_bar(
            &pb,
            format!(
                "done | output: {} | took {}",
                time_str(buffer.duration()),
                time_str(start_time.elapsed())
            ),
        );
    }

    Ok(())
}

/// Builds the handlers in pipeline order: encoder, decoder, rate converter,
/// player.
fn build_stages(args: &ProcessArgs, fail_level: Level) -> Result<Vec<Box<dyn Stage>>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();

    match args.codec {
        Some(CodecKind::Opus) => {
            let encoder = EncoderSettings {
                complexity: args.encoder_complexity,
                packet_loss_percent: args.packet_loss,
                bit_rate: args.bit_rate,
                deep_redundancy_frames: args.dred_duration,
            };
            let decoder = DecoderSettings {
                complexity: args.decoder_complexity,
                max_deep_redundancy_ms: args.max_dred_window_ms,
            };
            push_opus_stages(&mut stages, encoder, decoder, args.seed, fail_level)?;
        }
        None => {
            if args.encoder_complexity.is_some()
                || args.decoder_complexity.is_some()
                || args.bit_rate.is_some()
                || args.packet_loss != 0
                || args.dred_duration != 0
            {
                warn!("Codec options have no effect without --codec");
            }
        }
    }

    match args.accelerate {
        Some(accelerator) => {
            let engine = match accelerator {
                Accelerator::Sonic => Engine::Sonic,
                Accelerator::Soundtouch => Engine::SoundTouch,
            };
            stages.push(Box::new(RateConverter::new(engine, args.speed)?));
        }
        None if args.speed != 1.0 => {
            warn!("--speed {} has no effect without --accelerate", args.speed);
        }
        None => {}
    }

    if args.play {
        let settings = PlaybackSettings {
            grace: Duration::from_millis(args.playback_grace_ms),
            ..Default::default()
        };
        push_player(&mut stages, settings)?;
    }

    Ok(stages)
}

#[cfg(feature = "opus")]
fn push_opus_stages(
    stages: &mut Vec<Box<dyn Stage>>,
    encoder: EncoderSettings,
    decoder: DecoderSettings,
    seed: Option<u64>,
    fail_level: Level,
) -> Result<()> {
    use voxloss::codec::libopus::OpusBackend;
    use voxloss::process::decode::PacketDecoder;
    use voxloss::process::encode::PacketEncoder;

    let mut packet_encoder = PacketEncoder::new(OpusBackend, encoder, seed)?;
    packet_encoder.set_fail_level(fail_level);
    let mut packet_decoder = PacketDecoder::new(OpusBackend, decoder)?;
    packet_decoder.set_fail_level(fail_level);

    stages.push(Box::new(packet_encoder));
    stages.push(Box::new(packet_decoder));
    Ok(())
}

#[cfg(not(feature = "opus"))]
fn push_opus_stages(
    _stages: &mut Vec<Box<dyn Stage>>,
    encoder: EncoderSettings,
    decoder: DecoderSettings,
    _seed: Option<u64>,
    _fail_level: Level,
) -> Result<()> {
    encoder.validate()?;
    decoder.validate()?;
    anyhow::bail!("Opus support is not compiled in, rebuild with --features opus")
}

#[cfg(feature = "playback")]
fn push_player(stages: &mut Vec<Box<dyn Stage>>, settings: PlaybackSettings) -> Result<()> {
    use voxloss::process::playback::PlaybackSink;
    use voxloss::process::playback::host::CpalDevice;

    stages.push(Box::new(PlaybackSink::new(CpalDevice, settings)));
    Ok(())
}

#[cfg(not(feature = "playback"))]
fn push_player(_stages: &mut Vec<Box<dyn Stage>>, _settings: PlaybackSettings) -> Result<()> {
    anyhow::bail!("Playback support is not compiled in, rebuild with --features playback")
}
