use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::MultiProgress;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;
use crate::wav::{HEADER_SIZE, WavFile, parse_wav};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, _multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing WAV file: {}", args.input.display());

    let bytes = InputReader::new(&args.input)?.read_all()?;
    let wav = parse_wav(&bytes)
        .with_context(|| format!("Cannot read WAV input {}", args.input.display()))?;

    let trailing = bytes.len() - HEADER_SIZE - wav.header.data.size as usize;
    if trailing > 0 {
        if cli.strict {
            anyhow::bail!("{trailing} bytes follow the data chunk");
        }
        log::warn!("{trailing} bytes follow the data chunk and are ignored");
    }

    for line in describe(&wav) {
        println!("{line}");
    }
    Ok(())
}

fn describe(wav: &WavFile) -> Vec<String> {
    let format = &wav.header.format;
    let duration = if format.sample_rate == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(wav.frames() as f64 / format.sample_rate as f64)
    };

    vec![
        format!("Format:          PCM (code {})", format.audio_format),
        format!("Sample rate:     {} Hz", format.sample_rate),
        format!("Channels:        {}", format.channels),
        format!("Bits per sample: {}", format.bits_per_sample),
        format!("Byte rate:       {} B/s", format.byte_rate),
        format!("Block align:     {} bytes", format.block_align),
        format!("Data size:       {} bytes", wav.header.data.size),
        format!("Frames:          {}", wav.frames()),
        format!("Duration:        {}", time_str(duration)),
    ]
}
