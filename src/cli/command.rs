use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (voxloss ",
    env!("VOXLOSS_VERSION"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = VERSION,
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Simulate speech codec packet loss and time-stretching on PCM WAV files",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a WAV file through the codec, rate converter and player.
    Process(ProcessArgs),

    /// Print WAV header information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Input 16-bit PCM WAV file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Time-stretch the audio with the given engine.
    #[arg(short, long, value_enum, value_name = "ENGINE")]
    pub accelerate: Option<Accelerator>,

    /// Speed factor for --accelerate (2.0 plays twice as fast).
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0, value_parser = parse_speed)]
    pub speed: f32,

    /// Encode and decode through a lossy speech codec.
    #[arg(short, long, value_enum, value_name = "CODEC")]
    pub codec: Option<CodecKind>,

    /// Encoder complexity (0-10).
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=10))]
    pub encoder_complexity: Option<u8>,

    /// Decoder complexity (0-10).
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=10))]
    pub decoder_complexity: Option<u8>,

    /// Simulated packet loss in percent (0-100).
    #[arg(long, value_name = "PERCENT", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    pub packet_loss: u8,

    /// Target bit rate in bits per second (500-512000).
    #[arg(long, value_name = "BPS", value_parser = clap::value_parser!(u32).range(500..=512_000))]
    pub bit_rate: Option<u32>,

    /// Deep redundancy duration in 10 ms units (0-100).
    #[arg(long, value_name = "FRAMES", default_value_t = 0,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    pub dred_duration: u8,

    /// Longest history requested from deep redundancy per gap.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub max_dred_window_ms: u32,

    /// Seed for the packet loss simulation.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Output WAV file.
    #[arg(short, long, value_name = "PATH", default_value = "output.wav")]
    pub output: PathBuf,

    /// Write a YAML summary of the run.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Play the result on the default output device.
    #[arg(long)]
    pub play: bool,

    /// Time allowed beyond the audio duration for playback to finish.
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub playback_grace_ms: u64,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input WAV file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

fn parse_speed(s: &str) -> Result<f32, String> {
    let speed: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(format!("speed must be a positive number, got {s}"));
    }
    Ok(speed)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Accelerator {
    /// Pitch-period removal and insertion.
    Sonic,
    /// Waveform-similarity overlap-add.
    Soundtouch,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CodecKind {
    /// Opus via libopus.
    Opus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_process_defaults() {
        let cli = Cli::try_parse_from(["voxlossd", "process", "in.wav"]).unwrap();
        let Commands::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.speed, 1.0);
        assert_eq!(args.packet_loss, 0);
        assert_eq!(args.output, PathBuf::from("output.wav"));
        assert_eq!(args.max_dred_window_ms, 1000);
        assert_eq!(args.playback_grace_ms, 5000);
        assert!(args.accelerate.is_none() && args.codec.is_none());
    }

    #[test]
    fn test_process_flags() {
        let cli = Cli::try_parse_from([
            "voxlossd", "--strict", "process", "in.wav", "-a", "soundtouch", "--speed", "1.5",
            "-c", "opus", "--packet-loss", "20", "--bit-rate", "16000", "--seed", "7",
        ])
        .unwrap();
        assert!(cli.strict);
        let Commands::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.accelerate, Some(Accelerator::Soundtouch));
        assert_eq!(args.speed, 1.5);
        assert_eq!(args.codec, Some(CodecKind::Opus));
        assert_eq!(args.packet_loss, 20);
        assert_eq!(args.bit_rate, Some(16000));
        assert_eq!(args.seed, Some(7));
    }

    #[test]
    fn test_rejects_bad_values() {
        for argv in [
            vec!["voxlossd", "process"],
            vec!["voxlossd", "process", "in.wav", "--speed", "0"],
            vec!["voxlossd", "process", "in.wav", "--speed", "-1"],
            vec!["voxlossd", "process", "in.wav", "--packet-loss", "101"],
            vec!["voxlossd", "process", "in.wav", "--bit-rate", "100"],
            vec!["voxlossd", "process", "in.wav", "--encoder-complexity", "11"],
            vec!["voxlossd", "process", "in.wav", "-a", "rubberband"],
            vec!["voxlossd", "process", "in.wav", "--bogus"],
        ] {
            assert!(Cli::try_parse_from(&argv).is_err(), "{argv:?}");
        }

        let err = Cli::try_parse_from(["voxlossd", "process"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
