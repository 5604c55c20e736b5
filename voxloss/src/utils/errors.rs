/// Returns `$err` when `$level` is at or above the state's fail level,
/// otherwise logs it at `$level` and continues.
///
/// `$state` is any value with a `fail_level: log::Level` field.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("Channel count must be at least 1")]
    NoChannels,

    #[error("Only 16-bit PCM is supported, got {0} bits per sample")]
    UnsupportedSampleSize(u16),

    #[error("Sample count {samples} is not a multiple of the channel count {channels}")]
    PartialFrame { samples: usize, channels: u16 },

    #[error("Packet sequence number {current} does not follow {previous}")]
    OutOfOrder { previous: u32, current: u32 },
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StretchError {
    #[error("Speed factor must be a finite value above zero, got {0}")]
    InvalidSpeed(f32),

    #[error("Rate converter output overran its buffer: {needed} samples needed, capacity {capacity}")]
    BufferOverrun { needed: usize, capacity: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Failed to initialize {component}: {reason}")]
    Initialization {
        component: &'static str,
        reason: String,
    },

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Codec backend does not support {0}")]
    Unsupported(&'static str),

    #[error("Invalid codec setting: {0}")]
    InvalidSetting(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error(
        "Packet sequence number {current} at position {index} does not follow {previous}"
    )]
    Sequence {
        index: usize,
        previous: u32,
        current: u32,
    },

    #[error("Deep redundancy data in packet {sequence} is corrupt: {reason}")]
    CorruptSideChannel { sequence: u32, reason: String },

    #[error("Received packet {sequence} failed to decode: {source}")]
    ReceivedPacket {
        sequence: u32,
        #[source]
        source: CodecError,
    },

    #[error("Blind concealment failed before packet {sequence}: {source}")]
    Concealment {
        sequence: u32,
        #[source]
        source: CodecError,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Playback did not complete within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet is empty")]
    Empty,

    #[error("Packet is truncated: {0}")]
    Truncated(&'static str),

    #[error("Code 1 packet payload of {0} bytes cannot be split into two equal frames")]
    UnevenCbrPair(usize),

    #[error("Code 3 packet declares {0} frames")]
    InvalidFrameCount(u8),

    #[error("Code 3 CBR payload of {len} bytes does not divide into {frames} frames")]
    UnevenCbrFrames { len: usize, frames: u8 },
}
