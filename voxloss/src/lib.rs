//! Offline speech-codec loss simulation and time-stretching.
//!
//! ## Technical Overview
//!
//! A single [`AudioBuffer`](structs::buffer::AudioBuffer) of interleaved
//! 16-bit PCM is passed through a chain of handlers, each mutating it in
//! place:
//!
//! 1. [`process::encode::PacketEncoder`] cuts the PCM into 10 ms frames,
//!    encodes them and drops packets at random to simulate a lossy network.
//! 2. [`process::decode::PacketDecoder`] rebuilds a continuous signal from
//!    the surviving packets, concealing every gap with the best strategy the
//!    surrounding packets allow.
//! 3. [`process::stretch::RateConverter`] changes the playback speed
//!    without changing pitch.
//! 4. [`process::playback::PlaybackSink`] renders the result on an output
//!    device.
//!
//! ### Concealment Strategies
//!
//! For each lost frame the decoder picks, in order of preference:
//!
//! - the redundant copy carried by the packet right after the gap
//! - deep redundancy history parsed from that packet
//! - blind concealment from decoder state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voxloss::process::{HandlerChain, stretch::RateConverter};
//! use voxloss::structs::buffer::AudioBuffer;
//! use voxloss::tempo::Engine;
//!
//! let mut buffer = AudioBuffer::new(vec![0; 96000], 48000, 2, 16)?;
//! let mut converter = RateConverter::new(Engine::SoundTouch, 1.5)?;
//!
//! let mut chain = HandlerChain::new();
//! chain.add(&mut converter);
//! chain.process(&mut buffer)?;
//!
//! assert_eq!(buffer.samples().len(), 64000);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Speech codec collaborator interface.
///
/// - **Backend traits** ([`codec::CodecBackend`]): encoder/decoder factories
/// - **Packet inspection** ([`codec::toc`]): Opus TOC and frame layout
pub mod codec;

/// Pipeline handlers and the chain that runs them.
///
/// - **Encoding** ([`process::encode`]): framing and simulated packet loss
/// - **Decoding** ([`process::decode`]): gap filling
/// - **Rate conversion** ([`process::stretch`]): streaming time-stretch
/// - **Playback** ([`process::playback`]): device rendering
pub mod process;

/// Data structures shared by every stage.
pub mod structs;

/// Time-stretch engines.
pub mod tempo;

/// Error types and sample conversion helpers.
pub mod utils;
