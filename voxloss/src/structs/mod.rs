//! Data structures shared by every pipeline stage.
//!
//! Contains the in-memory audio buffer that handlers mutate in place, the
//! encoded packet representation and the stream format description handed
//! to codecs and output devices.

pub mod buffer;
pub mod format;
