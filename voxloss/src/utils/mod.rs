//! Supporting infrastructure.
//!
//! Error types shared by every pipeline stage and the sample conversion
//! helpers used at the integer/float boundary.

pub mod errors;
pub mod sample;
