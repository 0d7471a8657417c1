//! # Audio Measurement
//!
//! Measures rendered narration so a shot can take its length from speech.
//! WAV files are read with `hound`; every other container goes through
//! Symphonia's probe.

pub mod duration;

pub use duration::duration_seconds;
