//! drtd core library
//!
//! Real-time decoding of digital radio transmissions from an audio sample
//! stream. A decoder owns a typed signal-processing pipeline that is fed
//! one sample at a time by a processing thread; the pipeline tail drives a
//! per-protocol state machine which emits human-readable records.
//!
//! Supported protocols: AX.25 packet radio, POCSAG pagers, RTTY (Baudot),
//! DTMF tone sequences and the DCF77 time signal.

pub mod decoder;
pub mod dsp;
pub mod errors;
pub mod fec;
pub mod pipeline;
pub mod resampler;
pub mod source;
pub mod store;
pub mod text;
pub mod thread;
pub mod util;

pub use decoder::{Decoder, SharedDecoder};
pub use errors::DrtdError;
pub use thread::ProcessingThread;

/// Samples per second. Every pipeline edge carries one.
pub type SampleRate = u32;

/// Frequency in Hz where fractional precision matters (mixers, baud rates).
pub type Hertz = f32;

/// Number of taps of a windowed filter.
pub type Taps = usize;
