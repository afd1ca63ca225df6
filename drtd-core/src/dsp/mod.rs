//! DSP stages
//!
//! Each stage is a pure-ish per-sample transform implementing
//! [`crate::pipeline::Stage`]. Stages whose parameters can be changed
//! while the pipeline runs (mixer frequency, filter taps, baud rates,
//! normalizer window) keep that state behind a mutex and hand out
//! [`crate::pipeline::ConfigRef`] handles.

mod angle_difference;
mod biquad;
mod bit_converter;
mod fir;
mod goertzel;
mod iq_mixer;
mod mapper;
mod moving_average;
mod normalizer;
mod nrzi;
mod window;

pub use angle_difference::AngleDifference;
pub use biquad::{Biquad, BiquadFilter, BiquadType};
pub use bit_converter::{BitConverter, BitConverterState, SyncInfo};
pub use fir::{FirFilter, FirProperties};
pub use goertzel::GoertzelFilter;
pub use iq_mixer::{IqMixer, IqMixerState};
pub use mapper::Mapper;
pub use moving_average::{MovingAverage, MovingAverageState};
pub use normalizer::{Lookahead, Normalizer, NormalizerState, OffsetMode};
pub use nrzi::NrziDecoder;
pub use window::WindowKind;

use std::f32::consts::PI;

pub(crate) const TWO_PI: f32 = 2.0 * PI;
