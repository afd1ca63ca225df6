//! Conversion of pipeline edge values into monitor tap samples

use num_complex::Complex32;

/// Types that can flow along a pipeline edge and be sampled into the
/// monitor tap. Multi-channel types expose one component per channel.
pub trait Tap: Send + 'static {
    fn channels() -> &'static [&'static str];
    fn tap(&self, channel: u8) -> f32;
}

impl Tap for f32 {
    fn channels() -> &'static [&'static str] {
        &["Float"]
    }

    fn tap(&self, _channel: u8) -> f32 {
        *self
    }
}

impl Tap for bool {
    fn channels() -> &'static [&'static str] {
        &["Bool"]
    }

    fn tap(&self, _channel: u8) -> f32 {
        if *self {
            1.0
        } else {
            0.0
        }
    }
}

impl Tap for u8 {
    fn channels() -> &'static [&'static str] {
        &["Integer"]
    }

    fn tap(&self, _channel: u8) -> f32 {
        f32::from(*self)
    }
}

impl Tap for Complex32 {
    fn channels() -> &'static [&'static str] {
        &["Real", "Imaginary"]
    }

    fn tap(&self, channel: u8) -> f32 {
        if channel == 0 {
            self.re
        } else {
            self.im
        }
    }
}
