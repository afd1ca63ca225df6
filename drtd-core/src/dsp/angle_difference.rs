//! Phase difference between consecutive complex samples

use std::f32::consts::PI;

use num_complex::Complex32;

use crate::dsp::TWO_PI;
use crate::pipeline::{impl_stage_state, Stage, StageState};

/// Emits the wrapped phase step versus the previous sample, in (-pi, pi].
/// Input frequencies are assumed to stay below half the sample rate; a
/// difference beyond pi is treated as a wrap-around, not as aliasing.
#[derive(Default)]
pub struct AngleDifference {
    previous_angle: f32,
    state: StageState,
}

impl AngleDifference {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for AngleDifference {
    type In = Complex32;
    type Out = f32;

    impl_stage_state!("Angle difference");

    fn transform(&mut self, sample: Complex32) -> f32 {
        let angle = sample.arg();
        let diff = angle - self.previous_angle;
        self.previous_angle = angle;

        let mut sign = diff.signum();
        let mut magnitude = diff.abs();
        if magnitude > PI {
            magnitude = TWO_PI - magnitude;
            sign = -sign;
        }
        sign * magnitude
    }
}
