//! Goertzel filter: single-bin magnitude, re-evaluated every sample

use crate::dsp::TWO_PI;
use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, IdSequence, Stage, StageState};
use crate::util::RingBuffer;
use crate::{Hertz, SampleRate, Taps};

pub struct GoertzelFilter {
    taps: Taps,
    frequency: Hertz,
    buffer: RingBuffer<f32>,
    coefficient: f32,
    state: StageState,
}

impl GoertzelFilter {
    pub fn new(taps: Taps, frequency: Hertz) -> Self {
        Self {
            taps,
            frequency,
            buffer: RingBuffer::new(taps),
            coefficient: 0.0,
            state: StageState::new(),
        }
    }
}

impl Stage for GoertzelFilter {
    type In = f32;
    type Out = f32;

    impl_stage_state!("Goertzel filter");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        // Bin index rounded to the nearest integer cycle count over the
        // tap window, so the detector stays on a DFT bin center.
        let bin = (self.taps as f32 / input_rate as f32 * self.frequency).round();
        self.coefficient = 2.0 * (TWO_PI / self.taps as f32 * bin).cos();
        Ok(input_rate)
    }

    fn transform(&mut self, sample: f32) -> f32 {
        self.buffer.push(sample);

        let mut v1 = 0.0f32;
        let mut v2 = 0.0f32;
        for i in 0..self.taps {
            let value = self.coefficient * v1 - v2 + self.buffer.peek(i);
            v2 = v1;
            v1 = value;
        }

        (v2 * v2 + v1 * v1 - self.coefficient * v1 * v2).sqrt()
    }
}
