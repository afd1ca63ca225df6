//! Quadrature mixer: float in, baseband-shifted complex out

use std::sync::{Arc, Mutex};

use num_complex::Complex32;

use crate::dsp::TWO_PI;
use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, ConfigRef, IdSequence, Stage, StageState};
use crate::util::lock;
use crate::{Hertz, SampleRate};

#[derive(Debug)]
pub struct IqMixerState {
    frequency: Hertz,
    phase: f32,
    phase_step: f32,
    sample_rate: SampleRate,
}

impl IqMixerState {
    pub fn frequency(&self) -> Hertz {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: Hertz) {
        if (frequency - self.frequency).abs() < f32::EPSILON {
            return;
        }
        self.frequency = frequency;
        if self.sample_rate > 0 {
            self.phase_step = TWO_PI / self.sample_rate as f32 * frequency;
        }
    }
}

pub struct IqMixer {
    shared: Arc<Mutex<IqMixerState>>,
    state: StageState,
}

impl IqMixer {
    pub fn new(frequency: Hertz) -> Self {
        Self {
            shared: Arc::new(Mutex::new(IqMixerState {
                frequency,
                phase: 0.0,
                phase_step: 0.0,
                sample_rate: 0,
            })),
            state: StageState::new(),
        }
    }

    pub fn config_ref(&self) -> ConfigRef<IqMixerState> {
        ConfigRef::new(&self.shared)
    }
}

impl Stage for IqMixer {
    type In = f32;
    type Out = Complex32;

    impl_stage_state!("IQ Mixer");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        let mut shared = lock(&self.shared);
        shared.sample_rate = input_rate;
        shared.phase_step = TWO_PI / input_rate as f32 * shared.frequency;
        Ok(input_rate)
    }

    fn transform(&mut self, sample: f32) -> Complex32 {
        let mut shared = lock(&self.shared);
        let result = Complex32::new(sample * shared.phase.cos(), sample * -shared.phase.sin());
        shared.phase += shared.phase_step;
        // Keep the accumulator in (-pi, pi] so precision never degrades
        shared.phase = remainder(shared.phase, TWO_PI);
        result
    }
}

/// IEEE remainder: result in [-d/2, d/2].
fn remainder(value: f32, divisor: f32) -> f32 {
    value - (value / divisor).round() * divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::control;
    use approx::assert_relative_eq;

    #[test]
    fn mixes_a_tone_at_its_own_frequency_to_dc() {
        let mut mixer = IqMixer::new(1000.0);
        let mut ids = IdSequence::new(0);
        mixer.init(8000, &mut ids).unwrap();
        control::prepare_sample();

        // cos(2*pi*1000*t) mixed with 1000 Hz: I settles at 0.5, Q at ~0
        let mut sum = Complex32::default();
        for n in 0..8000 {
            let t = n as f32 / 8000.0;
            sum += mixer.run((TWO_PI * 1000.0 * t).cos());
        }
        let mean = sum / 8000.0;
        assert_relative_eq!(mean.re, 0.5, epsilon = 1e-3);
        assert_relative_eq!(mean.im, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn frequency_update_through_ref_changes_phase_step() {
        let mut mixer = IqMixer::new(100.0);
        let handle = mixer.config_ref();
        let mut ids = IdSequence::new(0);
        mixer.init(1000, &mut ids).unwrap();
        handle.with(|m| m.set_frequency(250.0));
        assert_eq!(handle.with(|m| m.frequency()), Some(250.0));
    }
}
