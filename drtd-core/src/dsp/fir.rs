//! Windowed-sinc FIR filter, band-pass or band-stop

use std::f32::consts::PI;
use std::ops::{Add, Mul};

use crate::dsp::WindowKind;
use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, IdSequence, Stage, StageState, Tap};
use crate::util::RingBuffer;
use crate::{Hertz, SampleRate, Taps};

#[derive(Debug, Clone, Copy)]
pub struct FirProperties {
    pub window: WindowKind,
    pub taps: Taps,
    pub start_frequency: Hertz,
    pub stop_frequency: Hertz,
    pub band_stop: bool,
}

/// Ring-buffer convolution with coefficients from a windowed-sinc design.
/// An even tap count is coerced up by one; `taps == 1` passes through.
pub struct FirFilter<T> {
    properties: FirProperties,
    coefficients: Vec<f32>,
    samples: RingBuffer<T>,
    state: StageState,
}

impl<T: Default + Clone> FirFilter<T> {
    pub fn new(window: WindowKind, taps: Taps, start: Hertz, stop: Hertz) -> Self {
        Self::with_properties(FirProperties {
            window,
            taps,
            start_frequency: start,
            stop_frequency: stop,
            band_stop: false,
        })
    }

    pub fn with_properties(mut properties: FirProperties) -> Self {
        assert!(properties.taps > 0);
        assert!(properties.start_frequency <= properties.stop_frequency);
        if properties.taps % 2 == 0 {
            properties.taps += 1;
        }
        Self {
            samples: RingBuffer::new(properties.taps),
            properties,
            coefficients: Vec::new(),
            state: StageState::new(),
        }
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    fn recalculate(&mut self, sample_rate: SampleRate) {
        let taps = self.properties.taps;
        let rate = sample_rate as f32;
        let window = self.properties.window.coefficients(taps);
        let center = (taps - 1) / 2;
        let mut coefficients = vec![0.0f32; taps];

        let passband =
            2.0 * (self.properties.stop_frequency - self.properties.start_frequency) / rate;
        coefficients[center] = if self.properties.band_stop {
            1.0 - passband
        } else {
            passband
        };

        let sign = if self.properties.band_stop { -1.0 } else { 1.0 };
        for i in center + 1..taps {
            let norm = (i - center) as f32;
            let two_norm_pi = 2.0 * norm * PI;
            let stop_term = (two_norm_pi * (self.properties.stop_frequency / rate)).sin();
            let start_term = (two_norm_pi * (self.properties.start_frequency / rate)).sin();
            let value = (stop_term - start_term) / (norm * PI) * window[i] * sign;
            coefficients[i] = value;
            coefficients[taps - 1 - i] = value;
        }

        self.coefficients = coefficients;
        self.samples.resize(taps);
    }
}

impl<T> Stage for FirFilter<T>
where
    T: Tap + Default + Clone + Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    type In = T;
    type Out = T;

    impl_stage_state!("Fir Filter");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        self.recalculate(input_rate);
        Ok(input_rate)
    }

    fn transform(&mut self, sample: T) -> T {
        if self.properties.taps == 1 {
            return sample;
        }
        self.samples.push(sample);
        let mut sum = T::default();
        for tap in 0..self.properties.taps {
            sum = sum + *self.samples.peek(tap) * self.coefficients[tap];
        }
        sum
    }
}
