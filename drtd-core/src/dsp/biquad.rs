//! Biquad filter, direct form II transposed
//!
//! Coefficient formulas follow the audio EQ cookbook
//! (<https://www.w3.org/TR/audio-eq-cookbook/>). The bandwidth parameter is
//! in octaves for the band-pass and notch types, a plain Q otherwise.

use std::ops::{Add, Mul, Sub};

use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, IdSequence, Stage, StageState, Tap};
use crate::{Hertz, SampleRate};

use super::TWO_PI;

pub const INV_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadType {
    Lowpass,
    Highpass,
    BandpassSkirt,
    BandpassPeak,
    Notch,
}

#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    fn new(kind: BiquadType, sample_rate: SampleRate, center: Hertz, parameter: f32) -> Self {
        assert!(sample_rate > 0);
        let w0 = TWO_PI * center / sample_rate as f32;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha_q = sin_w0 / (2.0 * parameter);
        let alpha_bw = sin_w0 * (2f32.ln() / 2.0 * parameter * (w0 / sin_w0)).sinh();

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadType::Lowpass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha_q,
                -2.0 * cos_w0,
                1.0 - alpha_q,
            ),
            BiquadType::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -1.0 - cos_w0,
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha_q,
                -2.0 * cos_w0,
                1.0 - alpha_q,
            ),
            BiquadType::BandpassPeak => (
                alpha_bw,
                0.0,
                -alpha_bw,
                1.0 + alpha_bw,
                -2.0 * cos_w0,
                1.0 - alpha_bw,
            ),
            BiquadType::BandpassSkirt => (
                sin_w0 / 2.0,
                0.0,
                -sin_w0 / 2.0,
                1.0 + alpha_bw,
                -2.0 * cos_w0,
                1.0 - alpha_bw,
            ),
            BiquadType::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha_bw,
                -2.0 * cos_w0,
                1.0 - alpha_bw,
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// The filter core, usable outside a pipeline (the resampler embeds one).
#[derive(Debug, Clone)]
pub struct Biquad<T> {
    coefficients: Coefficients,
    z1: T,
    z2: T,
}

impl<T> Biquad<T>
where
    T: Default + Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>,
{
    pub fn new(kind: BiquadType, sample_rate: SampleRate, center: Hertz, parameter: f32) -> Self {
        Self {
            coefficients: Coefficients::new(kind, sample_rate, center, parameter),
            z1: T::default(),
            z2: T::default(),
        }
    }

    pub fn filter_sample(&mut self, input: T) -> T {
        let c = self.coefficients;
        let result = input * c.b0 + self.z1;
        self.z1 = (input * c.b1 + self.z2) - result * c.a1;
        self.z2 = input * c.b2 - result * c.a2;
        result
    }
}

/// Pipeline stage wrapper around [`Biquad`]; the coefficients are derived
/// from the input rate at init.
pub struct BiquadFilter<T> {
    kind: BiquadType,
    center: Hertz,
    parameter: f32,
    filter: Option<Biquad<T>>,
    state: StageState,
}

impl<T> BiquadFilter<T> {
    pub fn new(kind: BiquadType, center: Hertz, parameter: f32) -> Self {
        Self {
            kind,
            center,
            parameter,
            filter: None,
            state: StageState::new(),
        }
    }
}

impl<T> Stage for BiquadFilter<T>
where
    T: Tap + Default + Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>,
{
    type In = T;
    type Out = T;

    impl_stage_state!("Biquad Filter");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        self.filter = Some(Biquad::new(self.kind, input_rate, self.center, self.parameter));
        Ok(input_rate)
    }

    fn transform(&mut self, sample: T) -> T {
        match self.filter.as_mut() {
            Some(filter) => filter.filter_sample(sample),
            None => sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(filter: &mut Biquad<f32>, rate: f32, freq: f32) -> f32 {
        let mut peak = 0.0f32;
        for n in 0..(rate as usize) {
            let t = n as f32 / rate;
            let out = filter.filter_sample((TWO_PI * freq * t).sin());
            if n > rate as usize / 2 {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let mut lp = Biquad::<f32>::new(BiquadType::Lowpass, 8000, 500.0, INV_SQRT_2);
        assert!(peak(&mut lp, 8000.0, 100.0) > 0.9);
        let mut lp = Biquad::<f32>::new(BiquadType::Lowpass, 8000, 500.0, INV_SQRT_2);
        assert!(peak(&mut lp, 8000.0, 3000.0) < 0.1);
    }

    #[test]
    fn stage_wrapper_derives_coefficients_at_init() {
        use crate::pipeline::{control, IdSequence, Stage};

        let mut stage = BiquadFilter::<f32>::new(BiquadType::Lowpass, 500.0, INV_SQRT_2);
        let mut ids = IdSequence::new(0);
        stage.init(8000, &mut ids).unwrap();
        control::prepare_sample();

        let mut peak = 0.0f32;
        for n in 0..8000 {
            let t = n as f32 / 8000.0;
            let out = stage.run((TWO_PI * 3000.0 * t).sin());
            if n > 4000 {
                peak = peak.max(out.abs());
            }
        }
        assert!(peak < 0.1, "stopband leaked {peak}");
    }

    #[test]
    fn notch_rejects_its_center() {
        let mut notch = Biquad::<f32>::new(BiquadType::Notch, 8000, 1000.0, 1.0);
        assert!(peak(&mut notch, 8000.0, 1000.0) < 0.05);
        let mut notch = Biquad::<f32>::new(BiquadType::Notch, 8000, 1000.0, 1.0);
        assert!(peak(&mut notch, 8000.0, 100.0) > 0.9);
    }
}
