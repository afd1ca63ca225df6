//! Sample-rate conversion between a source and the decoder rate
//!
//! A phase accumulator advances by one per input sample and retires
//! `source_rate / target_rate` per output sample. When downsampling, a
//! biquad low-pass at half the target rate precedes the decimation and the
//! emitted value is the mean of the filtered samples since the last
//! emission.

use crate::dsp::{Biquad, BiquadType};
use crate::SampleRate;

const INV_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

pub struct Resampler {
    step: f32,
    downsampling: bool,
    lowpass: Option<Biquad<f32>>,
    phase: f32,
    sum: f32,
    summed: u32,
    current: f32,
}

impl Resampler {
    pub fn new(source_rate: SampleRate, target_rate: SampleRate) -> Self {
        assert!(source_rate > 0 && target_rate > 0);
        let downsampling = source_rate > target_rate;
        Self {
            step: source_rate as f32 / target_rate as f32,
            downsampling,
            lowpass: downsampling.then(|| {
                Biquad::new(
                    BiquadType::Lowpass,
                    source_rate,
                    target_rate as f32 / 2.0,
                    INV_SQRT_2,
                )
            }),
            phase: 0.0,
            sum: 0.0,
            summed: 0,
            current: 0.0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        let sample = match self.lowpass.as_mut() {
            Some(filter) => {
                let filtered = filter.filter_sample(sample);
                self.sum += filtered;
                self.summed += 1;
                filtered
            }
            None => sample,
        };
        self.current = sample;
        self.phase += 1.0;
    }

    /// Next pending output sample, if the phase accumulator has one.
    pub fn pull(&mut self) -> Option<f32> {
        if self.phase < self.step {
            return None;
        }
        self.phase -= self.step;

        if self.downsampling {
            if self.summed == 0 {
                return Some(0.0);
            }
            let mean = self.sum / self.summed as f32;
            self.sum = 0.0;
            self.summed = 0;
            Some(mean)
        } else {
            Some(self.current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(resampler: &mut Resampler, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::new();
        for &sample in input {
            resampler.push(sample);
            while let Some(out) = resampler.pull() {
                output.push(out);
            }
        }
        output
    }

    #[test]
    fn unity_ratio_passes_samples_through() {
        let mut resampler = Resampler::new(8000, 8000);
        let input: Vec<f32> = (0..32).map(|i| i as f32).collect();
        assert_eq!(drain(&mut resampler, &input), input);
    }

    #[test]
    fn downsampling_halves_the_sample_count() {
        let mut resampler = Resampler::new(8000, 4000);
        let input = vec![0.5f32; 1000];
        let output = drain(&mut resampler, &input);
        assert_eq!(output.len(), 500);
    }

    #[test]
    fn upsampling_doubles_the_sample_count() {
        let mut resampler = Resampler::new(4000, 8000);
        let input = vec![0.25f32; 500];
        let output = drain(&mut resampler, &input);
        assert_eq!(output.len(), 1000);
        assert!(output.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn downsampled_dc_converges_to_the_input_level() {
        let mut resampler = Resampler::new(44100, 12000);
        let input = vec![1.0f32; 44100];
        let output = drain(&mut resampler, &input);
        assert!((output.len() as i64 - 12000).unsigned_abs() < 4);
        let tail = &output[output.len() - 100..];
        for &sample in tail {
            assert!((sample - 1.0).abs() < 1e-2, "settled value {sample}");
        }
    }
}
