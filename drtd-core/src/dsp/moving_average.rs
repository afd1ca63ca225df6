//! Moving average over the last N samples
//!
//! Running sum plus ring buffer. After more than N consecutive exact
//! zeros the sum is reset so float error cannot accumulate into a DC
//! offset on silent input.

use std::ops::{Add, Div, Sub};
use std::sync::{Arc, Mutex};

use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, ConfigRef, IdSequence, Stage, StageState, Tap};
use crate::util::{lock, RingBuffer};
use crate::{SampleRate, Taps};

#[derive(Debug)]
pub struct MovingAverageState<T> {
    buffer: RingBuffer<T>,
    sum: T,
    taps: Taps,
    zero_run: usize,
    sample_rate: SampleRate,
}

impl<T: Default + Clone> MovingAverageState<T> {
    pub fn taps(&self) -> Taps {
        self.taps
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn set_taps(&mut self, taps: Taps) {
        if taps == self.taps {
            return;
        }
        self.taps = taps;
        self.buffer.resize(taps);
        self.sum = T::default();
        self.zero_run = 0;
    }
}

pub struct MovingAverage<T> {
    shared: Arc<Mutex<MovingAverageState<T>>>,
    state: StageState,
}

impl<T: Default + Clone> MovingAverage<T> {
    pub fn new(taps: Taps) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MovingAverageState {
                buffer: RingBuffer::new(taps),
                sum: T::default(),
                taps,
                zero_run: 0,
                sample_rate: 0,
            })),
            state: StageState::new(),
        }
    }

    pub fn config_ref(&self) -> ConfigRef<MovingAverageState<T>> {
        ConfigRef::new(&self.shared)
    }
}

impl<T> Stage for MovingAverage<T>
where
    T: Tap
        + Default
        + Clone
        + Copy
        + PartialEq
        + Add<Output = T>
        + Sub<Output = T>
        + Div<f32, Output = T>,
{
    type In = T;
    type Out = T;

    impl_stage_state!("Moving average");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        lock(&self.shared).sample_rate = input_rate;
        Ok(input_rate)
    }

    fn transform(&mut self, sample: T) -> T {
        let mut shared = lock(&self.shared);
        if shared.taps < 2 {
            return sample;
        }

        let removed = shared.buffer.push(sample);
        shared.sum = shared.sum + sample - removed;

        if sample == T::default() {
            if shared.zero_run > shared.taps {
                shared.sum = T::default();
            } else {
                shared.zero_run += 1;
            }
        } else {
            shared.zero_run = 0;
        }

        shared.sum / shared.taps as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::control;
    use approx::assert_relative_eq;

    fn make(taps: Taps) -> MovingAverage<f32> {
        let mut avg = MovingAverage::new(taps);
        let mut ids = IdSequence::new(0);
        avg.init(1000, &mut ids).unwrap();
        avg
    }

    #[test]
    fn averages_the_window() {
        let mut avg = make(4);
        control::prepare_sample();
        avg.run(4.0);
        avg.run(4.0);
        avg.run(4.0);
        assert_relative_eq!(avg.run(4.0), 4.0);
        assert_relative_eq!(avg.run(0.0), 3.0);
    }

    #[test]
    fn zero_stream_yields_exact_zero() {
        // Seed with values that would leave float residue in the sum
        let mut avg = make(8);
        control::prepare_sample();
        for i in 0..32 {
            avg.run(0.1 + i as f32 * 0.37);
        }
        let mut last = 1.0;
        for _ in 0..9 {
            last = avg.run(0.0);
        }
        // A full window of zeros plus one sample: exactly zero, no drift
        assert_eq!(avg.run(0.0), 0.0);
        let _ = last;
    }

    #[test]
    fn tap_update_resets_the_window() {
        let mut avg = make(4);
        let handle = avg.config_ref();
        control::prepare_sample();
        avg.run(8.0);
        handle.with(|s| s.set_taps(2));
        assert_eq!(handle.with(|s| s.taps()), Some(2));
        avg.run(2.0);
        assert_relative_eq!(avg.run(2.0), 2.0);
    }
}
