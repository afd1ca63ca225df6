//! Window normalizer
//!
//! Tracks min, max and (optionally) mean over windows of W samples and
//! emits `(x - offset) * scale`, refreshing offset and scale at window
//! boundaries. With look-ahead enabled the emitted sample is delayed by
//! one window while the statistics run on the incoming stream, so the
//! statistics window always covers the emitted sample.

use std::sync::{Arc, Mutex};

use crate::errors::PipelineError;
use crate::pipeline::{impl_stage_state, ConfigRef, IdSequence, Stage, StageState};
use crate::util::{lock, RingBuffer};
use crate::SampleRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookahead {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetMode {
    /// Offset by the window minimum: output spans [0, 1].
    Minimum,
    /// Offset by the window mean: output is centered, scaled by 1/(mean-min).
    Average,
}

#[derive(Debug)]
pub struct NormalizerState {
    window_size: usize,
    lookahead: Lookahead,
    offset_mode: OffsetMode,
    delay: RingBuffer<f32>,
    scale: f32,
    offset: f32,
    sum: f32,
    count: usize,
    min: f32,
    max: f32,
}

impl NormalizerState {
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: usize) {
        assert!(window_size > 0);
        self.window_size = window_size;
        if self.lookahead == Lookahead::Yes {
            self.delay.resize(window_size);
        }
        self.scale = 1.0;
        self.offset = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.min = f32::MAX;
        self.max = f32::MIN;
    }

    fn process(&mut self, incoming: f32) -> f32 {
        let emitted = if self.lookahead == Lookahead::Yes {
            self.delay.push(incoming)
        } else {
            incoming
        };

        let normalized = (emitted - self.offset) * self.scale;

        if self.count >= self.window_size {
            if self.offset_mode == OffsetMode::Average {
                self.offset = self.sum / self.count as f32;
                self.scale = 1.0 / (self.offset - self.min);
            } else {
                self.offset = self.min;
                self.scale = 1.0 / (self.max - self.min);
            }
            self.sum = 0.0;
            self.count = 0;
            self.min = f32::MAX;
            self.max = f32::MIN;
        } else {
            self.count += 1;
            if self.offset_mode == OffsetMode::Average {
                self.sum += incoming;
            }
            self.min = self.min.min(incoming);
            self.max = self.max.max(incoming);
        }

        if normalized.is_nan() {
            0.0
        } else {
            normalized
        }
    }
}

pub struct Normalizer {
    shared: Arc<Mutex<NormalizerState>>,
    state: StageState,
}

impl Normalizer {
    pub fn new(window_size: usize, lookahead: Lookahead, offset_mode: OffsetMode) -> Self {
        assert!(window_size > 0);
        Self {
            shared: Arc::new(Mutex::new(NormalizerState {
                window_size,
                lookahead,
                offset_mode,
                delay: RingBuffer::new(if lookahead == Lookahead::Yes {
                    window_size
                } else {
                    1
                }),
                scale: 1.0,
                offset: 0.0,
                sum: 0.0,
                count: 0,
                min: f32::MAX,
                max: f32::MIN,
            })),
            state: StageState::new(),
        }
    }

    pub fn config_ref(&self) -> ConfigRef<NormalizerState> {
        ConfigRef::new(&self.shared)
    }
}

impl Stage for Normalizer {
    type In = f32;
    type Out = f32;

    impl_stage_state!("Normalizer");

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        _ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        Ok(input_rate)
    }

    fn transform(&mut self, sample: f32) -> f32 {
        lock(&self.shared).process(sample)
    }
}
