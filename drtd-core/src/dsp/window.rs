//! Window functions for FIR design

use crate::dsp::TWO_PI;
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Rectangular,
    Blackman,
    Hamming,
    Hann,
}

impl WindowKind {
    pub fn coefficients(self, taps: usize) -> Vec<f32> {
        let span = (taps - 1) as f32;
        (0..taps)
            .map(|i| {
                let n = i as f32;
                match self {
                    WindowKind::Rectangular => 1.0,
                    WindowKind::Blackman => {
                        0.363_581_9 - 0.489_177_5 * (TWO_PI * n / span).cos()
                            + 0.136_599_5 * (2.0 * TWO_PI * n / span).cos()
                            + 0.010_641_1 * (3.0 * TWO_PI * n / span).cos()
                    }
                    WindowKind::Hamming => 0.53836 - 0.46164 * (TWO_PI * n / span).cos(),
                    WindowKind::Hann => {
                        let s = (PI * n / span).sin();
                        s * s
                    }
                }
            })
            .collect()
    }
}
