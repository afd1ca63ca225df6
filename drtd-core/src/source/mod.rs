//! Sample sources
//!
//! A source produces normalized mono float samples at a known rate. The
//! processing thread reads fixed-size blocks; a read of zero samples means
//! error, end of stream or cancellation. Blocking producers (stdin, the
//! sound card callback) live on their own threads and hand blocks over a
//! bounded channel so that a stop request can abort a blocked read.

mod soundcard;
mod stdin;
mod wav;

pub use soundcard::{input_names, SoundCardSource};
pub use stdin::{SampleFormat, StdinSource};
pub use wav::WavFileSource;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::DeviceError;
use crate::SampleRate;

/// Shared stop flag handed to a source at `open`; a cancelled source
/// returns 0 from `read` promptly instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub trait SampleSource: Send {
    /// Prepare the source for delivery at its sample rate. Device errors
    /// abort the start; they are not recoverable inside the source.
    fn open(&mut self, cancel: CancelToken) -> Result<(), DeviceError>;

    /// The rate the source actually delivers at.
    fn sample_rate(&self) -> SampleRate;

    /// Fill `buffer` with up to `buffer.len()` samples; returns the count
    /// delivered. Zero means end of stream, error or cancellation.
    fn read(&mut self, buffer: &mut [f32]) -> usize;

    fn close(&mut self);
}
