//! WAV file playback source, mixed down to mono

use std::path::{Path, PathBuf};

use log::info;

use crate::errors::DeviceError;
use crate::source::{CancelToken, SampleSource};
use crate::SampleRate;

pub struct WavFileSource {
    path: PathBuf,
    sample_rate: SampleRate,
    samples: Vec<f32>,
    position: usize,
    cancel: CancelToken,
}

impl WavFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_rate: 0,
            samples: Vec::new(),
            position: 0,
            cancel: CancelToken::new(),
        }
    }

    /// Source fed from an in-memory buffer; used by tests and by callers
    /// that synthesize their input.
    pub fn from_samples(sample_rate: SampleRate, samples: Vec<f32>) -> Self {
        Self {
            path: PathBuf::new(),
            sample_rate,
            samples,
            position: 0,
            cancel: CancelToken::new(),
        }
    }
}

impl SampleSource for WavFileSource {
    fn open(&mut self, cancel: CancelToken) -> Result<(), DeviceError> {
        self.cancel = cancel;
        if !self.samples.is_empty() {
            return Ok(());
        }

        let mut reader = hound::WavReader::open(&self.path).map_err(|error| {
            DeviceError::OpenFailed {
                reason: format!("{}: {error}", self.path.display()),
            }
        })?;
        let spec = reader.spec();
        self.sample_rate = spec.sample_rate;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|error| DeviceError::OpenFailed {
                    reason: error.to_string(),
                })?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / ((1u32 << (spec.bits_per_sample - 1)) as f32);
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|error| DeviceError::OpenFailed {
                        reason: error.to_string(),
                    })?
            }
        };

        let channels = spec.channels as usize;
        self.samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        info!(
            "loaded {} ({} samples at {} Hz)",
            self.path.display(),
            self.samples.len(),
            self.sample_rate
        );
        Ok(())
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        if self.cancel.cancelled() || self.position >= self.samples.len() {
            return 0;
        }
        let count = buffer.len().min(self.samples.len() - self.position);
        buffer[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }

    fn close(&mut self) {
        self.position = self.samples.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_source_streams_in_blocks() {
        let samples: Vec<f32> = (0..2500).map(|i| i as f32).collect();
        let mut source = WavFileSource::from_samples(8000, samples);
        source.open(CancelToken::new()).unwrap();

        let mut block = [0.0f32; 1024];
        assert_eq!(source.read(&mut block), 1024);
        assert_eq!(source.read(&mut block), 1024);
        assert_eq!(source.read(&mut block), 452);
        assert_eq!(source.read(&mut block), 0);
    }
}
