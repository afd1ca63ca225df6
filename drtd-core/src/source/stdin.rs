//! Raw PCM from standard input
//!
//! Mono signed integer samples, 8 or 16 bits wide, at a caller-supplied
//! rate. A detached reader thread performs the blocking reads and hands
//! chunks over a bounded channel; cancellation is observed between chunks
//! so a stop request never waits on stdin.

use std::io::Read;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, info};

use crate::errors::DeviceError;
use crate::source::{CancelToken, SampleSource};
use crate::SampleRate;

const CHUNK_BYTES: usize = 2048;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S8,
    S16 { big_endian: bool },
}

pub struct StdinSource {
    sample_rate: SampleRate,
    format: SampleFormat,
    chunks: Option<Receiver<Vec<u8>>>,
    cancel: CancelToken,
    /// First byte of a 16-bit sample split across chunk boundaries.
    pending_byte: Option<u8>,
}

impl StdinSource {
    pub fn new(sample_rate: SampleRate, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            format,
            chunks: None,
            cancel: CancelToken::new(),
            pending_byte: None,
        }
    }

    fn decode_into(&mut self, bytes: &[u8], output: &mut [f32], produced: &mut usize) {
        const SCALE: f32 = 1.0 / i16::MAX as f32;

        match self.format {
            SampleFormat::S8 => {
                for &byte in bytes {
                    if *produced == output.len() {
                        break;
                    }
                    output[*produced] = byte as i8 as f32 * SCALE;
                    *produced += 1;
                }
            }
            SampleFormat::S16 { big_endian } => {
                for &byte in bytes {
                    match self.pending_byte.take() {
                        None => self.pending_byte = Some(byte),
                        Some(first) => {
                            if *produced == output.len() {
                                self.pending_byte = Some(first);
                                break;
                            }
                            let sample = if big_endian {
                                i16::from_be_bytes([first, byte])
                            } else {
                                i16::from_le_bytes([first, byte])
                            };
                            output[*produced] = f32::from(sample) * SCALE;
                            *produced += 1;
                        }
                    }
                }
            }
        }
    }
}

impl SampleSource for StdinSource {
    fn open(&mut self, cancel: CancelToken) -> Result<(), DeviceError> {
        info!(
            "reading {} samples from stdin at {} Hz",
            match self.format {
                SampleFormat::S8 => "8-bit".to_string(),
                SampleFormat::S16 { big_endian } =>
                    format!("16-bit {}", if big_endian { "BE" } else { "LE" }),
            },
            self.sample_rate
        );

        let (sender, receiver) = bounded::<Vec<u8>>(4);
        let token = cancel.clone();
        std::thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let mut stdin = std::io::stdin().lock();
                let mut chunk = vec![0u8; CHUNK_BYTES];
                loop {
                    match stdin.read(&mut chunk) {
                        Ok(0) => {
                            debug!("stdin reached end of stream");
                            break;
                        }
                        Ok(count) => {
                            if sender.send(chunk[..count].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            debug!("stdin read failed: {error}");
                            break;
                        }
                    }
                    if token.cancelled() {
                        break;
                    }
                }
            })?;

        self.chunks = Some(receiver);
        self.cancel = cancel;
        Ok(())
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let Some(chunks) = self.chunks.clone() else {
            return 0;
        };

        let mut produced = 0;
        while produced == 0 {
            if self.cancel.cancelled() {
                return 0;
            }
            match chunks.recv_timeout(POLL_INTERVAL) {
                Ok(bytes) => self.decode_into(&bytes, buffer, &mut produced),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return 0,
            }
        }
        produced
    }

    fn close(&mut self) {
        self.cancel.cancel();
        self.chunks = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_16_bit_across_chunk_boundaries() {
        let mut source = StdinSource::new(8000, SampleFormat::S16 { big_endian: false });
        let mut output = [0.0f32; 8];
        let mut produced = 0;

        // 0x7FFF split over two chunks, then 0x8001 in one
        source.decode_into(&[0xFF], &mut output, &mut produced);
        assert_eq!(produced, 0);
        source.decode_into(&[0x7F, 0x01, 0x80], &mut output, &mut produced);
        assert_eq!(produced, 2);
        assert!((output[0] - 1.0).abs() < 1e-6);
        assert!((output[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn decodes_big_endian_when_asked() {
        let mut source = StdinSource::new(8000, SampleFormat::S16 { big_endian: true });
        let mut output = [0.0f32; 2];
        let mut produced = 0;
        source.decode_into(&[0x7F, 0xFF], &mut output, &mut produced);
        assert_eq!(produced, 1);
        assert!((output[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn decodes_8_bit_samples() {
        let mut source = StdinSource::new(8000, SampleFormat::S8);
        let mut output = [0.0f32; 4];
        let mut produced = 0;
        source.decode_into(&[0x7F, 0x80, 0x00], &mut output, &mut produced);
        assert_eq!(produced, 3);
        assert!(output[0] > 0.0 && output[1] < 0.0 && output[2] == 0.0);
    }
}
