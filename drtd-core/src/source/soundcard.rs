//! Sound-card capture via cpal
//!
//! The cpal stream is not `Send`, so it lives on a dedicated capture
//! thread that mixes incoming frames to mono and pushes them into a
//! bounded channel. `read` drains that channel with a timeout so a stop
//! request is observed promptly.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{info, warn};

use crate::errors::DeviceError;
use crate::source::{CancelToken, SampleSource};
use crate::SampleRate;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Names of the available capture devices, index-addressable for `-i`.
pub fn input_names() -> Vec<String> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices
            .map(|device| device.name().unwrap_or_else(|_| "<unnamed>".into()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub struct SoundCardSource {
    device_index: Option<usize>,
    requested_rate: SampleRate,
    actual_rate: SampleRate,
    frames: Option<Receiver<Vec<f32>>>,
    cancel: CancelToken,
    leftover: Vec<f32>,
}

impl SoundCardSource {
    /// `device_index` of `None` selects the default input device.
    pub fn new(device_index: Option<usize>, requested_rate: SampleRate) -> Self {
        Self {
            device_index,
            requested_rate,
            actual_rate: 0,
            frames: None,
            cancel: CancelToken::new(),
            leftover: Vec::new(),
        }
    }

    fn capture_loop(
        device_index: Option<usize>,
        requested_rate: SampleRate,
        sender: Sender<Vec<f32>>,
        ready: Sender<Result<SampleRate, DeviceError>>,
        cancel: CancelToken,
    ) {
        let host = cpal::default_host();
        let device = match device_index {
            Some(index) => host.input_devices().ok().and_then(|mut devices| devices.nth(index)),
            None => host.default_input_device(),
        };
        let Some(device) = device else {
            let _ = ready.send(Err(DeviceError::NoInputDevice));
            return;
        };

        // Prefer capturing at the decoder rate; fall back to the device
        // default and let the processing thread resample.
        let config = match device.supported_input_configs() {
            Ok(configs) => configs
                .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
                .find(|c| {
                    c.min_sample_rate().0 <= requested_rate && requested_rate <= c.max_sample_rate().0
                })
                .map(|c| c.with_sample_rate(cpal::SampleRate(requested_rate)))
                .or_else(|| device.default_input_config().ok()),
            Err(_) => device.default_input_config().ok(),
        };
        let Some(config) = config else {
            let _ = ready.send(Err(DeviceError::UnsupportedRate {
                rate: requested_rate,
            }));
            return;
        };

        let rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        info!(
            "capturing from \"{}\" at {rate} Hz, {channels} channel(s)",
            device.name().unwrap_or_else(|_| "<unnamed>".into())
        );

        let data_sender = sender.clone();
        let stream = device.build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect();
                if let Err(TrySendError::Full(_)) = data_sender.try_send(mono) {
                    warn!("capture consumer is falling behind, dropping a block");
                }
            },
            |error| warn!("capture stream error: {error}"),
            None,
        );

        let stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                let _ = ready.send(Err(DeviceError::OpenFailed {
                    reason: error.to_string(),
                }));
                return;
            }
        };
        if let Err(error) = stream.play() {
            let _ = ready.send(Err(DeviceError::OpenFailed {
                reason: error.to_string(),
            }));
            return;
        }
        let _ = ready.send(Ok(rate));

        // Keep the stream alive until cancellation
        while !cancel.cancelled() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SampleSource for SoundCardSource {
    fn open(&mut self, cancel: CancelToken) -> Result<(), DeviceError> {
        let (sender, receiver) = bounded::<Vec<f32>>(16);
        let (ready_sender, ready_receiver) = bounded(1);

        let device_index = self.device_index;
        let requested_rate = self.requested_rate;
        let token = cancel.clone();
        std::thread::Builder::new()
            .name("soundcard-capture".into())
            .spawn(move || {
                Self::capture_loop(device_index, requested_rate, sender, ready_sender, token);
            })?;

        self.actual_rate = ready_receiver
            .recv()
            .map_err(|_| DeviceError::NoInputDevice)??;
        self.frames = Some(receiver);
        self.cancel = cancel;
        Ok(())
    }

    fn sample_rate(&self) -> SampleRate {
        self.actual_rate
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let Some(frames) = self.frames.clone() else {
            return 0;
        };

        let mut produced = 0;
        if !self.leftover.is_empty() {
            let take = self.leftover.len().min(buffer.len());
            buffer[..take].copy_from_slice(&self.leftover[..take]);
            self.leftover.drain(..take);
            produced = take;
        }

        while produced == 0 {
            if self.cancel.cancelled() {
                return 0;
            }
            match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    let take = frame.len().min(buffer.len());
                    buffer[..take].copy_from_slice(&frame[..take]);
                    self.leftover.extend_from_slice(&frame[take..]);
                    produced = take;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return 0,
            }
        }
        produced
    }

    fn close(&mut self) {
        self.cancel.cancel();
        self.frames = None;
    }
}
