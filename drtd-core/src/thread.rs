//! The processing thread
//!
//! Owns the sample source, reads fixed 1024-sample blocks, optionally
//! resamples to the decoder's required rate and feeds the decoder one
//! sample at a time. The decoder mutex doubles as the pipeline mutation
//! lock: it is held for one block at a time, so parameter edits made
//! under it elsewhere become visible at block boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::decoder::SharedDecoder;
use crate::errors::DeviceError;
use crate::resampler::Resampler;
use crate::source::{CancelToken, SampleSource};
use crate::util::lock;

pub const BLOCK_SIZE: usize = 1024;

pub struct ProcessingThread {
    handle: Option<JoinHandle<()>>,
    run: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl ProcessingThread {
    /// Open the source and start pumping samples into the decoder. The
    /// decoder must already be set up.
    pub fn start(
        decoder: SharedDecoder,
        mut source: Box<dyn SampleSource>,
    ) -> Result<Self, DeviceError> {
        let cancel = CancelToken::new();
        source.open(cancel.clone())?;

        let source_rate = source.sample_rate();
        let target_rate = lock(&decoder).input_sample_rate();
        let mut resampler =
            (source_rate != target_rate).then(|| Resampler::new(source_rate, target_rate));
        info!("processing thread: {source_rate} Hz in, {target_rate} Hz to decoder");

        let run = Arc::new(AtomicBool::new(true));
        let run_flag = Arc::clone(&run);
        let handle = std::thread::Builder::new()
            .name("processing".into())
            .spawn(move || {
                let mut block = [0.0f32; BLOCK_SIZE];
                while run_flag.load(Ordering::Acquire) {
                    let read = source.read(&mut block);
                    if read == 0 {
                        if run_flag.load(Ordering::Acquire) {
                            warn!("sample source ran dry, stopping");
                        }
                        break;
                    }

                    // Block-scoped hold of the pipeline mutation lock
                    let mut decoder = lock(&decoder);
                    for &sample in &block[..read] {
                        if !run_flag.load(Ordering::Acquire) {
                            break;
                        }
                        match resampler.as_mut() {
                            Some(resampler) => {
                                resampler.push(sample);
                                while let Some(resampled) = resampler.pull() {
                                    decoder.process(resampled);
                                }
                            }
                            None => decoder.process(sample),
                        }
                    }
                }
                source.close();
                run_flag.store(false, Ordering::Release);
            })
            .map_err(DeviceError::Io)?;

        Ok(Self {
            handle: Some(handle),
            run,
            cancel,
        })
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    /// Signal the thread and its source to stop, then join. Idempotent.
    pub fn request_stop_and_wait(&mut self) {
        self.run.store(false, Ordering::Release);
        self.cancel.cancel();
        self.join();
    }

    /// Wait for the thread to finish on its own (source end of stream).
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessingThread {
    fn drop(&mut self) {
        self.request_stop_and_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, DecoderInfo};
    use crate::errors::DrtdError;
    use crate::source::WavFileSource;
    use std::sync::Mutex;

    use std::sync::atomic::AtomicUsize;

    struct CountingDecoder {
        info: DecoderInfo,
        seen: Arc<AtomicUsize>,
    }

    impl CountingDecoder {
        fn new(rate: u32) -> (Self, Arc<AtomicUsize>) {
            let seen = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    info: DecoderInfo::new("Counting", rate, true),
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    impl Decoder for CountingDecoder {
        fn info(&self) -> &DecoderInfo {
            &self.info
        }
        fn info_mut(&mut self) -> &mut DecoderInfo {
            &mut self.info
        }
        fn setup(&mut self) -> Result<(), DrtdError> {
            Ok(())
        }
        fn tear_down(&mut self) {}
        fn process(&mut self, _sample: f32) {
            self.seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn feeds_every_sample_and_stops_at_end_of_stream() {
        let (decoder, seen) = CountingDecoder::new(8000);
        let decoder: SharedDecoder = Arc::new(Mutex::new(Box::new(decoder)));
        let source = WavFileSource::from_samples(8000, vec![0.5; 4096]);

        let mut thread = ProcessingThread::start(Arc::clone(&decoder), Box::new(source)).unwrap();
        thread.join();
        assert!(!thread.is_running());
        assert_eq!(seen.load(Ordering::Relaxed), 4096);
    }

    #[test]
    fn resamples_when_source_and_decoder_rates_differ() {
        let (decoder, seen) = CountingDecoder::new(4000);
        let decoder: SharedDecoder = Arc::new(Mutex::new(Box::new(decoder)));
        let source = WavFileSource::from_samples(8000, vec![1.0; 8000]);

        let mut thread = ProcessingThread::start(Arc::clone(&decoder), Box::new(source)).unwrap();
        thread.join();
        // 8000 source samples at a 2:1 ratio make 4000 decoder samples
        assert_eq!(seen.load(Ordering::Relaxed), 4000);
    }

    #[test]
    fn stop_is_idempotent() {
        let (decoder, _seen) = CountingDecoder::new(8000);
        let decoder: SharedDecoder = Arc::new(Mutex::new(Box::new(decoder)));
        let source = WavFileSource::from_samples(8000, vec![0.0; 100_000]);
        let mut thread = ProcessingThread::start(Arc::clone(&decoder), Box::new(source)).unwrap();
        thread.request_stop_and_wait();
        thread.request_stop_and_wait();
        assert!(!thread.is_running());
    }
}
