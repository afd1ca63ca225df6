//! Decoder framework
//!
//! A decoder declares its protocol name, required input sample rate and
//! marker metadata, builds its pipeline at `setup`, receives one float per
//! `process` call and emits finished records through its sink. The
//! pipeline result type stays private to the decoder: the outside world
//! only ever calls `process(f32)`.

pub mod ax25;
pub mod dcf77;
pub mod dtmf;
pub mod pocsag;
pub mod rtty;

pub use ax25::Ax25;
pub use dcf77::Dcf77;
pub use dtmf::Dtmf;
pub use pocsag::Pocsag;
pub use rtty::Rtty;

use std::io::Write;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::errors::DrtdError;
use crate::pipeline::{control, SamplePipeline, Tap};
use crate::SampleRate;

/// The pipeline mutation lock is the mutex around the boxed decoder: the
/// processing thread holds it for one block of samples at a time, and all
/// external parameter edits go through it.
pub type SharedDecoder = Arc<Mutex<Box<dyn Decoder>>>;

/// One marked band relative to the center frequency.
#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub offset: i32,
    pub bandwidth: u32,
}

/// Visualization metadata: where the decoder listens relative to its
/// center frequency, and whether the group may be dragged.
#[derive(Debug, Clone, Default)]
pub struct MarkerGroup {
    pub markers: Vec<Marker>,
    pub moveable: bool,
}

/// Where finished records go. Stdout is flushed at record boundaries;
/// the channel variant is for tests and embedding.
#[derive(Clone, Default)]
pub enum RecordSink {
    #[default]
    Stdout,
    Channel(Sender<String>),
}

impl RecordSink {
    pub fn emit(&self, text: &str) {
        match self {
            RecordSink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            RecordSink::Channel(sender) => {
                let _ = sender.send(text.to_string());
            }
        }
    }
}

/// State common to every decoder; decoders embed one and delegate the
/// trait's accessors to it.
pub struct DecoderInfo {
    name: &'static str,
    sample_rate: SampleRate,
    headless: bool,
    marker: MarkerGroup,
    center_frequency: u32,
    min_center_frequency: u32,
    pub sink: RecordSink,
}

impl DecoderInfo {
    pub fn new(name: &'static str, sample_rate: SampleRate, headless: bool) -> Self {
        Self {
            name,
            sample_rate,
            headless,
            marker: MarkerGroup::default(),
            center_frequency: 0,
            min_center_frequency: 0,
            sink: RecordSink::default(),
        }
    }

    pub fn config_key(&self, property: &str) -> String {
        format!("Decoder.{}.{property}", self.name)
    }

    /// Install the marker group and derive the smallest center frequency
    /// that keeps every marked band above 0 Hz.
    pub fn set_marker(&mut self, marker: MarkerGroup) {
        self.min_center_frequency = marker
            .markers
            .iter()
            .filter(|m| m.offset < 0)
            .map(|m| (-m.offset) as u32 + m.bandwidth / 2)
            .max()
            .unwrap_or(0);
        self.marker = marker;
        self.center_frequency = self.center_frequency.max(self.min_center_frequency);
    }

    /// Clamp into `[min_center_frequency, sample_rate / 2]`; returns the
    /// frequency actually applied.
    pub fn set_center_frequency(&mut self, frequency: u32) -> u32 {
        self.center_frequency = frequency
            .clamp(self.min_center_frequency, self.sample_rate / 2);
        self.center_frequency
    }
}

pub trait Decoder: Send {
    fn info(&self) -> &DecoderInfo;
    fn info_mut(&mut self) -> &mut DecoderInfo;

    /// Build the pipeline and load persisted settings.
    fn setup(&mut self) -> Result<(), DrtdError>;

    /// Release the pipeline and persist settings.
    fn tear_down(&mut self);

    /// Run one input sample through the pipeline and advance the protocol
    /// state machine with the result.
    fn process(&mut self, sample: f32);

    /// Human-readable descriptors of the changeable parameters, in the
    /// order `setup_parameters` expects them.
    fn changeable_parameters(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Apply textual parameter values; the caller guarantees the count
    /// matches `changeable_parameters`. Returns false on a parse error.
    fn setup_parameters(&mut self, values: &[String]) -> bool {
        let _ = values;
        true
    }

    /// Reaction to the center frequency moving (marker drag or parameter).
    fn on_marker_move(&mut self, center_frequency: u32) {
        let _ = center_frequency;
    }

    fn name(&self) -> &'static str {
        self.info().name
    }

    fn input_sample_rate(&self) -> SampleRate {
        self.info().sample_rate
    }

    fn headless(&self) -> bool {
        self.info().headless
    }

    fn marker(&self) -> &MarkerGroup {
        &self.info().marker
    }

    fn center_frequency(&self) -> u32 {
        self.info().center_frequency
    }

    fn min_center_frequency(&self) -> u32 {
        self.info().min_center_frequency
    }

    fn set_center_frequency(&mut self, frequency: u32) {
        let applied = self.info_mut().set_center_frequency(frequency);
        self.on_marker_move(applied);
    }

    fn set_record_sink(&mut self, sink: RecordSink) {
        self.info_mut().sink = sink;
    }
}

/// Owns the boxed pipeline between `setup` and `tear_down` and runs the
/// per-sample abort protocol.
pub struct PipelineHost<R> {
    pipeline: Option<Box<dyn SamplePipeline<R>>>,
}

impl<R: Tap + Default> PipelineHost<R> {
    pub fn new() -> Self {
        Self { pipeline: None }
    }

    pub fn install(
        &mut self,
        mut pipeline: Box<dyn SamplePipeline<R>>,
        input_rate: SampleRate,
    ) -> Result<(), DrtdError> {
        pipeline.init_graph(input_rate)?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    pub fn release(&mut self) {
        self.pipeline = None;
    }

    /// Returns the pipeline tail value, or `None` when the sample was
    /// aborted inside the graph.
    pub fn process(&mut self, sample: f32) -> Option<R> {
        let pipeline = self.pipeline.as_mut()?;
        control::prepare_sample();
        let result = pipeline.run_sample(sample);
        if control::aborted() {
            None
        } else {
            Some(result)
        }
    }
}

impl<R: Tap + Default> Default for PipelineHost<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// All decoders, in presentation order.
pub fn registry() -> Vec<Box<dyn Decoder>> {
    vec![
        Box::new(Ax25::new()),
        Box::new(Rtty::new()),
        Box::new(Pocsag::new()),
        Box::new(Dtmf::new()),
        Box::new(Dcf77::new()),
    ]
}
