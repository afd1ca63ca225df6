//! Typed signal-processing pipeline graph
//!
//! A pipeline is a composition of [`Stage`]s with statically known edge
//! types, threaded one sample at a time. Stages compose sequentially with
//! [`StageExt::then`] and fan out with [`Parallel`]. A single depth-first
//! [`Stage::init`] traversal assigns sequential ids and propagates the
//! sample rate from stage to stage.
//!
//! During a sample, any stage may call [`control::abort_processing`];
//! downstream stages then short-circuit to default values and the decoder
//! callback is skipped for that sample only.

pub mod config_ref;
pub mod control;
mod parallel;
mod tap;

pub use config_ref::ConfigRef;
pub use parallel::Parallel;
pub use tap::Tap;

use log::debug;

use crate::errors::PipelineError;
use crate::SampleRate;

/// Identifier of a stage inside one pipeline, assigned at init.
pub type StageId = i32;

/// Dispenses sequential stage ids during the init traversal.
#[derive(Debug)]
pub struct IdSequence {
    next: StageId,
}

impl IdSequence {
    pub fn new(first: StageId) -> Self {
        Self { next: first }
    }

    pub fn next(&mut self) -> StageId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Bookkeeping every stage carries: id and the sample rates of its edges.
#[derive(Debug, Clone, Default)]
pub struct StageState {
    pub id: StageId,
    pub input_rate: SampleRate,
    pub output_rate: SampleRate,
}

impl StageState {
    pub fn new() -> Self {
        Self {
            id: -1,
            input_rate: 0,
            output_rate: 0,
        }
    }
}

/// One node of the pipeline graph.
///
/// Implementors provide [`Stage::transform`] plus optionally
/// [`Stage::on_init`] when the stage derives coefficients from the sample
/// rate or changes it. The provided `init`/`run` wrappers handle id
/// assignment, rate threading, abort short-circuiting and the monitor tap.
pub trait Stage: Send {
    type In: Tap;
    type Out: Tap + Default;

    fn name(&self) -> &'static str;
    fn state(&self) -> &StageState;
    fn state_mut(&mut self) -> &mut StageState;

    /// Configure for `input_rate`; return the output rate. Composite
    /// stages use `ids` to init their children.
    fn on_init(
        &mut self,
        input_rate: SampleRate,
        ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        let _ = ids;
        Ok(input_rate)
    }

    fn transform(&mut self, input: Self::In) -> Self::Out;

    fn init(
        &mut self,
        input_rate: SampleRate,
        ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        let id = ids.next();
        let output_rate = self.on_init(input_rate, ids)?;
        if output_rate == 0 {
            return Err(PipelineError::ZeroOutputRate { stage: self.name() });
        }
        let state = self.state_mut();
        state.id = id;
        state.input_rate = input_rate;
        state.output_rate = output_rate;
        debug!(
            "init stage \"{}\": id {id}, {input_rate} Hz in, {output_rate} Hz out",
            self.name()
        );
        Ok(output_rate)
    }

    fn run(&mut self, input: Self::In) -> Self::Out {
        if control::aborted() {
            return Self::Out::default();
        }

        let id = self.state().id;
        if control::monitoring(id, control::Edge::Input) {
            control::monitor_sample(input.tap(control::channel()));
        }
        let output = self.transform(input);
        if control::monitoring(id, control::Edge::Output) && !control::aborted() {
            control::monitor_sample(output.tap(control::channel()));
        }
        output
    }
}

/// Sequential composition of two stages.
pub struct Chain<A, B> {
    first: A,
    second: B,
    state: StageState,
}

impl<A, B> Stage for Chain<A, B>
where
    A: Stage,
    B: Stage<In = A::Out>,
{
    type In = A::In;
    type Out = B::Out;

    fn name(&self) -> &'static str {
        "Line"
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    fn on_init(
        &mut self,
        input_rate: SampleRate,
        ids: &mut IdSequence,
    ) -> Result<SampleRate, PipelineError> {
        let mid_rate = self.first.init(input_rate, ids)?;
        self.second.init(mid_rate, ids)
    }

    fn transform(&mut self, input: Self::In) -> Self::Out {
        let mid = self.first.run(input);
        self.second.run(mid)
    }
}

/// Chaining adapter: `a.then(b)` runs `a` then feeds its output to `b`.
pub trait StageExt: Stage + Sized {
    fn then<B>(self, next: B) -> Chain<Self, B>
    where
        B: Stage<In = Self::Out>,
    {
        Chain {
            first: self,
            second: next,
            state: StageState::new(),
        }
    }
}

impl<S: Stage> StageExt for S {}

/// Type-erased pipeline front as seen by a decoder: floats in, the
/// decoder-private result type out.
pub trait SamplePipeline<R>: Send {
    /// Run the init traversal, ids starting from zero.
    fn init_graph(&mut self, input_rate: SampleRate) -> Result<SampleRate, PipelineError>;
    fn run_sample(&mut self, sample: f32) -> R;
}

impl<S, R> SamplePipeline<R> for S
where
    S: Stage<In = f32, Out = R>,
    R: Tap + Default,
{
    fn init_graph(&mut self, input_rate: SampleRate) -> Result<SampleRate, PipelineError> {
        let mut ids = IdSequence::new(0);
        self.init(input_rate, &mut ids)
    }

    fn run_sample(&mut self, sample: f32) -> R {
        self.run(sample)
    }
}

/// Implements `name`/`state`/`state_mut` for a stage struct carrying a
/// `state: StageState` field.
macro_rules! impl_stage_state {
    ($name:literal) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn state(&self) -> &$crate::pipeline::StageState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut $crate::pipeline::StageState {
            &mut self.state
        }
    };
}

pub(crate) use impl_stage_state;
