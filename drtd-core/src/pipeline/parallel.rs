//! Fan-out composition: one input, N inner lines, one merge

use std::marker::PhantomData;

use crate::errors::PipelineError;
use crate::pipeline::{control, IdSequence, Stage, StageState, Tap};
use crate::SampleRate;

/// Runs `N` inner lines of identical type on the same input and merges the
/// per-line results. The result buffer is a stack array since the arity is
/// fixed at composition time. All inner lines must settle on the same
/// output sample rate at init.
pub struct Parallel<L, const N: usize, M, F> {
    lines: [L; N],
    merge: F,
    state: StageState,
    _result: PhantomData<fn() -> M>,
}

impl<L, const N: usize, M, F> Parallel<L, N, M, F>
where
    L: Stage,
    F: FnMut(&[L::Out; N]) -> M + Send,
{
    pub fn new(lines: [L; N], merge: F) -> Self {
        Self {
            lines,
            merge,
            state: StageState::new(),
            _result: PhantomData,
        }
    }
}

impl<L, const N: usize, M, F> Stage for Parallel<L, N, M, F>
where
    L: Stage,
    L::In: Clone,
    M: Tap + Default,
    F: FnMut(&[L::Out; N]) -> M + Send,
{
    type In = L::In;
    type Out = M;

    fn name(&self) -> &'static str {
        "Parallel"
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
        let mut output_rate = 0;
        for line in &mut self.lines {
            let line_rate = line.init(input_rate, ids)?;
            if output_rate == 0 {
                output_rate = line_rate;
            } else if line_rate != output_rate {
                return Err(PipelineError::ParallelRateMismatch {
                    left: output_rate,
                    right: line_rate,
                });
            }
        }
        Ok(output_rate)
    }

    fn transform(&mut self, input: Self::In) -> Self::Out {
        let lines = &mut self.lines;
        let results: [L::Out; N] = std::array::from_fn(|i| lines[i].run(input.clone()));
        if control::aborted() {
            return M::default();
        }
        (self.merge)(&results)
    }
}
