//! Stateless element-wise mapping stage

use crate::pipeline::{impl_stage_state, Stage, StageState, Tap};

/// Applies a plain function to each sample. Holding a function pointer
/// rather than a generic closure keeps parallel lines that only differ in
/// their mapper the same type.
pub struct Mapper<In, Out> {
    map: fn(In) -> Out,
    state: StageState,
}

impl<In, Out> Mapper<In, Out> {
    pub fn new(map: fn(In) -> Out) -> Self {
        Self {
            map,
            state: StageState::new(),
        }
    }
}

impl<In, Out> Stage for Mapper<In, Out>
where
    In: Tap,
    Out: Tap + Default,
{
    type In = In;
    type Out = Out;

    impl_stage_state!("Mapper");

    fn transform(&mut self, input: In) -> Out {
        (self.map)(input)
    }
}
