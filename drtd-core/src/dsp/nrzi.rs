//! NRZI decoder: transition = 0, no transition = 1 (or inverted)

use crate::pipeline::{impl_stage_state, Stage, StageState};

pub struct NrziDecoder {
    inverted: bool,
    last_sample: bool,
    state: StageState,
}

impl NrziDecoder {
    pub fn new(inverted: bool) -> Self {
        Self {
            inverted,
            last_sample: false,
            state: StageState::new(),
        }
    }
}

impl Stage for NrziDecoder {
    type In = bool;
    type Out = bool;

    impl_stage_state!("NRZI Decoder");

    fn transform(&mut self, sample: bool) -> bool {
        let result = (sample == self.last_sample) == self.inverted;
        self.last_sample = sample;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::control;
    use crate::pipeline::{IdSequence, Stage};

    /// NRZI encode with "0 toggles, 1 holds", the convention the decoder
    /// with `inverted = true` undoes.
    fn encode(bits: &[bool]) -> Vec<bool> {
        let mut level = false;
        bits.iter()
            .map(|&bit| {
                if !bit {
                    level = !level;
                }
                level
            })
            .collect()
    }

    #[test]
    fn decoding_inverts_the_encoder() {
        let bits: Vec<bool> = (0..64).map(|i| (i * 7) % 3 == 0).collect();
        let mut decoder = NrziDecoder::new(true);
        let mut ids = IdSequence::new(0);
        decoder.init(1000, &mut ids).unwrap();
        control::prepare_sample();

        let decoded: Vec<bool> = encode(&bits).into_iter().map(|s| decoder.run(s)).collect();
        // The first decoded bit depends on the decoder's idle level; all
        // following bits must match.
        assert_eq!(&decoded[1..], &bits[1..]);
    }
}
