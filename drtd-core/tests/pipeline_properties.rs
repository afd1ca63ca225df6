//! Cross-cutting pipeline properties

use drtd_core::dsp::{BitConverter, Mapper, MovingAverage, NrziDecoder};
use drtd_core::pipeline::{control, IdSequence, Stage, StageExt};

use proptest::prelude::*;

fn feed(stage: &mut impl Stage<In = f32, Out = bool>, samples: &[f32]) -> Vec<Option<bool>> {
    samples
        .iter()
        .map(|&sample| {
            control::prepare_sample();
            let out = stage.run(sample);
            (!control::aborted()).then_some(out)
        })
        .collect()
}

fn demod_chain() -> impl Stage<In = f32, Out = bool> {
    MovingAverage::<f32>::new(4)
        .then(Mapper::new(|x: f32| x < 0.0))
        .then(BitConverter::fixed(100.0))
        .then(NrziDecoder::new(true))
}

proptest! {
    /// Feeding a stream whole or split into two halves produces the same
    /// output sequence: no stage keeps per-call block state.
    #[test]
    fn split_feeding_is_transparent(samples in prop::collection::vec(-1.0f32..1.0, 32..256), split in 0usize..32) {
        let split = split.min(samples.len());

        let mut whole = demod_chain();
        let mut ids = IdSequence::new(0);
        whole.init(1000, &mut ids).unwrap();
        let expected = feed(&mut whole, &samples);

        let mut halves = demod_chain();
        let mut ids = IdSequence::new(0);
        halves.init(1000, &mut ids).unwrap();
        let mut actual = feed(&mut halves, &samples[..split]);
        actual.extend(feed(&mut halves, &samples[split..]));

        prop_assert_eq!(expected, actual);
    }

    /// A run of k whole bit-times of one level yields exactly k identical
    /// bits once flushed by later transitions.
    #[test]
    fn fixed_bit_converter_counts_runs(k in 1u32..64) {
        let mut converter = BitConverter::fixed(100.0);
        let mut ids = IdSequence::new(0);
        converter.init(1000, &mut ids).unwrap();

        let mut bits = Vec::new();
        let mut push = |converter: &mut BitConverter, value: bool, samples: u32| {
            for _ in 0..samples {
                control::prepare_sample();
                let bit = converter.run(value);
                if !control::aborted() {
                    bits.push(bit);
                }
            }
        };

        // Lead-in, the measured run, then enough trailing samples to
        // flush and drain the one-bit-per-sample FIFO
        push(&mut converter, false, 10);
        push(&mut converter, true, k * 10);
        push(&mut converter, false, 10);
        push(&mut converter, true, 10);
        push(&mut converter, false, 10 + k);

        let ones = bits.iter().filter(|&&bit| bit).count() as u32;
        prop_assert_eq!(ones, k);
    }
}
