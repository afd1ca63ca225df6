//! DTMF decoder
//!
//! Two parallel Goertzel banks, one over the row tones and one over the
//! column tones; each bank reports its strongest bin (aborting the sample
//! when every bin is silent) and the merge folds row and column into a
//! symbol index. Symbols must hold for 50 ms, gaps under 10 ms inside one
//! symbol are ignored and more than half a second of silence appends a
//! newline.

use crate::decoder::{Decoder, DecoderInfo, PipelineHost};
use crate::dsp::GoertzelFilter;
use crate::errors::DrtdError;
use crate::pipeline::{control, Parallel};
use crate::Taps;

const SAMPLE_RATE: u32 = 4000;
/// About 50 Hz per bin
const FILTER_TAPS: Taps = (SAMPLE_RATE / 50) as Taps;
const REQUIRED_SAMPLES_PER_SYMBOL: u32 = SAMPLE_RATE / 20; // 50 ms
const MINIMUM_SAMPLES_PER_SPACE: u32 = SAMPLE_RATE / 100; // 10 ms
const MINIMUM_SAMPLES_PER_BLOCK: u32 = SAMPLE_RATE / 2; // 500 ms

const ROW_FREQUENCIES: [f32; 4] = [697.0, 770.0, 852.0, 941.0];
const COLUMN_FREQUENCIES: [f32; 4] = [1209.0, 1336.0, 1477.0, 1633.0];

const SYMBOLS: [char; 16] = [
    '1', '2', '3', 'A', '4', '5', '6', 'B', '7', '8', '9', 'C', '*', '0', '#', 'D',
];

fn strongest_bin(levels: &[f32; 4]) -> u8 {
    let mut max = levels[0];
    let mut max_index = 0u8;
    for (index, &level) in levels.iter().enumerate() {
        if level > max {
            max = level;
            max_index = index as u8;
        }
    }
    if max == 0.0 {
        control::abort_processing();
    }
    max_index
}

type Bank = Parallel<GoertzelFilter, 4, u8, fn(&[f32; 4]) -> u8>;

fn bank(frequencies: [f32; 4]) -> Bank {
    Parallel::new(
        frequencies.map(|frequency| GoertzelFilter::new(FILTER_TAPS, frequency)),
        strongest_bin as fn(&[f32; 4]) -> u8,
    )
}

pub struct Dtmf {
    info: DecoderInfo,
    host: PipelineHost<u8>,
    last_symbol: char,
    last_valid: char,
    sample_count: u32,
    last_interruption: u32,
    samples_since_valid: u32,
}

impl Dtmf {
    pub fn new() -> Self {
        Self {
            info: DecoderInfo::new("DTMF", SAMPLE_RATE, true),
            host: PipelineHost::new(),
            last_symbol: '-',
            last_valid: '-',
            sample_count: 0,
            last_interruption: 0,
            samples_since_valid: 0,
        }
    }

    fn handle_symbol(&mut self, symbol_index: u8) {
        let received = SYMBOLS[(symbol_index & 0xF) as usize];

        if received != self.last_symbol {
            if self.sample_count > REQUIRED_SAMPLES_PER_SYMBOL {
                let resumed_after_gap = self.last_valid == self.last_symbol
                    && self.last_interruption > 0
                    && self.last_interruption < MINIMUM_SAMPLES_PER_SPACE;
                if resumed_after_gap {
                    self.last_interruption = 0;
                    self.last_symbol = received;
                    self.sample_count = 1;
                    return;
                }

                let decoded = self.last_symbol;
                self.last_valid = decoded;
                self.last_interruption = 0;
                self.samples_since_valid = 1;
                self.info.sink.emit(&decoded.to_string());
            } else {
                self.last_interruption += self.sample_count;
            }

            self.last_symbol = received;
            self.sample_count = 1;
        } else {
            self.sample_count += 1;
        }

        if self.samples_since_valid > MINIMUM_SAMPLES_PER_BLOCK {
            self.info.sink.emit("\n");
            self.samples_since_valid = 0;
        } else if self.samples_since_valid > 0 {
            self.samples_since_valid += 1;
        }
    }
}

impl Default for Dtmf {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Dtmf {
    fn info(&self) -> &DecoderInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut DecoderInfo {
        &mut self.info
    }

    fn setup(&mut self) -> Result<(), DrtdError> {
        let pipeline = Parallel::new(
            [bank(ROW_FREQUENCIES), bank(COLUMN_FREQUENCIES)],
            |bins: &[u8; 2]| bins[0] * 4 + bins[1],
        );
        self.host.install(Box::new(pipeline), SAMPLE_RATE)?;

        self.last_symbol = '-';
        self.last_valid = '-';
        self.sample_count = 0;
        self.last_interruption = 0;
        self.samples_since_valid = 0;
        Ok(())
    }

    fn tear_down(&mut self) {
        self.host.release();
    }

    fn process(&mut self, sample: f32) {
        if let Some(symbol_index) = self.host.process(sample) {
            self.handle_symbol(symbol_index);
        }
    }
}
