//! POCSAG pager decoder (512/1200/2400 baud FSK)
//!
//! The pipeline is a matched filter (moving average sized to one bit once
//! the baud rate is known), a sign threshold and a bit converter in sync
//! mode hunting the three standard rates. The framing layer checks the
//! alternating preamble, waits for the 32-bit sync word (a bitwise
//! inverted sync word flips polarity for the rest of the transmission),
//! then reads batches of 16 codewords with BCH(31,21) correction.

mod data;
mod message;

pub use data::{Codeword, CodewordKind, IDLE_WORD, PREAMBLE_BITS, SYNC_WORD};
pub use message::{ContentType, MessageBuilder};

use log::{debug, info};

use crate::decoder::{Decoder, DecoderInfo, PipelineHost};
use crate::dsp::{BitConverter, BitConverterState, Mapper, MovingAverage, MovingAverageState};
use crate::errors::DrtdError;
use crate::fec::{BchCode, EncodingShape, Z2Polynomial};
use crate::pipeline::{ConfigRef, StageExt};
use crate::store;
use crate::util::BitBuffer;

const SAMPLE_RATE: u32 = 12000;
const SYNC_BITS_REQUIRED: u16 = 25;
const CODEWORDS_PER_BATCH: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FirstBitSinceSync,
    WaitInitialSync,
    WaitImmediateSync,
    ReadBatch,
}

pub struct Pocsag {
    info: DecoderInfo,
    host: PipelineHost<bool>,
    matched_filter: ConfigRef<MovingAverageState<f32>>,
    converter: ConfigRef<BitConverterState>,
    bch: BchCode,
    state: State,
    incoming: BitBuffer<32, true>,
    preamble_count: u32,
    codeword_count: u32,
    parity_accumulator: bool,
    inverted: bool,
    last_bit: bool,
    builder: MessageBuilder,
    content_type: ContentType,
}

impl Pocsag {
    pub fn new() -> Self {
        Self {
            info: DecoderInfo::new("POCSAG", SAMPLE_RATE, true),
            host: PipelineHost::new(),
            matched_filter: ConfigRef::unbound(),
            converter: ConfigRef::unbound(),
            bch: BchCode::new(
                31,
                21,
                2,
                EncodingShape::Prefix,
                Z2Polynomial::new(0b11101101001),
            ),
            state: State::FirstBitSinceSync,
            incoming: BitBuffer::new(),
            preamble_count: 0,
            codeword_count: 0,
            parity_accumulator: false,
            inverted: false,
            last_bit: false,
            builder: MessageBuilder::new(),
            content_type: ContentType::AlphaNumeric,
        }
    }

    fn current_baud_rate(&self) -> u16 {
        self.converter
            .with(|converter| converter.current_baud_rate().round() as u16)
            .unwrap_or(0)
    }

    fn reset(&mut self) {
        self.matched_filter.with(|filter| filter.set_taps(1));
        self.converter.with(BitConverterState::wait_for_sync);
        self.codeword_count = 0;
        self.inverted = false;
        self.incoming.reset();
        self.preamble_count = 0;
        self.state = State::FirstBitSinceSync;
        self.builder = MessageBuilder::new();
    }

    fn message_done(&mut self) {
        let builder = std::mem::take(&mut self.builder);
        if builder.valid() {
            let record = builder.build(self.content_type, self.current_baud_rate());
            self.info.sink.emit(&record);
        }
    }

    /// Strip the parity bit and run BCH correction in the 31-bit space.
    fn correct(&self, word: u32) -> Option<u32> {
        self.bch
            .correct(u64::from(word >> 1))
            .map(|corrected| corrected as u32)
    }

    fn handle_bit(&mut self, sample: bool) {
        let sample = sample ^ self.inverted;
        self.parity_accumulator ^= sample;
        self.incoming.push(sample);

        match self.state {
            State::FirstBitSinceSync => {
                self.last_bit = sample;
                self.state = State::WaitInitialSync;
            }
            State::WaitInitialSync | State::WaitImmediateSync => {
                if self.state == State::WaitInitialSync {
                    self.incoming.reset_bit_count();
                    // The first bits after bit-clock lock may double up
                    // while the matched filter settles; tolerate those.
                    let alternation_enforced = (4..PREAMBLE_BITS / 4).contains(&self.preamble_count);
                    if sample == self.last_bit && alternation_enforced {
                        debug!("preamble stopped alternating, resetting");
                        self.reset();
                        return;
                    }
                    self.last_bit = sample;
                    self.preamble_count += 1;
                    if self.preamble_count > PREAMBLE_BITS * 3 {
                        debug!("preamble too long, resetting");
                        self.reset();
                        return;
                    }
                } else if !self.incoming.aligned() {
                    return;
                }

                let received = self.incoming.value() as u32;
                let word = if self.state == State::WaitImmediateSync {
                    // Between batches the sync word itself may carry
                    // correctable errors.
                    self.correct(received).map(|w| w << 1)
                } else {
                    Some(received)
                };

                match word {
                    Some(word) if word == SYNC_WORD => {
                        debug!("sync word found");
                    }
                    Some(word) if word == !SYNC_WORD => {
                        if self.state == State::WaitInitialSync {
                            info!("inverted sync detected, inverting all further bits");
                            self.inverted = true;
                        }
                    }
                    Some(_) => return,
                    None => {
                        debug!("expected sync codeword did not correct, message done");
                        self.message_done();
                        self.reset();
                        return;
                    }
                }

                info!("synced at {} baud", self.current_baud_rate());
                self.state = State::ReadBatch;
                self.parity_accumulator = true;
            }
            State::ReadBatch => {
                if !self.incoming.aligned() {
                    return;
                }

                // Even parity over all 32 bits
                if !self.parity_accumulator {
                    debug!("codeword parity error");
                }

                match self.correct(self.incoming.value() as u32) {
                    Some(corrected) => {
                        let codeword = Codeword::from_corrected(self.codeword_count, corrected);
                        match codeword.kind() {
                            // An address or idle word ends the message in
                            // flight; a new address opens the next one.
                            CodewordKind::Address => {
                                self.message_done();
                                self.builder.append(&codeword);
                            }
                            CodewordKind::Idle => self.message_done(),
                            CodewordKind::Data => self.builder.append(&codeword),
                        }
                    }
                    None => {
                        debug!("uncorrectable codeword");
                        self.builder.mark_invalid_codeword();
                    }
                }

                self.codeword_count += 1;
                if self.codeword_count >= CODEWORDS_PER_BATCH {
                    self.state = State::WaitImmediateSync;
                    self.codeword_count = 0;
                }
                self.parity_accumulator = true;
            }
        }
    }
}

impl Default for Pocsag {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Pocsag {
    fn info(&self) -> &DecoderInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut DecoderInfo {
        &mut self.info
    }

    fn setup(&mut self) -> Result<(), DrtdError> {
        self.content_type = ContentType::from_u8(store::get(
            &self.info.config_key("ContentType"),
            self.content_type.as_u8(),
        ));

        let moving_average = MovingAverage::<f32>::new(1);
        let converter = BitConverter::sync(SYNC_BITS_REQUIRED, vec![512.0, 1200.0, 2400.0]);

        self.matched_filter = moving_average.config_ref();
        self.converter = converter.config_ref();

        // Once the bit clock locks, size the matched filter to one bit
        let filter = self.matched_filter.clone();
        self.converter.with(move |state| {
            state.set_sync_callback(move |sync| {
                filter.with(|f| f.set_taps(sync.samples_per_bit.round() as usize));
            });
        });

        let pipeline = moving_average
            .then(Mapper::new(|sample: f32| sample < 0.0))
            .then(converter);
        self.host.install(Box::new(pipeline), SAMPLE_RATE)?;

        self.reset();
        Ok(())
    }

    fn tear_down(&mut self) {
        store::set(
            &self.info.config_key("ContentType"),
            self.content_type.as_u8(),
        );
        self.host.release();
        self.matched_filter = ConfigRef::unbound();
        self.converter = ConfigRef::unbound();
    }

    fn process(&mut self, sample: f32) {
        if let Some(bit) = self.host.process(sample) {
            self.handle_bit(bit);
        }
    }

    fn changeable_parameters(&self) -> Vec<&'static str> {
        vec!["None/Alpha/Numeric/Both"]
    }

    fn setup_parameters(&mut self, values: &[String]) -> bool {
        match ContentType::parse(&values[0]) {
            Some(content_type) => {
                self.content_type = content_type;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RecordSink;
    use crate::fec::{BchCode, EncodingShape};
    use crossbeam_channel::unbounded;

    pub(crate) fn encode_codeword(payload21: u32) -> u32 {
        let bch = BchCode::new(
            31,
            21,
            2,
            EncodingShape::Prefix,
            Z2Polynomial::new(0b11101101001),
        );
        let word31 = bch.encode(u64::from(payload21)) as u32;
        let with_parity = word31 << 1;
        with_parity | (with_parity.count_ones() & 1)
    }

    fn push_word(decoder: &mut Pocsag, word: u32) {
        for i in (0..32).rev() {
            decoder.handle_bit(word & (1 << i) != 0);
        }
    }

    #[test]
    fn sync_word_is_a_valid_bch_codeword_with_even_parity() {
        assert_eq!(encode_codeword(SYNC_WORD >> 11), SYNC_WORD);
        assert_eq!(encode_codeword(IDLE_WORD >> 11), IDLE_WORD);
    }

    #[test]
    fn decodes_one_message_from_a_synthesized_transmission() {
        let mut decoder = Pocsag::new();
        let (sender, receiver) = unbounded();
        decoder.set_record_sink(RecordSink::Channel(sender));
        decoder.content_type = ContentType::Both;
        decoder.reset();

        // Preamble: alternating bits
        for i in 0..PREAMBLE_BITS {
            decoder.handle_bit(i % 2 == 0);
        }

        // Sync, address word in frame 7, one numeric data word, idle
        let address: u32 = 1_234_567;
        let address_payload = ((address >> 3) << 2) | 0x3;
        let data_payload = 0x10_0000 | 0x12345;

        push_word(&mut decoder, SYNC_WORD);
        for _ in 0..14 {
            push_word(&mut decoder, IDLE_WORD);
        }
        push_word(&mut decoder, encode_codeword(address_payload));
        push_word(&mut decoder, encode_codeword(data_payload));
        push_word(&mut decoder, SYNC_WORD);
        push_word(&mut decoder, encode_codeword(data_payload));
        push_word(&mut decoder, IDLE_WORD);

        let record = receiver.try_recv().expect("one message record");
        assert!(record.contains("Address: 1234567"), "{record}");
        assert!(record.contains("Function: 3"), "{record}");
        assert!(record.contains("Numeric: 1234512345"), "{record}");
        assert!(!record.contains("Errors detected!"), "{record}");
    }

    #[test]
    fn inverted_sync_flips_all_following_bits() {
        let mut decoder = Pocsag::new();
        let (sender, receiver) = unbounded();
        decoder.set_record_sink(RecordSink::Channel(sender));
        decoder.content_type = ContentType::Numeric;
        decoder.reset();

        for i in 0..PREAMBLE_BITS {
            decoder.handle_bit(i % 2 == 0);
        }

        let address_payload = (42u32 >> 3) << 2;
        push_word(&mut decoder, !SYNC_WORD);
        for _ in 0..2 {
            push_word(&mut decoder, !IDLE_WORD);
        }
        push_word(&mut decoder, !encode_codeword(address_payload));
        push_word(&mut decoder, !IDLE_WORD);

        let record = receiver.try_recv().expect("one message record");
        assert!(record.contains("Address: "), "{record}");
    }

    #[test]
    fn broken_preamble_resets_the_hunt() {
        let mut decoder = Pocsag::new();
        let (sender, receiver) = unbounded();
        decoder.set_record_sink(RecordSink::Channel(sender));
        decoder.reset();

        // Constant bits are not a preamble
        for _ in 0..64 {
            decoder.handle_bit(true);
        }
        assert!(receiver.try_recv().is_err());
        assert_ne!(decoder.state, State::ReadBatch);
    }
}
