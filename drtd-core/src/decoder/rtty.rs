//! RTTY decoder (dual-tone FSK, Baudot)
//!
//! Two parallel detector lines mix the mark and space tones to baseband,
//! average over one bit, take the squared magnitude and normalize with a
//! one-window look-ahead; the merge compares mark against space. A fixed
//! bit converter recovers the bit clock, then characters are framed as
//! start bit, five Baudot bits and a stop bit ("idle on mark"), with the
//! LETTERS/FIGURES codes switching the character set.

use num_complex::Complex32;

use crate::decoder::{Decoder, DecoderInfo, Marker, MarkerGroup, PipelineHost};
use crate::dsp::{
    BitConverter, IqMixer, IqMixerState, Lookahead, Mapper, MovingAverage, Normalizer, OffsetMode,
};
use crate::errors::DrtdError;
use crate::pipeline::{ConfigRef, Parallel, StageExt};
use crate::store;
use crate::util::BitBuffer;

const SAMPLE_RATE: u32 = 7350;
const FIGURES: u8 = 0x1B;
const LETTERS: u8 = 0x1F;

/// Baudot code table, indexed by the five payload bits; one entry per
/// shift state. The FIGURES/LETTERS positions are handled before lookup.
const BAUDOT: [(&str, &str); 32] = [
    ("", ""),
    ("E", "3"),
    ("\n", "\n"),
    ("A", "-"),
    (" ", " "),
    ("S", "<BEL>"),
    ("I", "8"),
    ("U", "7"),
    ("\r", "\r"),
    ("D", "$"),
    ("R", "4"),
    ("J", "'"),
    ("N", ","),
    ("F", "!"),
    ("C", ":"),
    ("K", "("),
    ("T", "5"),
    ("Z", "\""),
    ("L", ")"),
    ("W", "2"),
    ("H", "#"),
    ("Y", "6"),
    ("P", "0"),
    ("Q", "1"),
    ("O", "9"),
    ("B", "?"),
    ("G", "&"),
    ("", ""),
    ("M", "."),
    ("X", "/"),
    ("V", ";"),
    ("", ""),
];

#[derive(Debug, Clone, Copy)]
struct Settings {
    swap_mark_and_space: bool,
    shift: u32,
    baud_rate: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            swap_mark_and_space: false,
            shift: 450,
            baud_rate: 45.45,
        }
    }
}

pub struct Rtty {
    info: DecoderInfo,
    host: PipelineHost<bool>,
    settings: Settings,
    mark_mixer: ConfigRef<IqMixerState>,
    space_mixer: ConfigRef<IqMixerState>,
    wait_start: bool,
    figures: bool,
    input: BitBuffer<7, false>,
}

impl Rtty {
    pub fn new() -> Self {
        let mut decoder = Self {
            info: DecoderInfo::new("RTTY", SAMPLE_RATE, true),
            host: PipelineHost::new(),
            settings: Settings::default(),
            mark_mixer: ConfigRef::unbound(),
            space_mixer: ConfigRef::unbound(),
            wait_start: true,
            figures: false,
            input: BitBuffer::new(),
        };
        decoder.update_marker();
        decoder
    }

    fn update_marker(&mut self) {
        let half_shift = (self.settings.shift / 2) as i32;
        let bandwidth = self.settings.baud_rate as u32;
        self.info.set_marker(MarkerGroup {
            markers: vec![
                Marker {
                    offset: -half_shift,
                    bandwidth,
                },
                Marker {
                    offset: half_shift,
                    bandwidth,
                },
            ],
            moveable: true,
        });
    }

    fn update_mixers(&mut self) {
        let center = self.info.center_frequency as f32;
        let half_shift = self.settings.shift as f32 / 2.0;
        self.mark_mixer
            .with(|mixer| mixer.set_frequency(center + half_shift));
        self.space_mixer
            .with(|mixer| mixer.set_frequency(center - half_shift));
    }

    fn handle_bit(&mut self, sample: bool) {
        let sample = sample ^ self.settings.swap_mark_and_space;
        self.input.push(sample);

        if self.wait_start && !self.input.get(0) && self.input.get(6) {
            self.wait_start = false;
            self.input.reset_bit_count();
        } else if self.wait_start || !self.input.aligned() {
            return;
        }

        // Aligned: bit 0 must be the start bit, bit 6 the stop bit
        if self.input.get(0) || !self.input.get(6) {
            self.wait_start = true;
            return;
        }

        let bits = ((self.input.value() >> 1) & 0x1F) as u8;
        match bits {
            LETTERS => self.figures = false,
            FIGURES => self.figures = true,
            _ => {
                let entry = BAUDOT[bits as usize];
                let text = if self.figures { entry.1 } else { entry.0 };
                if !text.is_empty() {
                    self.info.sink.emit(text);
                }
            }
        }
    }
}

impl Default for Rtty {
    fn default() -> Self {
        Self::new()
    }
}

fn magnitude_squared(sample: Complex32) -> f32 {
    sample.norm_sqr()
}

impl Decoder for Rtty {
    fn info(&self) -> &DecoderInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut DecoderInfo {
        &mut self.info
    }

    fn setup(&mut self) -> Result<(), DrtdError> {
        let key = self.info.config_key("CenterFrequency");
        let center = store::get(&key, self.info.center_frequency);
        self.info.set_center_frequency(center);

        let samples_per_bit = (SAMPLE_RATE as f32 / self.settings.baud_rate) as usize;
        let center = self.info.center_frequency as f32;
        let half_shift = self.settings.shift as f32 / 2.0;

        let detector = |frequency: f32| {
            let mixer = IqMixer::new(frequency);
            let handle = mixer.config_ref();
            let line = mixer
                .then(MovingAverage::<Complex32>::new(samples_per_bit))
                .then(Mapper::new(magnitude_squared))
                // At least six bits of a character can sit at zero
                .then(Normalizer::new(
                    samples_per_bit * 7,
                    Lookahead::Yes,
                    OffsetMode::Minimum,
                ));
            (line, handle)
        };

        let (mark_line, mark_mixer) = detector(center + half_shift);
        let (space_line, space_mixer) = detector(center - half_shift);
        self.mark_mixer = mark_mixer;
        self.space_mixer = space_mixer;

        let pipeline = Parallel::new([mark_line, space_line], |levels: &[f32; 2]| {
            levels[0] - levels[1] > 0.0
        })
        .then(BitConverter::fixed(self.settings.baud_rate));
        self.host.install(Box::new(pipeline), SAMPLE_RATE)?;

        self.wait_start = true;
        self.figures = false;
        self.input.reset();
        Ok(())
    }

    fn tear_down(&mut self) {
        store::set(
            &self.info.config_key("CenterFrequency"),
            self.info.center_frequency,
        );
        self.host.release();
        self.mark_mixer = ConfigRef::unbound();
        self.space_mixer = ConfigRef::unbound();
    }

    fn process(&mut self, sample: f32) {
        if let Some(bit) = self.host.process(sample) {
            self.handle_bit(bit);
        }
    }

    fn changeable_parameters(&self) -> Vec<&'static str> {
        vec![
            "Center frequency (Int)",
            "Shift (Int)",
            "Baud rate (Float)",
            "USB/LSB",
        ]
    }

    fn setup_parameters(&mut self, values: &[String]) -> bool {
        let Ok(center) = values[0].parse::<u32>() else {
            return false;
        };
        let Ok(shift) = values[1].parse::<u32>() else {
            return false;
        };
        let Ok(baud_rate) = values[2].parse::<f32>() else {
            return false;
        };
        if baud_rate < 10.0 {
            return false;
        }
        let swap = match values[3].to_ascii_lowercase().as_str() {
            "usb" => false,
            "lsb" => true,
            _ => return false,
        };

        self.settings.shift = shift;
        self.settings.baud_rate = baud_rate;
        self.settings.swap_mark_and_space = swap;
        self.update_marker();
        self.info.set_center_frequency(center);
        self.update_mixers();
        true
    }

    fn on_marker_move(&mut self, _center_frequency: u32) {
        self.update_mixers();
    }
}
