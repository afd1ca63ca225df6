//! DCF77 time-signal decoder
//!
//! The pipeline mixes the (already downconverted) carrier to baseband,
//! averages over one bit, takes the magnitude, normalizes against the
//! running mean and thresholds. Each second carries one bit as a carrier
//! reduction: 100 ms means 0, 200 ms means 1; second 59 is left
//! unmodulated so the missing pulse marks the minute. Fields are BCD with
//! even parity over the minute, hour and date groups.

use std::time::{Duration, Instant};

use log::{debug, info};

use num_complex::Complex32;

use crate::decoder::{Decoder, DecoderInfo, Marker, MarkerGroup, PipelineHost};
use crate::dsp::{IqMixer, IqMixerState, Lookahead, Mapper, MovingAverage, Normalizer, OffsetMode};
use crate::errors::DrtdError;
use crate::pipeline::{ConfigRef, StageExt};
use crate::store;

const SAMPLE_RATE: u32 = 6000;
const BITS_PER_SECOND: u32 = 10;
const SAMPLES_PER_BIT: u32 = SAMPLE_RATE / BITS_PER_SECOND;

const STATUS_CALL: u32 = 0b10000;
const STATUS_CEST: u32 = 0b100;
const STATUS_CET: u32 = 0b10;
const STATUS_LEAP_SECOND: u32 = 0b1;

const BCD_WEIGHTS: [u8; 8] = [1, 2, 4, 8, 10, 20, 40, 80];
const DAY_NAMES: [&str; 8] = ["---", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Wall-clock gate: a second boundary is only accepted when at least this
/// much real time passed since the previous one.
const SECOND_GATE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitMinuteMarker,
    ReadStartOfMinute,
    ReadCivilWarning,
    ReadStatus,
    ReadStartOfTime,
    ReadMinutes,
    ReadHours,
    ReadDayOfMonth,
    ReadDayOfWeek,
    ReadMonth,
    ReadYear,
    ReadDateParity,
}

impl State {
    /// Bit index (second within the minute) at which the field completes,
    /// and whether the field belongs to the date parity group.
    fn field_end(self) -> (u8, bool) {
        match self {
            State::WaitMinuteMarker | State::ReadStartOfMinute => (0, false),
            State::ReadCivilWarning => (14, false),
            State::ReadStatus => (19, false),
            State::ReadStartOfTime => (20, false),
            State::ReadMinutes => (28, false),
            State::ReadHours => (35, false),
            State::ReadDayOfMonth => (41, true),
            State::ReadDayOfWeek => (44, true),
            State::ReadMonth => (49, true),
            State::ReadYear => (57, true),
            State::ReadDateParity => (58, true),
        }
    }

    fn next(self) -> State {
        match self {
            State::WaitMinuteMarker => State::ReadStartOfMinute,
            State::ReadStartOfMinute => State::ReadCivilWarning,
            State::ReadCivilWarning => State::ReadStatus,
            State::ReadStatus => State::ReadStartOfTime,
            State::ReadStartOfTime => State::ReadMinutes,
            State::ReadMinutes => State::ReadHours,
            State::ReadHours => State::ReadDayOfMonth,
            State::ReadDayOfMonth => State::ReadDayOfWeek,
            State::ReadDayOfWeek => State::ReadMonth,
            State::ReadMonth => State::ReadYear,
            State::ReadYear => State::ReadDateParity,
            State::ReadDateParity => State::WaitMinuteMarker,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimeInfo {
    minutes: u8,
    hours: u8,
    day_of_week: u8,
    day_of_month: u8,
    month: u8,
    year: u8,
    call: bool,
    cet: bool,
    cest: bool,
    minute_parity_error: bool,
    hour_parity_error: bool,
    date_parity_error: bool,
}

fn decode_bcd(mut bits: u32, bit_count: u8) -> u8 {
    let mut result = 0;
    for i in 0..bit_count {
        if bits & 1 != 0 {
            result += BCD_WEIGHTS[(bit_count - i - 1) as usize];
        }
        bits >>= 1;
    }
    result
}

pub struct Dcf77 {
    info: DecoderInfo,
    host: PipelineHost<bool>,
    mixer: ConfigRef<IqMixerState>,
    state: State,
    time: TimeInfo,
    receiving: TimeInfo,
    last_level: bool,
    parity: bool,
    level_count: u32,
    bits: u32,
    bits_received: u8,
    tick_armed: bool,
    ticks: u32,
    seconds: i8,
    last_advance: Instant,
}

impl Dcf77 {
    pub fn new() -> Self {
        let mut info = DecoderInfo::new("DCF77", SAMPLE_RATE, true);
        info.set_marker(MarkerGroup {
            markers: vec![Marker {
                offset: 0,
                bandwidth: 10,
            }],
            moveable: true,
        });

        Self {
            info,
            host: PipelineHost::new(),
            mixer: ConfigRef::unbound(),
            state: State::WaitMinuteMarker,
            time: TimeInfo::default(),
            receiving: TimeInfo::default(),
            last_level: false,
            parity: false,
            level_count: 0,
            bits: 0,
            bits_received: 0,
            tick_armed: false,
            ticks: 0,
            seconds: 0,
            last_advance: Instant::now(),
        }
    }

    fn reset(&mut self) {
        self.state = State::WaitMinuteMarker;
        self.bits_received = 0;
        self.bits = 0;
        self.time = TimeInfo::default();
        self.receiving = TimeInfo::default();
    }

    fn abort_minute(&mut self) {
        self.state = State::WaitMinuteMarker;
        self.receiving = TimeInfo::default();
    }

    /// Returns false when the capture reset the whole state machine.
    fn capture_field(&mut self) -> bool {
        match self.state {
            State::ReadStatus => {
                self.receiving.call = self.bits & STATUS_CALL != 0;
                self.receiving.cet = self.bits & STATUS_CET != 0;
                self.receiving.cest = self.bits & STATUS_CEST != 0;
                if self.bits & STATUS_LEAP_SECOND != 0 {
                    // A leap second would desynchronize every later field
                    info!("leap second announced, resetting");
                    self.reset();
                    return false;
                }
            }
            State::ReadMinutes => {
                self.receiving.minute_parity_error = self.parity;
                self.receiving.minutes = decode_bcd(self.bits >> 1, 7);
            }
            State::ReadHours => {
                self.receiving.hour_parity_error = self.parity;
                self.receiving.hours = decode_bcd(self.bits >> 1, 6);
            }
            State::ReadDayOfMonth => self.receiving.day_of_month = decode_bcd(self.bits, 6),
            State::ReadDayOfWeek => self.receiving.day_of_week = decode_bcd(self.bits, 3),
            State::ReadMonth => self.receiving.month = decode_bcd(self.bits, 5),
            State::ReadYear => self.receiving.year = decode_bcd(self.bits, 8),
            State::ReadDateParity => self.receiving.date_parity_error = self.parity,
            _ => {}
        }
        true
    }

    fn advance_time(&mut self) {
        if !self.tick_armed {
            return;
        }
        self.ticks = 0;
        self.tick_armed = false;
        self.seconds = (self.seconds + 1) % 60;
    }

    /// Free-running fallback: when no edge arrives within 1.1 s of an
    /// armed tick, the second advances anyway.
    fn tick_time(&mut self) -> bool {
        if !self.tick_armed {
            return false;
        }
        self.ticks += 1;
        if self.ticks as f32 >= SAMPLE_RATE as f32 * 1.1 {
            self.advance_time();
            true
        } else {
            false
        }
    }

    fn handle_low_run(&mut self, run_bits: u32) {
        self.bits <<= 1;
        if run_bits == 2 {
            self.bits |= 1;
            self.parity = !self.parity;
        } else if run_bits != 1 {
            debug!("invalid bit length ({run_bits})");
            self.abort_minute();
            return;
        }

        let (field_end, date_group) = self.state.field_end();
        if field_end == self.bits_received {
            let start_of_minute_wrong = self.state == State::ReadStartOfMinute && self.bits == 1;
            let start_of_time_wrong = self.state == State::ReadStartOfTime && self.bits == 0;
            if start_of_minute_wrong || start_of_time_wrong {
                debug!("fixed marker bit has the wrong value");
                self.abort_minute();
            } else if self.capture_field() {
                self.state = self.state.next();
            }

            self.bits = 0;
            if !date_group {
                self.parity = false;
            }
        }

        self.bits_received += 1;
        if self.bits_received == 59 {
            info!("received a full minute");
            self.state = State::WaitMinuteMarker;
        }
    }

    fn handle_level(&mut self, sample: bool) {
        let mut new_second = false;

        if sample != self.last_level {
            let run_bits =
                (self.level_count as f32 / SAMPLES_PER_BIT as f32).round() as u32;

            if run_bits > 0 {
                if self.state == State::WaitMinuteMarker {
                    let marker = self.last_level
                        && run_bits as f32 > BITS_PER_SECOND as f32 * 1.5
                        && run_bits <= 2 * BITS_PER_SECOND;
                    if marker {
                        info!("detected minute marker");
                        self.state = State::ReadStartOfMinute;
                        self.bits_received = 0;
                        self.bits = 0;
                        self.seconds = -1;
                        self.time = self.receiving;
                        self.receiving = TimeInfo::default();
                        self.tick_armed = true;
                    }
                } else if !self.last_level {
                    self.handle_low_run(run_bits);
                }

                if !self.last_level {
                    // A low run ends at a second boundary; accept it only
                    // when enough wall time passed.
                    let now = Instant::now();
                    if now.duration_since(self.last_advance) > SECOND_GATE {
                        self.last_advance = now;
                        self.advance_time();
                        self.tick_armed = true;
                        new_second = true;
                    }
                }

                self.level_count = 0;
            }

            self.last_level = sample;
        }

        self.level_count += 1;

        if self.tick_time() || new_second {
            self.info.sink.emit(&self.status_line());
        }
    }

    fn date_string(&self) -> String {
        let mut out = format!("{}, ", DAY_NAMES[(self.time.day_of_week & 7) as usize]);
        if self.time.day_of_month > 0 {
            out.push_str(&format!("{:02}", self.time.day_of_month));
        } else {
            out.push_str("--");
        }
        out.push('.');
        if self.time.month > 0 {
            out.push_str(&format!("{:02}", self.time.month));
        } else {
            out.push_str("--");
        }
        out.push('.');
        if self.time.year > 0 {
            out.push_str(&format!("20{:02}", self.time.year));
        } else {
            out.push_str("----");
        }
        out
    }

    fn time_string(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.time.hours,
            self.time.minutes,
            self.seconds.max(0)
        )
    }

    fn status_line(&self) -> String {
        let time_valid = self.time.cet != self.time.cest;
        let mut line = format!("{} - {} ; ", self.date_string(), self.time_string());
        if !time_valid
            || self.time.date_parity_error
            || self.time.hour_parity_error
            || self.time.minute_parity_error
        {
            line.push('E');
        }
        if self.time.cet {
            line.push_str(" CET");
        }
        if self.time.cest {
            line.push_str(" CEST");
        }
        line.push('\n');
        line
    }
}

impl Default for Dcf77 {
    fn default() -> Self {
        Self::new()
    }
}

fn magnitude(sample: Complex32) -> f32 {
    sample.norm()
}

impl Decoder for Dcf77 {
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

        let mixer = IqMixer::new(self.info.center_frequency as f32);
        self.mixer = mixer.config_ref();

        let pipeline = mixer
            .then(MovingAverage::<Complex32>::new(SAMPLES_PER_BIT as usize))
            .then(Mapper::new(magnitude))
            .then(Normalizer::new(
                (SAMPLE_RATE as f32 * 2.2).round() as usize,
                Lookahead::No,
                OffsetMode::Average,
            ))
            .then(Mapper::new(|level: f32| level > -0.5));
        self.host.install(Box::new(pipeline), SAMPLE_RATE)?;

        self.reset();
        self.last_level = false;
        self.level_count = 0;
        self.parity = false;
        self.tick_armed = false;
        self.ticks = 0;
        self.seconds = 0;
        Ok(())
    }

    fn tear_down(&mut self) {
        store::set(
            &self.info.config_key("CenterFrequency"),
            self.info.center_frequency,
        );
        self.host.release();
        self.mixer = ConfigRef::unbound();
    }

    fn process(&mut self, sample: f32) {
        if let Some(level) = self.host.process(sample) {
            self.handle_level(level);
        }
    }

    fn changeable_parameters(&self) -> Vec<&'static str> {
        vec!["Center frequency (Int)"]
    }

    fn setup_parameters(&mut self, values: &[String]) -> bool {
        match values[0].parse::<u32>() {
            Ok(center) => {
                self.info.set_center_frequency(center);
                true
            }
            Err(_) => false,
        }
    }

    fn on_marker_move(&mut self, center_frequency: u32) {
        self.mixer
            .with(|mixer| mixer.set_frequency(center_frequency as f32));
    }
}
