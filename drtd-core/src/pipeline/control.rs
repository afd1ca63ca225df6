//! Per-sample pipeline control state
//!
//! The abort flag is scoped to the thread driving the pipeline: exactly one
//! processing thread runs a pipeline at any time, and the flag never needs
//! to cross it. The monitor selection is process-wide and is only changed
//! while the pipeline mutation lock (the decoder mutex) is held.

use std::cell::Cell;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Mutex;

use crossbeam_channel::Sender;

use crate::pipeline::StageId;
use crate::util::lock;

thread_local! {
    static ABORT: Cell<bool> = const { Cell::new(false) };
}

/// Which edge of the monitored stage feeds the tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Input,
    Output,
}

static MONITOR_ID: AtomicI32 = AtomicI32::new(-1);
static MONITOR_EDGE: AtomicU8 = AtomicU8::new(0);
static MONITOR_CHANNEL: AtomicU8 = AtomicU8::new(0);
static MONITOR_TX: Mutex<Option<Sender<f32>>> = Mutex::new(None);

/// Clear the abort flag; called once before each sample enters the graph.
pub fn prepare_sample() {
    ABORT.with(|flag| flag.set(false));
}

/// Drop the current sample: downstream stages short-circuit and the
/// decoder callback is skipped.
pub fn abort_processing() {
    ABORT.with(|flag| flag.set(true));
}

pub fn aborted() -> bool {
    ABORT.with(|flag| flag.get())
}

/// Select the stage edge to copy into the monitor tap. `channel` picks the
/// component of multi-channel sample types (complex re/im).
pub fn set_monitor(id: StageId, edge: Edge, channel: u8) {
    MONITOR_EDGE.store(edge as u8 + 1, Ordering::Relaxed);
    MONITOR_CHANNEL.store(channel, Ordering::Relaxed);
    MONITOR_ID.store(id, Ordering::Relaxed);
}

pub fn clear_monitor() {
    MONITOR_ID.store(-1, Ordering::Relaxed);
    MONITOR_EDGE.store(0, Ordering::Relaxed);
}

/// Install the channel the monitored samples are sent into.
pub fn set_monitor_sink(sender: Option<Sender<f32>>) {
    *lock(&MONITOR_TX) = sender;
}

pub fn monitoring(id: StageId, edge: Edge) -> bool {
    id >= 0
        && MONITOR_ID.load(Ordering::Relaxed) == id
        && MONITOR_EDGE.load(Ordering::Relaxed) == edge as u8 + 1
}

pub fn channel() -> u8 {
    MONITOR_CHANNEL.load(Ordering::Relaxed)
}

pub fn monitor_sample(value: f32) {
    if let Some(sender) = lock(&MONITOR_TX).as_ref() {
        // Tap consumers poll at their own pace; a full channel drops samples.
        let _ = sender.try_send(value);
    }
}
