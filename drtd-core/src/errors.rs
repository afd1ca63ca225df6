//! Error types, grouped by subsystem

use thiserror::Error;

/// Top-level error type for drtd operations
#[derive(Debug, Error)]
pub enum DrtdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from interpreting user-supplied configuration.
///
/// These are fatal at startup: the caller prints a message plus usage and
/// exits non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown decoder \"{name}\"")]
    UnknownDecoder { name: String },

    #[error("Decoder \"{name}\" does not support headless mode")]
    HeadlessUnsupported { name: String },

    #[error("Expected {expected} decoder parameter(s), got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("Invalid decoder parameter value(s)")]
    InvalidParameters,

    #[error("Invalid audio input index {index} (have {available} inputs)")]
    InvalidInputIndex { index: usize, available: usize },

    #[error("Sample rate {rate} out of range 1..=65535")]
    InvalidSampleRate { rate: u32 },
}

/// Errors talking to a sample source
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Failed to open audio input: {reason}")]
    OpenFailed { reason: String },

    #[error("Input does not support capture at {rate} Hz")]
    UnsupportedRate { rate: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors detected while building or initializing a pipeline graph.
///
/// An impossible topology is fatal; per-sample framing trouble never shows
/// up here (decoders reset their state machines instead).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage \"{stage}\" reported an output sample rate of zero")]
    ZeroOutputRate { stage: &'static str },

    #[error("Output sample rate differs between parallel lines ({left} vs {right})")]
    ParallelRateMismatch { left: u32, right: u32 },

    #[error("Decoder pipeline was not set up")]
    NotInitialized,
}

/// Errors from the persisted settings file
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Settings file has invalid magic bytes")]
    BadMagic,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
