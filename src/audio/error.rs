//! Streaming core error types

use thiserror::Error;

/// Errors surfaced by buffering stages, transforms and voices.
///
/// Configuration and state errors are raised synchronously and never
/// recovered internally. Upstream exhaustion is not an error: it shows up as a
/// short or zero-length read.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Buffer capacity is zero or not a multiple of the frame size
    #[error("Invalid buffer capacity: {capacity} bytes (must be a positive multiple of {block_align})")]
    InvalidCapacity { capacity: usize, block_align: usize },

    /// A transform was given a channel layout it cannot handle
    #[error("Invalid channel count: expected {expected}, got {actual}")]
    InvalidChannelCount { expected: String, actual: usize },

    /// Scalar parameter outside its legal range
    #[error("{name} out of range: {value} (must be within [{min}, {max}])")]
    ParameterOutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// Buffer length does not divide into whole frames
    #[error("Buffer of {len} samples is not a multiple of {channels} channels")]
    MisalignedBuffer { len: usize, channels: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Operation on a stage after dispose()
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    #[error("Stream does not support seeking")]
    NotSeekable,

    /// Too many concurrently active voices for the multiplexed wait
    #[error("Voice scheduler is full (max: {max} active voices)")]
    SchedulerFull { max: usize },

    /// Upstream source failed while reading
    #[error("Upstream read failed: {0}")]
    Upstream(String),

    /// Hardware voice rejected an operation
    #[error("Voice error: {0}")]
    Voice(String),

    /// Stage configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Validate a scalar parameter against an inclusive range
pub(crate) fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> StreamResult<f32> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(StreamError::ParameterOutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
