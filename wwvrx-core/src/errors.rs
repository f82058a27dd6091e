//! wwvrx error types with granular categories
//!
//! Errors are returned only from constructors. Once a pipeline is built,
//! the sample path never raises: non-finite samples are coerced to zero,
//! correlation misses time out into diagnostic counters, and sinks that
//! cannot open their file or socket downgrade to no-ops rather than
//! surfacing an error.

use thiserror::Error;

/// Top-level error type for all wwvrx operations
#[derive(Debug, Error)]
pub enum WwvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DSP setup error: {0}")]
    Dsp(#[from] DspError),
}

/// Configuration errors, rejected at construction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No detectors enabled: at least one of tick/marker/tone must be on")]
    NothingEnabled,

    #[error("Invalid lock timeout: {seconds} s (must be > 0 when enabled)")]
    InvalidLockTimeout { seconds: f64 },
}

/// DSP construction errors
#[derive(Debug, Error)]
pub enum DspError {
    #[error("Filter corner {corner_hz} Hz violates Nyquist for {sample_rate} Hz")]
    FilterAboveNyquist { corner_hz: f64, sample_rate: f64 },

    #[error("Tone nominal {nominal_hz} Hz outside the display band")]
    ToneOutOfBand { nominal_hz: f64 },
}

/// Result type alias for wwvrx operations
pub type Result<T> = std::result::Result<T, WwvError>;
