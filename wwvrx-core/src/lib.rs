//! wwvrx core library
//!
//! A real-time receiver core for the NIST WWV/WWVH time broadcasts: it
//! consumes complex baseband samples on two paths (a 50 kHz detector path
//! and a 12 kHz display path), detects the broadcast's timing components
//! (second ticks, minute markers, reference tones, the 100 Hz BCD
//! subcarrier), cross-verifies every event over two independent paths,
//! and emits a locked minute/second timebase plus one decoded BCD symbol
//! per second.
//!
//! The crate does not talk to hardware: an SDR front end (or a file
//! reader) feeds samples into [`DetectorPipeline`] and registers
//! [`sink::EventSink`]s for the results.

pub mod config;
pub mod correlators;
pub mod detectors;
pub mod dsp;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod sink;

// Canonical entry points.
pub use config::PipelineConfig;
pub use errors::{Result, WwvError};
pub use pipeline::{DetectorPipeline, PipelineStats};
