//! Detector chain: per-path signal detectors feeding the correlators.
//!
//! The 50 kHz detectors (tick, marker, BCD time/freq) each own their FFT
//! or envelope plumbing and their own adaptive noise floor; the paths run
//! at incompatible frame sizes and rates, so baselines are never shared.
//! The 12 kHz detectors (tone trackers, slow marker verifier) work off the
//! display path.

pub mod bcd_freq;
pub mod bcd_time;
pub mod marker;
pub mod pulse;
pub mod slow_marker;
pub mod tick;
pub mod tone;

pub use bcd_freq::BcdFreqDetector;
pub use bcd_time::BcdTimeDetector;
pub use marker::{MarkerDetector, RxMetadata};
pub use slow_marker::SlowMarkerDetector;
pub use tick::{TickDetector, TickOutput};
pub use tone::ToneTracker;
