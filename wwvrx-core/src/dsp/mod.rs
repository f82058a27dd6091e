//! Shared DSP primitives used across the detector chain.
//!
//! Everything here is strict-streaming: per-sample or per-frame operations
//! with value-type state and no allocation after construction.

pub mod biquad;
pub mod envelope;
pub mod sliding_fft;
pub mod window;

pub use biquad::{Biquad, BiquadCascade, ChannelFilter};
pub use envelope::EnvelopeFollower;
pub use sliding_fft::FrameFft;
pub use window::{blackman_harris, parabolic_peak, power_db};
