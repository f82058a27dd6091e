//! Correlators: fuse detector events into a disciplined time reference.
//!
//! Each correlator owns its pending-event slots; a newer event in the
//! same slot overwrites the older one, and nothing is queued past the
//! correlation window. Decisions run off timestamp arithmetic, never
//! arrival order, so the two sample paths may deliver up to ~100 ms out
//! of step without breaking the windows.

pub mod bcd_window;
pub mod marker;
pub mod sync;
pub mod tick;

pub use bcd_window::BcdWindowCorrelator;
pub use marker::{MarkerCorrelator, MarkerCorrStats};
pub use sync::SyncDetector;
pub use tick::{TickCorrelator, TickStats};
