//! Event types flowing between detectors, correlators and sinks.
//!
//! Every type here is a plain value: produced by exactly one component,
//! copied to consumers, never shared mutably. Timestamps are milliseconds
//! since pipeline start on a common monotonic clock; they are authoritative
//! for ordering and correlation across the 50 kHz and 12 kHz paths.

use serde::Serialize;

/// A detected second tick (5 ms burst at 1000/1200 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickEvent {
    /// Strictly increasing per run.
    pub tick_number: u64,
    pub timestamp_ms: f64,
    /// Width of the burst, within [2, 50] ms by construction.
    pub duration_ms: f64,
    pub peak_energy: f64,
    pub noise_floor: f64,
    pub snr_db: f64,
}

/// A long burst in the tick band that qualifies as a minute-marker
/// candidate (500-900 ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickMarkerEvent {
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    /// How well this candidate sits on the established 1 s tick grid,
    /// in [0, 1]. Filled in by the tick correlator; diagnostic only.
    pub corr_ratio: f64,
}

/// Fast-path minute marker from the integrating marker detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerEvent {
    pub marker_number: u64,
    pub timestamp_ms: f64,
    /// At least 500 ms by construction.
    pub duration_ms: f64,
    pub accumulated_energy: f64,
    pub since_last_marker_sec: f64,
}

/// One frame from the slow (12 kHz path) marker verifier, emitted every
/// display-FFT frame regardless of threshold state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlowMarkerFrame {
    pub timestamp_ms: f64,
    /// Sliding sum over the frame ring.
    pub energy: f64,
    pub snr_db: f64,
    pub noise_floor: f64,
    pub above_threshold: bool,
}

/// A frequency measurement from one tone tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneMeasurement {
    pub timestamp_ms: f64,
    /// 0 for the DC (carrier) tracker, else 500 or 600.
    pub nominal_hz: f64,
    pub measured_hz: f64,
    pub offset_hz: f64,
    pub offset_ppm: f64,
    pub snr_db: f64,
    pub noise_floor_linear: f64,
    /// True iff snr_db >= 10.
    pub valid: bool,
}

/// Which detector produced a BCD pulse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BcdSource {
    /// 100 Hz bucket of the 50 kHz frame FFT.
    Time,
    /// Envelope of the data-band filtered signal.
    Freq,
}

/// A raw subcarrier pulse from either BCD detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BcdEvent {
    pub source: BcdSource,
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub energy: f64,
    pub snr_db: f64,
}

/// Decoded symbol value for one second-window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BcdValue {
    Zero,
    One,
    Marker,
    /// Window closed empty or with an out-of-range pulse width.
    None,
}

/// Which sources contributed to a decoded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BcdSymbolSource {
    Both,
    Time,
    Freq,
    None,
}

/// One decoded BCD symbol, exactly one per closed second-window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BcdSymbol {
    /// Strictly increasing per run.
    pub symbol_index: u64,
    /// Second of minute this window covers (k mod 60).
    pub second: u32,
    pub timestamp_ms: f64,
    pub value: BcdValue,
    pub pulse_duration_ms: f64,
    pub source: BcdSymbolSource,
    /// In [0, 1]; higher when both sources agree.
    pub confidence: f64,
}

/// Confidence grade of a correlated minute marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkerConfidence {
    /// Fast duration >= 500 ms and slow path triggered inside the window.
    High,
    /// Only one side qualified.
    Low,
}

/// A minute marker confirmed by the fast/slow correlator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelatedMarker {
    pub marker_number: u64,
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub energy: f64,
    pub snr_db: f64,
    pub confidence: MarkerConfidence,
}

/// Sync acquisition state. Monotonic toward `Locked`; never demoted by
/// signal loss alone unless the stale-lock timeout option is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SyncState {
    #[default]
    Acquiring,
    Tentative,
    Locked,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Acquiring => write!(f, "ACQUIRING"),
            SyncState::Tentative => write!(f, "TENTATIVE"),
            SyncState::Locked => write!(f, "LOCKED"),
        }
    }
}

/// BCD window correlator tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum BcdCorrState {
    #[default]
    Acquiring,
    Tentative,
    Tracking,
}

/// One confirmed-marker record from the sync detector; the payload of
/// sync callbacks and the sync CSV schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncUpdate {
    pub timestamp_ms: f64,
    pub marker_number: u64,
    pub state: SyncState,
    pub interval_sec: f64,
    /// Fast/slow pairing delta between the tick-marker and marker events.
    pub delta_ms: f64,
    pub tick_duration_ms: f64,
    pub marker_duration_ms: f64,
}

/// Snapshot of the sync detector, cheap to copy out on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Minute anchor: timestamp of the last confirmed marker.
    pub last_confirmed_ms: f64,
    pub prev_confirmed_ms: f64,
    pub confirmed_count: u64,
    pub good_intervals: u64,
    /// Pending-slot timeouts since start (diagnostic).
    pub expired_pending: u64,
}
