//! Marker correlator: fast detector + slow verifier fusion.
//!
//! One pending slot holds the most recent fast-path MarkerEvent; the slow
//! path streams SlowMarkerFrames through continuously. When the 750 ms
//! correlation window after a fast event elapses, the two sides are
//! graded: both agree -> HIGH, one side only -> LOW, neither -> nothing.
//! A slow-path trigger with no fast event opens its own window and can
//! produce a LOW slow-only marker, so persistent one-sided reception is
//! still visible downstream.

use crate::events::{CorrelatedMarker, MarkerConfidence, MarkerEvent, SlowMarkerFrame};

/// Correlation window. Must stay well under the fast path's 30 s
/// cool-down so windows can never overlap.
const WINDOW_MS: f64 = 750.0;

/// Confirmation counters by path agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MarkerCorrStats {
    pub confirmed: u64,
    pub fast_only: u64,
    pub slow_only: u64,
}

pub struct MarkerCorrelator {
    window_ms: f64,
    pending_fast: Option<MarkerEvent>,
    slow_triggered: bool,
    slow_peak_energy: f64,
    slow_peak_snr: f64,
    /// Slow-path trigger awaiting a fast counterpart.
    slow_only_since: Option<f64>,
    /// Previous frame's threshold verdict, for rising-edge detection.
    prev_slow_above: bool,
    marker_number: u64,
    last_emitted_ms: f64,
    stats: MarkerCorrStats,
}

impl MarkerCorrelator {
    pub fn new() -> Self {
        Self {
            window_ms: WINDOW_MS,
            pending_fast: None,
            slow_triggered: false,
            slow_peak_energy: 0.0,
            slow_peak_snr: 0.0,
            slow_only_since: None,
            prev_slow_above: false,
            marker_number: 0,
            last_emitted_ms: f64::NEG_INFINITY,
            stats: MarkerCorrStats::default(),
        }
    }

    pub fn stats(&self) -> MarkerCorrStats {
        self.stats
    }

    /// A fast-path marker arrived. Overwrites any pending fast event.
    pub fn on_fast(&mut self, marker: MarkerEvent) {
        // A slow-only window collapses into a normal correlation when the
        // fast side shows up inside it.
        if let Some(since) = self.slow_only_since {
            if marker.timestamp_ms - since <= self.window_ms {
                self.slow_triggered = true;
            }
            self.slow_only_since = None;
        }
        self.pending_fast = Some(marker);
    }

    /// A slow-path frame arrived; decisions are made here because the
    /// slow stream ticks every ~85 ms regardless of signal.
    pub fn on_slow_frame(&mut self, frame: &SlowMarkerFrame) -> Option<CorrelatedMarker> {
        // A slow-only window opens only on a below-to-above transition;
        // the sliding sum stays hot for most of a second after a decided
        // marker and must not re-trigger on its own decay.
        let rising = frame.above_threshold && !self.prev_slow_above;
        self.prev_slow_above = frame.above_threshold;

        if let Some(fast) = self.pending_fast {
            let elapsed = frame.timestamp_ms - fast.timestamp_ms;
            if elapsed <= self.window_ms {
                if frame.above_threshold {
                    self.slow_triggered = true;
                    self.slow_peak_energy = self.slow_peak_energy.max(frame.energy);
                    self.slow_peak_snr = self.slow_peak_snr.max(frame.snr_db);
                }
                return None;
            }
            return self.decide(fast);
        }

        // No fast event pending: watch for a slow-only marker.
        match self.slow_only_since {
            None => {
                if rising {
                    self.slow_only_since = Some(frame.timestamp_ms);
                    self.slow_peak_energy = frame.energy;
                    self.slow_peak_snr = frame.snr_db;
                }
                None
            }
            Some(since) => {
                if frame.timestamp_ms - since <= self.window_ms {
                    if frame.above_threshold {
                        self.slow_peak_energy = self.slow_peak_energy.max(frame.energy);
                        self.slow_peak_snr = self.slow_peak_snr.max(frame.snr_db);
                    }
                    return None;
                }
                self.slow_only_since = None;
                self.stats.slow_only += 1;
                let energy = self.slow_peak_energy;
                let snr = self.slow_peak_snr;
                self.slow_peak_energy = 0.0;
                self.slow_peak_snr = 0.0;
                Some(self.emit(since, 0.0, energy, snr, MarkerConfidence::Low))
            }
        }
    }

    /// Time-based decision fallback. Normally the slow frame stream makes
    /// decisions, but when the slow path is disabled (or stalls) a pending
    /// event must still resolve. Runs 150 ms past the window so a late
    /// slow frame from the other path cannot be beaten to the decision.
    pub fn advance(&mut self, now_ms: f64) -> Option<CorrelatedMarker> {
        const SLACK_MS: f64 = 150.0;
        if let Some(fast) = self.pending_fast {
            if now_ms - fast.timestamp_ms > self.window_ms + SLACK_MS {
                return self.decide(fast);
            }
        }
        if let Some(since) = self.slow_only_since {
            if now_ms - since > self.window_ms + SLACK_MS {
                self.slow_only_since = None;
                self.stats.slow_only += 1;
                let energy = self.slow_peak_energy;
                let snr = self.slow_peak_snr;
                self.slow_peak_energy = 0.0;
                self.slow_peak_snr = 0.0;
                return Some(self.emit(since, 0.0, energy, snr, MarkerConfidence::Low));
            }
        }
        None
    }

    fn decide(&mut self, fast: MarkerEvent) -> Option<CorrelatedMarker> {
        self.pending_fast = None;
        let slow = self.slow_triggered;
        self.slow_triggered = false;

        let fast_qualifies = fast.duration_ms >= 500.0;
        let confidence = match (fast_qualifies, slow) {
            (true, true) => MarkerConfidence::High,
            (true, false) | (false, true) => MarkerConfidence::Low,
            (false, false) => return None,
        };

        match confidence {
            MarkerConfidence::High => self.stats.confirmed += 1,
            MarkerConfidence::Low if fast_qualifies => self.stats.fast_only += 1,
            MarkerConfidence::Low => self.stats.slow_only += 1,
        }

        let energy = fast.accumulated_energy.max(self.slow_peak_energy);
        let snr = self.slow_peak_snr;
        self.slow_peak_energy = 0.0;
        self.slow_peak_snr = 0.0;
        Some(self.emit(fast.timestamp_ms, fast.duration_ms, energy, snr, confidence))
    }

    fn emit(
        &mut self,
        ts_ms: f64,
        duration_ms: f64,
        energy: f64,
        snr_db: f64,
        confidence: MarkerConfidence,
    ) -> CorrelatedMarker {
        self.marker_number += 1;
        debug_assert!(ts_ms >= self.last_emitted_ms || self.marker_number == 1);
        self.last_emitted_ms = ts_ms;
        CorrelatedMarker {
            marker_number: self.marker_number,
            timestamp_ms: ts_ms,
            duration_ms,
            energy,
            snr_db,
            confidence,
        }
    }
}

impl Default for MarkerCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
