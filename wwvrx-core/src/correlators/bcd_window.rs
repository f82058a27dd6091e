//! BCD window correlator: one decoded symbol per second of the minute.
//!
//! Gated by the sync detector's LOCKED state. The confirmed minute anchor
//! defines one-second windows at `anchor + k * 1000` ms; BCD pulse events
//! from both detectors accumulate into the open window, and classification
//! happens exactly once, at window close, off the widest pulse observed.
//! Symbol widths follow the IRIG-style encoding: ~170 ms for 0, ~470 ms
//! for 1, ~770 ms for a position marker.

use crate::events::{
    BcdCorrState, BcdEvent, BcdSource, BcdSymbol, BcdSymbolSource, BcdValue,
};

/// Closing grace: a window is closed once time is this far past its end,
/// which also bounds how late a cross-path event may arrive.
const CLOSE_TOLERANCE_MS: f64 = 50.0;

/// Cadence tolerance for the TENTATIVE -> TRACKING promotion.
const CADENCE_TOLERANCE_MS: f64 = 50.0;

/// Consecutive in-cadence symbols required for TRACKING.
const CADENCE_RUN: u32 = 3;

/// Consecutive NONE windows that demote TRACKING.
const NONE_LIMIT: u32 = 2;

/// Accumulator for the currently open window.
#[derive(Debug, Clone, Copy, Default)]
struct WindowAccum {
    time_energy: f64,
    freq_energy: f64,
    time_present: bool,
    freq_present: bool,
    max_duration_ms: f64,
    snr_sum: f64,
    snr_count: u32,
}

pub struct BcdWindowCorrelator {
    anchor_ms: Option<f64>,
    /// Index of the currently open window; window k covers
    /// [anchor + k*1000, anchor + (k+1)*1000).
    k: u64,
    accum: WindowAccum,
    symbol_index: u64,
    state: BcdCorrState,
    consecutive_none: u32,
    cadence_run: u32,
    last_emit_ms: Option<f64>,
    /// Events that arrived for an already-closed window (diagnostic).
    late_events: u64,
}

impl BcdWindowCorrelator {
    pub fn new() -> Self {
        Self {
            anchor_ms: None,
            k: 1,
            accum: WindowAccum::default(),
            symbol_index: 0,
            state: BcdCorrState::Acquiring,
            consecutive_none: 0,
            cadence_run: 0,
            last_emit_ms: None,
            late_events: 0,
        }
    }

    pub fn state(&self) -> BcdCorrState {
        self.state
    }

    pub fn symbol_count(&self) -> u64 {
        self.symbol_index
    }

    pub fn late_events(&self) -> u64 {
        self.late_events
    }

    /// A new minute marker was confirmed: re-align the window grid.
    /// Window k = 0 is the marker itself, so decoding starts at k = 1.
    ///
    /// The window still open on the old grid (second 59 of the closing
    /// minute) drains here; its symbol is returned so the minute keeps
    /// all 59 decoded seconds. The accumulator can only hold content if
    /// the gate was open, so emitting it never violates the lock gate.
    pub fn set_anchor(&mut self, anchor_ms: f64) -> Option<BcdSymbol> {
        let drained = match self.anchor_ms {
            Some(old) if self.accum.time_present || self.accum.freq_present => {
                Some(self.close_window(old))
            }
            _ => None,
        };
        self.anchor_ms = Some(anchor_ms);
        self.k = 1;
        self.accum = WindowAccum::default();
        drained
    }

    /// Accumulate a BCD pulse event. Ignored while unlocked or before the
    /// first anchor; events for closed windows are counted and dropped.
    pub fn on_event(&mut self, event: &BcdEvent, locked: bool) -> Vec<BcdSymbol> {
        let mut emitted = Vec::new();
        if !locked {
            return emitted;
        }
        let anchor = match self.anchor_ms {
            Some(a) => a,
            None => return emitted,
        };

        let idx = ((event.timestamp_ms - anchor) / 1000.0).floor() as i64;
        if idx < self.k as i64 {
            // Marker second (k = 0) or a window already closed.
            if idx > 0 {
                self.late_events += 1;
            }
            return emitted;
        }

        // The event may belong to a window ahead of the open one; close
        // intervening windows first so ordering never depends on arrival.
        while (self.k as i64) < idx {
            let symbol = self.close_window(anchor);
            emitted.push(symbol);
        }

        match event.source {
            BcdSource::Time => {
                self.accum.time_present = true;
                self.accum.time_energy += event.energy;
            }
            BcdSource::Freq => {
                self.accum.freq_present = true;
                self.accum.freq_energy += event.energy;
            }
        }
        self.accum.max_duration_ms = self.accum.max_duration_ms.max(event.duration_ms);
        if event.snr_db.is_finite() && event.snr_db > 0.0 {
            self.accum.snr_sum += event.snr_db;
            self.accum.snr_count += 1;
        }
        emitted
    }

    /// Close every window whose end has passed `now_ms`. No symbol is
    /// emitted while unlocked; the cursor still slides so that a later
    /// lock cannot flood out symbols for seconds that went by ungated.
    pub fn advance(&mut self, now_ms: f64, locked: bool) -> Vec<BcdSymbol> {
        let mut emitted = Vec::new();
        let anchor = match self.anchor_ms {
            Some(a) => a,
            None => return emitted,
        };

        while now_ms >= anchor + (self.k + 1) as f64 * 1000.0 + CLOSE_TOLERANCE_MS {
            if locked {
                emitted.push(self.close_window(anchor));
            } else {
                self.accum = WindowAccum::default();
                self.k += 1;
            }
        }
        emitted
    }

    /// Drain the open window at shutdown, emitting its symbol if anything
    /// accumulated.
    pub fn shutdown(&mut self) -> Option<BcdSymbol> {
        let anchor = self.anchor_ms?;
        let has_content = self.accum.time_present || self.accum.freq_present;
        if !has_content {
            return None;
        }
        Some(self.close_window(anchor))
    }

    fn close_window(&mut self, anchor: f64) -> BcdSymbol {
        let accum = std::mem::take(&mut self.accum);
        let window_start = anchor + self.k as f64 * 1000.0;
        let second = (self.k % 60) as u32;
        self.k += 1;

        let source = match (accum.time_present, accum.freq_present) {
            (true, true) => BcdSymbolSource::Both,
            (true, false) => BcdSymbolSource::Time,
            (false, true) => BcdSymbolSource::Freq,
            (false, false) => BcdSymbolSource::None,
        };

        let value = classify(accum.max_duration_ms, source != BcdSymbolSource::None);

        let confidence = if source == BcdSymbolSource::None || value == BcdValue::None {
            0.0
        } else {
            let base = if source == BcdSymbolSource::Both { 1.0 } else { 0.5 };
            let snr_scale = if accum.snr_count > 0 {
                let mean_snr = accum.snr_sum / accum.snr_count as f64;
                (mean_snr / 20.0).clamp(0.0, 1.0)
            } else {
                1.0
            };
            base * snr_scale
        };

        self.symbol_index += 1;
        let symbol = BcdSymbol {
            symbol_index: self.symbol_index,
            second,
            timestamp_ms: window_start,
            value,
            pulse_duration_ms: accum.max_duration_ms,
            source,
            confidence,
        };
        self.update_state(&symbol);
        symbol
    }

    fn update_state(&mut self, symbol: &BcdSymbol) {
        // Cadence check over consecutive emissions.
        let in_cadence = match self.last_emit_ms {
            Some(prev) => {
                (symbol.timestamp_ms - prev - 1000.0).abs() <= CADENCE_TOLERANCE_MS
            }
            None => false,
        };
        self.last_emit_ms = Some(symbol.timestamp_ms);
        self.cadence_run = if in_cadence { self.cadence_run + 1 } else { 0 };

        if symbol.value == BcdValue::None {
            self.consecutive_none += 1;
        } else {
            self.consecutive_none = 0;
        }

        self.state = match self.state {
            BcdCorrState::Acquiring => {
                if symbol.value != BcdValue::None {
                    BcdCorrState::Tentative
                } else {
                    BcdCorrState::Acquiring
                }
            }
            BcdCorrState::Tentative => {
                if self.cadence_run >= CADENCE_RUN {
                    BcdCorrState::Tracking
                } else {
                    BcdCorrState::Tentative
                }
            }
            BcdCorrState::Tracking => {
                if self.consecutive_none >= NONE_LIMIT {
                    BcdCorrState::Tentative
                } else {
                    BcdCorrState::Tracking
                }
            }
        };
    }
}

impl Default for BcdWindowCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulse-width classification. The boundaries are inclusive on the left
/// edge of ZERO and on the right edges throughout: 350 ms is a ZERO,
/// 650 ms a ONE, 900 ms a MARKER.
fn classify(duration_ms: f64, any_source: bool) -> BcdValue {
    if !any_source {
        return BcdValue::None;
    }
    if (100.0..=350.0).contains(&duration_ms) {
        BcdValue::Zero
    } else if duration_ms > 350.0 && duration_ms <= 650.0 {
        BcdValue::One
    } else if duration_ms > 650.0 && duration_ms <= 900.0 {
        BcdValue::Marker
    } else {
        BcdValue::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(source: BcdSource, ts: f64, duration: f64) -> BcdEvent {
        BcdEvent {
            source,
            timestamp_ms: ts,
            duration_ms: duration,
            energy: 50.0,
            snr_db: 15.0,
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(350.0, true), BcdValue::Zero);
        assert_eq!(classify(350.1, true), BcdValue::One);
        assert_eq!(classify(500.0, true), BcdValue::One);
        assert_eq!(classify(650.0, true), BcdValue::One);
        assert_eq!(classify(650.1, true), BcdValue::Marker);
        assert_eq!(classify(900.0, true), BcdValue::Marker);
        assert_eq!(classify(950.0, true), BcdValue::None);
        assert_eq!(classify(50.0, true), BcdValue::None);
    }

    #[test]
    fn no_symbols_while_unlocked() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        assert!(corr
            .on_event(&event(BcdSource::Time, 1_200.0, 470.0), false)
            .is_empty());
        assert!(corr.advance(10_000.0, false).is_empty());
        assert_eq!(corr.symbol_count(), 0);
    }

    #[test]
    fn one_symbol_per_window_with_the_event_value() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.on_event(&event(BcdSource::Time, 1_100.0, 470.0), true);
        let symbols = corr.advance(2_100.0, true);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].value, BcdValue::One);
        assert_eq!(symbols[0].second, 1);
        assert_eq!(symbols[0].source, BcdSymbolSource::Time);
        assert!((symbols[0].confidence - 0.375).abs() < 1e-9); // 0.5 * 15/20
    }

    #[test]
    fn empty_windows_emit_none_symbols() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        let symbols = corr.advance(5_100.0, true);
        assert_eq!(symbols.len(), 4); // windows 1..=4 closed
        assert!(symbols.iter().all(|s| s.value == BcdValue::None));
        assert!(symbols.iter().all(|s| s.source == BcdSymbolSource::None));
        assert!(symbols.iter().all(|s| s.confidence == 0.0));
    }

    #[test]
    fn both_sources_outrank_single_source_confidence() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.on_event(&event(BcdSource::Time, 1_100.0, 470.0), true);
        corr.on_event(&event(BcdSource::Freq, 1_150.0, 500.0), true);
        let both = corr.advance(2_100.0, true)[0];
        assert_eq!(both.source, BcdSymbolSource::Both);

        corr.on_event(&event(BcdSource::Time, 2_200.0, 470.0), true);
        let single = corr.advance(3_100.0, true)[0];
        assert!(both.confidence > single.confidence);
        // Longer pulse wins when both sources contribute.
        assert_eq!(both.pulse_duration_ms, 500.0);
    }

    #[test]
    fn symbol_indexes_are_strictly_increasing() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        for k in 1..=10 {
            corr.on_event(
                &event(BcdSource::Time, k as f64 * 1000.0 + 100.0, 170.0),
                true,
            );
        }
        let symbols = corr.advance(11_100.0, true);
        assert_eq!(symbols.len(), 10);
        assert!(symbols.windows(2).all(|w| w[1].symbol_index > w[0].symbol_index));
    }

    #[test]
    fn tracking_promotion_and_none_regression() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        assert_eq!(corr.state(), BcdCorrState::Acquiring);

        for k in 1..=5 {
            corr.on_event(
                &event(BcdSource::Time, k as f64 * 1000.0 + 100.0, 170.0),
                true,
            );
            corr.advance((k + 1) as f64 * 1000.0 + 100.0, true);
        }
        assert_eq!(corr.state(), BcdCorrState::Tracking);

        // Two consecutive empty windows drop back to TENTATIVE.
        corr.advance(8_100.0, true);
        assert_eq!(corr.state(), BcdCorrState::Tentative);
    }

    #[test]
    fn reanchoring_restarts_the_second_count() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.on_event(&event(BcdSource::Time, 1_100.0, 170.0), true);
        corr.advance(2_100.0, true);

        corr.set_anchor(60_000.0);
        corr.on_event(&event(BcdSource::Time, 61_100.0, 170.0), true);
        let symbols = corr.advance(62_100.0, true);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].second, 1);
    }

    #[test]
    fn windows_continue_past_fifty_nine_without_a_new_anchor() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.advance(60_100.0, true); // windows 1..=59
        let symbols = corr.advance(62_100.0, true); // 60 and 61
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].second, 0);
        assert_eq!(symbols[1].second, 1);
    }

    #[test]
    fn shutdown_drains_the_open_window() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.on_event(&event(BcdSource::Freq, 1_100.0, 470.0), true);
        let symbol = corr.shutdown().expect("open window had content");
        assert_eq!(symbol.value, BcdValue::One);
        assert!(corr.shutdown().is_none());
    }

    #[test]
    fn late_event_for_closed_window_is_dropped_and_counted() {
        let mut corr = BcdWindowCorrelator::new();
        corr.set_anchor(0.0);
        corr.advance(3_100.0, true); // windows 1 and 2 closed
        let emitted = corr.on_event(&event(BcdSource::Time, 1_500.0, 470.0), true);
        assert!(emitted.is_empty());
        assert_eq!(corr.late_events(), 1);
    }
}
