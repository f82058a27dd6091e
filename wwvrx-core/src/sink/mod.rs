//! Event sinks: where pipeline output goes.
//!
//! The pipeline fans every event out to a set of `EventSink` trait objects.
//! A sink implements only the hooks it cares about; the defaults discard.
//! Shipped sinks: per-component CSV logs and a UDP telemetry broadcaster.

pub mod csv;
pub mod telemetry;

pub use csv::CsvSink;
pub use telemetry::TelemetrySink;

use crate::detectors::RxMetadata;
use crate::events::{
    BcdSymbol, CorrelatedMarker, MarkerEvent, SlowMarkerFrame, SyncUpdate, TickEvent,
    TickMarkerEvent, ToneMeasurement,
};

/// Receiver capability set for pipeline events.
///
/// Hooks run on the producer's thread and must return quickly; sinks that
/// do I/O are expected to be non-blocking or best-effort.
pub trait EventSink {
    fn on_tick(&mut self, _event: &TickEvent) {}
    fn on_tick_marker(&mut self, _event: &TickMarkerEvent) {}
    fn on_marker(&mut self, _event: &MarkerEvent) {}
    fn on_slow_frame(&mut self, _frame: &SlowMarkerFrame) {}
    fn on_correlated_marker(&mut self, _event: &CorrelatedMarker) {}
    fn on_sync(&mut self, _update: &SyncUpdate) {}
    fn on_bcd_symbol(&mut self, _symbol: &BcdSymbol) {}
    fn on_tone(&mut self, _measurement: &ToneMeasurement) {}
    fn on_metadata(&mut self, _meta: &RxMetadata) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSink {
        ticks: usize,
    }

    impl EventSink for CountingSink {
        fn on_tick(&mut self, _event: &TickEvent) {
            self.ticks += 1;
        }
    }

    #[test]
    fn default_hooks_are_noops() {
        let mut sink = CountingSink { ticks: 0 };
        let tick = TickEvent {
            tick_number: 1,
            timestamp_ms: 0.0,
            duration_ms: 5.0,
            peak_energy: 1.0,
            noise_floor: 0.1,
            snr_db: 10.0,
        };
        sink.on_tick(&tick);
        sink.on_sync(&SyncUpdate {
            timestamp_ms: 0.0,
            marker_number: 1,
            state: crate::events::SyncState::Tentative,
            interval_sec: 60.0,
            delta_ms: 100.0,
            tick_duration_ms: 800.0,
            marker_duration_ms: 780.0,
        });
        assert_eq!(sink.ticks, 1);
    }
}
