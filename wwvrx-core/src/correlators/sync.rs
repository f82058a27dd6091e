//! Sync detector: turns paired minute-marker detections into a locked
//! minute timebase.
//!
//! Two pending slots hold the latest tick-marker candidate (from the tick
//! detector's long-pulse path) and the latest fast-path marker event.
//! When both are present and within 1500 ms of each other, the pair is a
//! confirmed minute marker; intervals between confirmations then walk the
//! state from ACQUIRING through TENTATIVE to LOCKED.

use crate::events::{MarkerEvent, SyncState, SyncStatus, SyncUpdate, TickMarkerEvent};

/// Pending slots expire after this long without a counterpart.
const PENDING_TIMEOUT_MS: f64 = 3_000.0;

/// Maximum fast/slow pairing distance.
const CORRELATION_MS: f64 = 1_500.0;

/// Interval policy: at least this much between confirmations...
const MIN_INTERVAL_MS: f64 = 55_000.0;

/// ...and within this far of a whole multiple of one minute.
const MULTIPLE_TOLERANCE_MS: f64 = 5_000.0;

/// A "good" interval for lock purposes is a single minute, give or take.
const GOOD_MIN_MS: f64 = 55_000.0;
const GOOD_MAX_MS: f64 = 65_000.0;

pub struct SyncDetector {
    pending_tick_marker: Option<TickMarkerEvent>,
    pending_marker: Option<MarkerEvent>,
    state: SyncState,
    last_confirmed_ms: f64,
    prev_confirmed_ms: f64,
    confirmed_count: u64,
    good_intervals: u64,
    expired_pending: u64,
    /// Optional stale-lock degradation (off by default).
    lock_timeout_ms: Option<f64>,
}

impl SyncDetector {
    pub fn new(lock_timeout_ms: Option<f64>) -> Self {
        Self {
            pending_tick_marker: None,
            pending_marker: None,
            state: SyncState::Acquiring,
            // The pipeline origin. The first confirmation is good by rule;
            // its offset from the origin still counts toward lock when the
            // stream happens to begin on a minute boundary.
            last_confirmed_ms: 0.0,
            prev_confirmed_ms: 0.0,
            confirmed_count: 0,
            good_intervals: 0,
            expired_pending: 0,
            lock_timeout_ms,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state,
            last_confirmed_ms: self.last_confirmed_ms,
            prev_confirmed_ms: self.prev_confirmed_ms,
            confirmed_count: self.confirmed_count,
            good_intervals: self.good_intervals,
            expired_pending: self.expired_pending,
        }
    }

    pub fn on_tick_marker(&mut self, event: TickMarkerEvent) -> Option<SyncUpdate> {
        self.pending_tick_marker = Some(event);
        self.try_correlate()
    }

    pub fn on_marker(&mut self, event: MarkerEvent) -> Option<SyncUpdate> {
        self.pending_marker = Some(event);
        self.try_correlate()
    }

    /// Expire stale pending slots and, if configured, degrade a stale lock.
    pub fn advance(&mut self, now_ms: f64) {
        if let Some(tm) = &self.pending_tick_marker {
            if now_ms - tm.timestamp_ms > PENDING_TIMEOUT_MS {
                self.pending_tick_marker = None;
                self.expired_pending += 1;
            }
        }
        if let Some(m) = &self.pending_marker {
            if now_ms - m.timestamp_ms > PENDING_TIMEOUT_MS {
                self.pending_marker = None;
                self.expired_pending += 1;
            }
        }
        if let Some(timeout) = self.lock_timeout_ms {
            if self.state == SyncState::Locked
                && self.confirmed_count > 0
                && now_ms - self.last_confirmed_ms > timeout
            {
                self.state = SyncState::Tentative;
            }
        }
    }

    fn try_correlate(&mut self) -> Option<SyncUpdate> {
        let tm = self.pending_tick_marker?;
        let m = self.pending_marker?;

        let delta_ms = (tm.timestamp_ms - m.timestamp_ms).abs();
        if delta_ms >= CORRELATION_MS {
            // Not the same underlying event; the older slot will age out.
            return None;
        }
        self.pending_tick_marker = None;
        self.pending_marker = None;

        let interval = tm.timestamp_ms - self.last_confirmed_ms;
        if !self.interval_is_good(interval) {
            return None;
        }

        self.prev_confirmed_ms = self.last_confirmed_ms;
        self.last_confirmed_ms = tm.timestamp_ms;
        self.confirmed_count += 1;
        if (GOOD_MIN_MS..=GOOD_MAX_MS).contains(&interval) {
            self.good_intervals += 1;
        }

        self.state = if self.good_intervals >= 2 {
            SyncState::Locked
        } else if self.confirmed_count >= 1 {
            SyncState::Tentative
        } else {
            SyncState::Acquiring
        };

        Some(SyncUpdate {
            timestamp_ms: tm.timestamp_ms,
            marker_number: self.confirmed_count,
            state: self.state,
            interval_sec: interval / 1000.0,
            delta_ms,
            tick_duration_ms: tm.duration_ms,
            marker_duration_ms: m.duration_ms,
        })
    }

    /// First confirmation is good regardless; afterwards the interval must
    /// be at least a minute (less tolerance) and sit within +-5 s of a
    /// whole multiple of 60 s, which absorbs dropped markers.
    fn interval_is_good(&self, interval_ms: f64) -> bool {
        if self.confirmed_count == 0 {
            return true;
        }
        if interval_ms < MIN_INTERVAL_MS {
            return false;
        }
        let minutes = (interval_ms / 60_000.0).round();
        (interval_ms - minutes * 60_000.0).abs() <= MULTIPLE_TOLERANCE_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_marker(ts: f64) -> TickMarkerEvent {
        TickMarkerEvent {
            timestamp_ms: ts,
            duration_ms: 800.0,
            corr_ratio: 0.9,
        }
    }

    fn marker(ts: f64) -> MarkerEvent {
        MarkerEvent {
            marker_number: 1,
            timestamp_ms: ts,
            duration_ms: 780.0,
            accumulated_energy: 100.0,
            since_last_marker_sec: 60.0,
        }
    }

    /// Deliver a correlated pair at `ts` (marker trailing by 200 ms).
    fn pair(sync: &mut SyncDetector, ts: f64) -> Option<SyncUpdate> {
        sync.on_tick_marker(tick_marker(ts));
        sync.on_marker(marker(ts + 200.0))
    }

    #[test]
    fn starts_acquiring() {
        let sync = SyncDetector::new(None);
        assert_eq!(sync.state(), SyncState::Acquiring);
        assert_eq!(sync.status().confirmed_count, 0);
    }

    #[test]
    fn boundary_aligned_stream_locks_on_second_marker() {
        let mut sync = SyncDetector::new(None);
        let up1 = pair(&mut sync, 60_000.0).expect("first confirmation");
        assert_eq!(up1.state, SyncState::Tentative);
        assert_eq!(up1.marker_number, 1);

        let up2 = pair(&mut sync, 120_000.0).expect("second confirmation");
        assert_eq!(up2.state, SyncState::Locked);
        assert!((up2.interval_sec - 60.0).abs() < 1.0);
    }

    #[test]
    fn unaligned_start_needs_two_minute_intervals() {
        let mut sync = SyncDetector::new(None);
        // First marker 83 s in: good by rule but not a 60 s interval.
        pair(&mut sync, 83_000.0).expect("first");
        assert_eq!(sync.state(), SyncState::Tentative);

        pair(&mut sync, 143_000.0).expect("second");
        assert_eq!(sync.state(), SyncState::Tentative);

        let up = pair(&mut sync, 203_000.0).expect("third");
        assert_eq!(up.state, SyncState::Locked);
    }

    #[test]
    fn dropped_marker_interval_is_accepted_but_not_good() {
        let mut sync = SyncDetector::new(None);
        pair(&mut sync, 60_000.0).expect("first");
        // Second marker missed entirely; third shows up at 180 s.
        let up = pair(&mut sync, 180_000.0).expect("double interval accepted");
        assert!((up.interval_sec - 120.0).abs() < 1.0);
        assert_eq!(up.state, SyncState::Tentative);
        assert_eq!(sync.status().good_intervals, 1);

        // One more clean minute gets the second good interval.
        let up = pair(&mut sync, 240_000.0).expect("fourth");
        assert_eq!(up.state, SyncState::Locked);
    }

    #[test]
    fn short_or_off_multiple_intervals_are_rejected() {
        let mut sync = SyncDetector::new(None);
        pair(&mut sync, 60_000.0).expect("first");
        // 30 s later: below the minimum interval.
        assert!(pair(&mut sync, 90_000.0).is_none());
        // 83 s later: neither one minute nor a clean multiple.
        assert!(pair(&mut sync, 143_000.0).is_none());
        assert_eq!(sync.status().confirmed_count, 1);
    }

    #[test]
    fn far_apart_events_do_not_correlate() {
        let mut sync = SyncDetector::new(None);
        sync.on_tick_marker(tick_marker(60_000.0));
        assert!(sync.on_marker(marker(62_000.0)).is_none());
        assert_eq!(sync.status().confirmed_count, 0);
    }

    #[test]
    fn pending_slots_expire_after_three_seconds() {
        let mut sync = SyncDetector::new(None);
        sync.on_tick_marker(tick_marker(60_000.0));
        sync.advance(64_000.0);
        assert_eq!(sync.status().expired_pending, 1);
        // The late marker finds an empty slot: no confirmation.
        assert!(sync.on_marker(marker(64_100.0)).is_none());
    }

    #[test]
    fn lock_never_degrades_by_default() {
        let mut sync = SyncDetector::new(None);
        pair(&mut sync, 60_000.0);
        pair(&mut sync, 120_000.0);
        assert_eq!(sync.state(), SyncState::Locked);
        sync.advance(10_000_000.0);
        assert_eq!(sync.state(), SyncState::Locked);
    }

    #[test]
    fn optional_timeout_degrades_stale_lock_to_tentative() {
        let mut sync = SyncDetector::new(Some(180_000.0));
        pair(&mut sync, 60_000.0);
        pair(&mut sync, 120_000.0);
        assert_eq!(sync.state(), SyncState::Locked);
        sync.advance(290_000.0);
        assert_eq!(sync.state(), SyncState::Tentative);
        // A fresh confirmation restores the lock.
        let up = pair(&mut sync, 300_000.0).expect("relock");
        assert_eq!(up.state, SyncState::Locked);
    }
}
