//! Tick correlator: inter-tick interval statistics and grid fitting.
//!
//! Not a gate. It keeps a rolling histogram of tick spacing and scores
//! minute-marker candidates by how well they sit on the established one
//! second grid; the score rides along to the sync detector as a hint.

use crate::events::{TickEvent, TickMarkerEvent};

/// Histogram span: 800-1200 ms in 20 ms buckets.
const HIST_MIN_MS: f64 = 800.0;
const HIST_BUCKET_MS: f64 = 20.0;
const HIST_BUCKETS: usize = 20;

/// Summary statistics over observed ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct TickStats {
    pub tick_count: u64,
    pub interval_count: u64,
    pub mean_interval_ms: f64,
    pub jitter_ms: f64,
    /// Intervals that fell outside the histogram span.
    pub wild_intervals: u64,
}

pub struct TickCorrelator {
    last_tick_ms: Option<f64>,
    histogram: [u32; HIST_BUCKETS],
    tick_count: u64,
    interval_count: u64,
    interval_sum: f64,
    interval_sum_sq: f64,
    wild_intervals: u64,
}

impl TickCorrelator {
    pub fn new() -> Self {
        Self {
            last_tick_ms: None,
            histogram: [0; HIST_BUCKETS],
            tick_count: 0,
            interval_count: 0,
            interval_sum: 0.0,
            interval_sum_sq: 0.0,
            wild_intervals: 0,
        }
    }

    pub fn on_tick(&mut self, tick: &TickEvent) {
        self.tick_count += 1;
        if let Some(last) = self.last_tick_ms {
            let interval = tick.timestamp_ms - last;
            self.interval_count += 1;
            self.interval_sum += interval;
            self.interval_sum_sq += interval * interval;

            let bucket = (interval - HIST_MIN_MS) / HIST_BUCKET_MS;
            if bucket >= 0.0 && (bucket as usize) < HIST_BUCKETS {
                self.histogram[bucket as usize] += 1;
            } else {
                self.wild_intervals += 1;
            }
        }
        self.last_tick_ms = Some(tick.timestamp_ms);
    }

    /// Score a minute-marker candidate against the tick grid and return
    /// it with `corr_ratio` filled in.
    ///
    /// 1.0 means the candidate lands exactly on the next expected tick
    /// instant; 0.0 means it falls half a second off the grid (or no
    /// grid has been established yet).
    pub fn annotate(&self, candidate: TickMarkerEvent) -> TickMarkerEvent {
        let corr_ratio = match self.last_tick_ms {
            Some(last) => {
                let phase = (candidate.timestamp_ms - last).rem_euclid(1000.0);
                let distance = phase.min(1000.0 - phase);
                1.0 - distance / 500.0
            }
            None => 0.0,
        };
        TickMarkerEvent {
            corr_ratio,
            ..candidate
        }
    }

    pub fn histogram(&self) -> &[u32; HIST_BUCKETS] {
        &self.histogram
    }

    pub fn stats(&self) -> TickStats {
        let mean = if self.interval_count > 0 {
            self.interval_sum / self.interval_count as f64
        } else {
            0.0
        };
        let jitter = if self.interval_count > 1 {
            let var = self.interval_sum_sq / self.interval_count as f64 - mean * mean;
            var.max(0.0).sqrt()
        } else {
            0.0
        };
        TickStats {
            tick_count: self.tick_count,
            interval_count: self.interval_count,
            mean_interval_ms: mean,
            jitter_ms: jitter,
            wild_intervals: self.wild_intervals,
        }
    }
}

impl Default for TickCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_at(n: u64, ts: f64) -> TickEvent {
        TickEvent {
            tick_number: n,
            timestamp_ms: ts,
            duration_ms: 5.12,
            peak_energy: 1.0,
            noise_floor: 0.01,
            snr_db: 20.0,
        }
    }

    #[test]
    fn regular_ticks_build_a_tight_histogram() {
        let mut corr = TickCorrelator::new();
        for k in 0..60 {
            corr.on_tick(&tick_at(k + 1, k as f64 * 1000.0));
        }
        let stats = corr.stats();
        assert_eq!(stats.tick_count, 60);
        assert_eq!(stats.interval_count, 59);
        assert!((stats.mean_interval_ms - 1000.0).abs() < 1e-9);
        assert!(stats.jitter_ms < 1e-6);
        // All intervals in the 1000 ms bucket
        assert_eq!(corr.histogram()[10], 59);
    }

    #[test]
    fn on_grid_candidate_scores_high() {
        let mut corr = TickCorrelator::new();
        for k in 0..10 {
            corr.on_tick(&tick_at(k + 1, k as f64 * 1000.0));
        }
        let cand = TickMarkerEvent {
            timestamp_ms: 10_000.0,
            duration_ms: 800.0,
            corr_ratio: 0.0,
        };
        let scored = corr.annotate(cand);
        assert!(scored.corr_ratio > 0.95, "ratio {}", scored.corr_ratio);
    }

    #[test]
    fn off_grid_candidate_scores_low() {
        let mut corr = TickCorrelator::new();
        for k in 0..10 {
            corr.on_tick(&tick_at(k + 1, k as f64 * 1000.0));
        }
        let cand = TickMarkerEvent {
            timestamp_ms: 10_500.0,
            duration_ms: 800.0,
            corr_ratio: 0.0,
        };
        assert!(corr.annotate(cand).corr_ratio < 0.05);
    }

    #[test]
    fn no_grid_scores_zero() {
        let corr = TickCorrelator::new();
        let cand = TickMarkerEvent {
            timestamp_ms: 123.0,
            duration_ms: 800.0,
            corr_ratio: 0.0,
        };
        assert_eq!(corr.annotate(cand).corr_ratio, 0.0);
    }

    #[test]
    fn wild_interval_is_counted_not_binned() {
        let mut corr = TickCorrelator::new();
        corr.on_tick(&tick_at(1, 0.0));
        corr.on_tick(&tick_at(2, 5_000.0));
        assert_eq!(corr.stats().wild_intervals, 1);
    }
}
