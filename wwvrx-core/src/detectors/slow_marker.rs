//! Slow-path minute-marker verifier.
//!
//! Consumes bins from the externally produced display FFT (1024 points at
//! 12 kHz, ~85 ms frames with 50% overlap handled by the producer). Keeps
//! a ring of the last N frame energies around 1000 Hz and reports a
//! sliding-sum verdict every frame; the marker correlator uses the stream
//! to confirm or refute the fast path.

use crate::config::{DISPLAY_FFT_SIZE, DISPLAY_RATE};
use crate::events::SlowMarkerFrame;

/// Frames in the sliding sum.
const RING_FRAMES: usize = 10;

/// Signal window half-width in bins around the 1000 Hz center.
const SIGNAL_HALF_BINS: usize = 8;

/// Offset and width of the two flanking noise buckets.
const NOISE_GAP_BINS: usize = 16;
const NOISE_BUCKET_BINS: usize = 8;

pub struct SlowMarkerDetector {
    center_bin: usize,
    ring: [f64; RING_FRAMES],
    ring_pos: usize,
    ring_filled: bool,
    accumulated: f64,
    noise_floor: f64,
    floor_seeded: bool,
    frames_seen: u64,
}

impl SlowMarkerDetector {
    pub fn new() -> Self {
        let bin_width = DISPLAY_RATE / DISPLAY_FFT_SIZE as f64;
        Self {
            center_bin: (1000.0 / bin_width).round() as usize,
            ring: [0.0; RING_FRAMES],
            ring_pos: 0,
            ring_filled: false,
            accumulated: 0.0,
            noise_floor: 0.0,
            floor_seeded: false,
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Process one display-FFT frame. `bins` holds per-bin power for the
    /// full FFT; frames shorter than the signal window are ignored.
    /// A frame is emitted every call once enough bins are present.
    pub fn process_fft(&mut self, bins: &[f64], ts_ms: f64) -> Option<SlowMarkerFrame> {
        let hi = self.center_bin + NOISE_GAP_BINS + NOISE_BUCKET_BINS;
        if bins.len() <= hi || self.center_bin < hi - self.center_bin {
            return None;
        }
        self.frames_seen += 1;

        let sum_range = |lo: usize, hi: usize| -> f64 {
            bins[lo..=hi]
                .iter()
                .map(|e| if e.is_finite() { *e } else { 0.0 })
                .sum()
        };

        let signal = sum_range(
            self.center_bin - SIGNAL_HALF_BINS,
            self.center_bin + SIGNAL_HALF_BINS,
        );

        // Noise from two buckets flanking the signal window.
        let below = sum_range(
            self.center_bin - NOISE_GAP_BINS - NOISE_BUCKET_BINS,
            self.center_bin - NOISE_GAP_BINS - 1,
        );
        let above = sum_range(
            self.center_bin + NOISE_GAP_BINS + 1,
            self.center_bin + NOISE_GAP_BINS + NOISE_BUCKET_BINS,
        );
        // Per-bin mean of the flanking buckets, scaled to the signal
        // window width so the two sums compare like for like.
        let signal_bins = (2 * SIGNAL_HALF_BINS + 1) as f64;
        let noise = (below + above) / (2.0 * NOISE_BUCKET_BINS as f64) * signal_bins;

        // Slide the ring.
        self.accumulated += signal - self.ring[self.ring_pos];
        self.ring[self.ring_pos] = signal;
        self.ring_pos = (self.ring_pos + 1) % RING_FRAMES;
        if self.ring_pos == 0 {
            self.ring_filled = true;
        }

        if !self.floor_seeded {
            self.noise_floor = noise;
            self.floor_seeded = true;
        }

        let above_threshold = self.ring_filled
            && self.noise_floor > 0.0
            && self.accumulated > self.noise_floor * 2.0 * RING_FRAMES as f64;

        // Slow first-order adaptation, held while above threshold.
        if !above_threshold {
            self.noise_floor += 0.05 * (noise - self.noise_floor);
        }

        let snr_db = if self.noise_floor > 0.0 {
            10.0 * (self.accumulated / (self.noise_floor * RING_FRAMES as f64))
                .max(1e-12)
                .log10()
        } else {
            0.0
        };

        Some(SlowMarkerFrame {
            timestamp_ms: ts_ms,
            energy: self.accumulated,
            snr_db,
            noise_floor: self.noise_floor,
            above_threshold,
        })
    }

    pub fn reset(&mut self) {
        self.ring = [0.0; RING_FRAMES];
        self.ring_pos = 0;
        self.ring_filled = false;
        self.accumulated = 0.0;
        self.noise_floor = 0.0;
        self.floor_seeded = false;
    }
}

impl Default for SlowMarkerDetector {
    fn default() -> Self {
        Self::new()
    }
}
