//! Minute-marker detector on the 50 kHz path.
//!
//! Same 256-point frame plumbing as the tick detector, but instead of
//! gating individual frames it slides an 800 ms energy sum over the
//! 1000 Hz bucket, matched to the long marker tone. A marker is emitted
//! once the sum has stayed above threshold for at least 500 ms, with a
//! cool-down so a single minute cannot double-trigger.

use num_complex::Complex64;

use crate::config::{DETECTOR_FFT_SIZE, DETECTOR_RATE};
use crate::dsp::FrameFft;
use crate::events::MarkerEvent;

/// Sliding window matched to the 800 ms marker tone, in frames.
const WINDOW_FRAMES: usize = 156;

/// Sustain requirement before a marker is emitted.
const SUSTAIN_MS: f64 = 500.0;

/// Minimum spacing between emitted markers.
const COOLDOWN_MS: f64 = 30_000.0;

const BUCKET_FIRST: usize = 5;
const BUCKET_LAST: usize = 6;

/// Receiver metadata attached to marker CSV logs. Annotation only; it
/// never influences detection.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RxMetadata {
    pub center_freq_hz: f64,
    pub gain_db: f64,
    pub lna_enabled: bool,
}

pub struct MarkerDetector {
    fft: FrameFft,
    frame_ms: f64,
    ring: [f64; WINDOW_FRAMES],
    ring_pos: usize,
    ring_filled: bool,
    window_sum: f64,
    noise_floor: f64,
    floor_seeded: bool,
    above_since_ms: Option<f64>,
    peak_sum: f64,
    last_emit_ms: Option<f64>,
    marker_count: u64,
    metadata: Option<RxMetadata>,
}

impl MarkerDetector {
    pub fn new() -> Self {
        Self {
            fft: FrameFft::new(DETECTOR_FFT_SIZE),
            frame_ms: DETECTOR_FFT_SIZE as f64 * 1000.0 / DETECTOR_RATE,
            ring: [0.0; WINDOW_FRAMES],
            ring_pos: 0,
            ring_filled: false,
            window_sum: 0.0,
            noise_floor: 0.0,
            floor_seeded: false,
            above_since_ms: None,
            peak_sum: 0.0,
            last_emit_ms: None,
            marker_count: 0,
            metadata: None,
        }
    }

    /// Record tuner metadata for log annotation.
    pub fn log_metadata(&mut self, meta: RxMetadata) {
        self.metadata = Some(meta);
    }

    pub fn metadata(&self) -> Option<RxMetadata> {
        self.metadata
    }

    pub fn marker_count(&self) -> u64 {
        self.marker_count
    }

    /// Feed one sync-band sample. Emits at most one marker per call.
    pub fn process(&mut self, sample: Complex64, ts_ms: f64) -> Option<MarkerEvent> {
        if !self.fft.push(sample) {
            return None;
        }

        let n = self.fft.size();
        let frame_energy = self.fft.bucket_energy(BUCKET_FIRST, BUCKET_LAST)
            + self.fft.bucket_energy(n - BUCKET_LAST, n - BUCKET_FIRST);

        // Slide the window.
        self.window_sum += frame_energy - self.ring[self.ring_pos];
        self.ring[self.ring_pos] = frame_energy;
        self.ring_pos = (self.ring_pos + 1) % WINDOW_FRAMES;
        if self.ring_pos == 0 {
            self.ring_filled = true;
        }
        if !self.ring_filled {
            return None;
        }

        // Own per-frame floor, adapted only while the window is quiet.
        if !self.floor_seeded {
            self.noise_floor = frame_energy;
            self.floor_seeded = true;
            return None;
        }

        let window_threshold = self.noise_floor * 2.0 * WINDOW_FRAMES as f64;
        let frame_above = self.noise_floor > 0.0 && frame_energy > self.noise_floor * 2.0;
        // The window sum alone would stay hot for a full window length
        // after any strong burst, ticks included; requiring the tone to
        // still be present this frame ties the sustain measurement to the
        // actual pulse width.
        let above = frame_above && self.window_sum > window_threshold;

        if !frame_above {
            self.noise_floor += 0.02 * (frame_energy - self.noise_floor);
        }

        match (above, self.above_since_ms) {
            (true, None) => {
                self.above_since_ms = Some(ts_ms);
                self.peak_sum = self.window_sum;
                None
            }
            (true, Some(_)) => {
                self.peak_sum = self.peak_sum.max(self.window_sum);
                None
            }
            (false, Some(start)) => {
                let sustained = ts_ms - start;
                self.above_since_ms = None;
                if sustained < SUSTAIN_MS {
                    return None;
                }
                if let Some(last) = self.last_emit_ms {
                    if ts_ms - last < COOLDOWN_MS {
                        return None;
                    }
                }
                let since_last = self
                    .last_emit_ms
                    .map(|last| (start - last) / 1000.0)
                    .unwrap_or(0.0);
                self.last_emit_ms = Some(start);
                self.marker_count += 1;
                Some(MarkerEvent {
                    marker_number: self.marker_count,
                    timestamp_ms: start,
                    duration_ms: sustained,
                    accumulated_energy: self.peak_sum,
                    since_last_marker_sec: since_last,
                })
            }
            (false, None) => None,
        }
    }

    pub fn reset(&mut self) {
        self.fft.reset();
        self.ring = [0.0; WINDOW_FRAMES];
        self.ring_pos = 0;
        self.ring_filled = false;
        self.window_sum = 0.0;
        self.noise_floor = 0.0;
        self.floor_seeded = false;
        self.above_since_ms = None;
        self.last_emit_ms = None;
    }
}

impl Default for MarkerDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn feed(det: &mut MarkerDetector, ms: f64, tone_amp: f64, n: &mut u64) -> Vec<MarkerEvent> {
        let count = (ms * DETECTOR_RATE / 1000.0) as u64;
        let mut out = Vec::new();
        for _ in 0..count {
            let i = *n;
            let t = i as f64 / DETECTOR_RATE;
            let phase = TAU * 1000.0 * t;
            let noise = 0.01 * ((i % 41) as f64 / 41.0 - 0.5);
            let s = Complex64::new(tone_amp * phase.cos() + noise, tone_amp * phase.sin());
            let ts = i as f64 * 1000.0 / DETECTOR_RATE;
            if let Some(m) = det.process(s, ts) {
                out.push(m);
            }
            *n += 1;
        }
        out
    }

    #[test]
    fn silence_emits_no_marker() {
        let mut det = MarkerDetector::new();
        let mut n = 0;
        let out = feed(&mut det, 5_000.0, 0.0, &mut n);
        assert!(out.is_empty());
    }

    #[test]
    fn marker_tone_is_detected_once() {
        let mut det = MarkerDetector::new();
        let mut n = 0;
        feed(&mut det, 3_000.0, 0.0, &mut n);
        let mut out = feed(&mut det, 800.0, 1.0, &mut n);
        out.extend(feed(&mut det, 2_000.0, 0.0, &mut n));

        assert_eq!(out.len(), 1);
        assert!(out[0].duration_ms >= 500.0);
        assert_eq!(out[0].marker_number, 1);
    }

    #[test]
    fn short_burst_does_not_qualify() {
        let mut det = MarkerDetector::new();
        let mut n = 0;
        feed(&mut det, 3_000.0, 0.0, &mut n);
        // 200 ms of tone cannot sustain the 800 ms window above
        // threshold for 500 ms.
        let mut out = feed(&mut det, 200.0, 1.0, &mut n);
        out.extend(feed(&mut det, 2_000.0, 0.0, &mut n));
        assert!(out.is_empty());
    }

    #[test]
    fn cooldown_suppresses_back_to_back_markers() {
        let mut det = MarkerDetector::new();
        let mut n = 0;
        feed(&mut det, 3_000.0, 0.0, &mut n);
        let mut out = feed(&mut det, 800.0, 1.0, &mut n);
        out.extend(feed(&mut det, 5_000.0, 0.0, &mut n));
        // Second marker tone only 5 s later: inside the cool-down.
        out.extend(feed(&mut det, 800.0, 1.0, &mut n));
        out.extend(feed(&mut det, 2_000.0, 0.0, &mut n));

        assert_eq!(out.len(), 1);
    }

    #[test]
    fn markers_a_minute_apart_both_fire() {
        let mut det = MarkerDetector::new();
        let mut n = 0;
        feed(&mut det, 3_000.0, 0.0, &mut n);
        let mut out = feed(&mut det, 800.0, 1.0, &mut n);
        out.extend(feed(&mut det, 59_200.0, 0.0, &mut n));
        out.extend(feed(&mut det, 800.0, 1.0, &mut n));
        out.extend(feed(&mut det, 2_000.0, 0.0, &mut n));

        assert_eq!(out.len(), 2);
        assert!(out[1].since_last_marker_sec > 55.0 && out[1].since_last_marker_sec < 65.0);
        assert!(out[1].marker_number > out[0].marker_number);
    }

    #[test]
    fn metadata_is_stored_but_does_not_affect_detection() {
        let mut det = MarkerDetector::new();
        det.log_metadata(RxMetadata {
            center_freq_hz: 10_000_000.0,
            gain_db: 28.0,
            lna_enabled: true,
        });
        assert!(det.metadata().is_some());
        let mut n = 0;
        assert!(feed(&mut det, 3_000.0, 0.0, &mut n).is_empty());
    }
}
