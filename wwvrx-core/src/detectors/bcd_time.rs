//! Coarse 100 Hz subcarrier pulse detector on the 50 kHz path.
//!
//! Same frame-FFT architecture as the tick detector, retuned: the bucket
//! is bin 1 of the 256-point FFT (roughly 98-293 Hz at 195.3 Hz/bin, a
//! wide net around the 100 Hz subcarrier) plus its mirror, and the pulse
//! width window covers the full BCD symbol range.

use num_complex::Complex64;

use super::pulse::PulseGate;
use crate::config::{DETECTOR_FFT_SIZE, DETECTOR_RATE};
use crate::dsp::FrameFft;
use crate::events::{BcdEvent, BcdSource};

/// BCD pulse width window in ms.
const PULSE_MIN_MS: f64 = 100.0;
const PULSE_MAX_MS: f64 = 1000.0;

/// 100 Hz lands in bin 1 at this resolution.
const BUCKET_BIN: usize = 1;

pub struct BcdTimeDetector {
    fft: FrameFft,
    gate: PulseGate,
    frame_ms: f64,
    event_count: u64,
}

impl BcdTimeDetector {
    pub fn new() -> Self {
        Self {
            fft: FrameFft::new(DETECTOR_FFT_SIZE),
            gate: PulseGate::standard(),
            frame_ms: DETECTOR_FFT_SIZE as f64 * 1000.0 / DETECTOR_RATE,
            event_count: 0,
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Feed one raw detector-path sample.
    pub fn process(&mut self, sample: Complex64, ts_ms: f64) -> Option<BcdEvent> {
        if !self.fft.push(sample) {
            return None;
        }

        let n = self.fft.size();
        let energy = self.fft.bucket_energy(BUCKET_BIN, BUCKET_BIN)
            + self.fft.bucket_energy(n - BUCKET_BIN, n - BUCKET_BIN);

        let pulse = self.gate.on_frame(energy, ts_ms, self.frame_ms)?;

        if !(PULSE_MIN_MS..=PULSE_MAX_MS).contains(&pulse.duration_ms) {
            return None;
        }
        self.event_count += 1;
        Some(BcdEvent {
            source: BcdSource::Time,
            timestamp_ms: pulse.start_ms,
            duration_ms: pulse.duration_ms,
            // The window correlator weighs TIME events by their peak.
            energy: pulse.peak_energy,
            snr_db: pulse.snr_db,
        })
    }

    pub fn reset(&mut self) {
        self.fft.reset();
        self.gate.reset();
    }
}

impl Default for BcdTimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn feed(det: &mut BcdTimeDetector, ms: f64, amp: f64, n: &mut u64) -> Vec<BcdEvent> {
        let count = (ms * DETECTOR_RATE / 1000.0) as u64;
        let mut out = Vec::new();
        for _ in 0..count {
            let i = *n;
            let t = i as f64 / DETECTOR_RATE;
            let noise = 0.01 * ((i % 29) as f64 / 29.0 - 0.5);
            let s = Complex64::new(amp * (TAU * 100.0 * t).cos() + noise, 0.0);
            if let Some(e) = det.process(s, i as f64 * 1000.0 / DETECTOR_RATE) {
                out.push(e);
            }
            *n += 1;
        }
        out
    }

    #[test]
    fn subcarrier_pulse_is_detected_with_its_width() {
        let mut det = BcdTimeDetector::new();
        let mut n = 0;
        feed(&mut det, 1_000.0, 0.0, &mut n);
        let mut out = feed(&mut det, 500.0, 1.0, &mut n);
        out.extend(feed(&mut det, 500.0, 0.0, &mut n));

        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.source, BcdSource::Time);
        assert!(e.duration_ms > 450.0 && e.duration_ms < 550.0, "width {}", e.duration_ms);
    }

    #[test]
    fn pulse_below_100_ms_is_dropped() {
        let mut det = BcdTimeDetector::new();
        let mut n = 0;
        feed(&mut det, 1_000.0, 0.0, &mut n);
        let mut out = feed(&mut det, 50.0, 1.0, &mut n);
        out.extend(feed(&mut det, 500.0, 0.0, &mut n));
        assert!(out.is_empty());
    }

    #[test]
    fn silence_emits_nothing() {
        let mut det = BcdTimeDetector::new();
        let mut n = 0;
        assert!(feed(&mut det, 3_000.0, 0.0, &mut n).is_empty());
        assert_eq!(det.event_count(), 0);
    }
}
