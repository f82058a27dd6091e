//! Second-tick detector on the 50 kHz path.
//!
//! A 256-point frame FFT (5.12 ms frames) watches the 1000/1200 Hz bucket
//! where the WWV and WWVH tick tones land. Short bursts (2-50 ms) become
//! `TickEvent`s; long bursts (500-900 ms) are minute-marker candidates and
//! become `TickMarkerEvent`s. Everything else is discarded.

use num_complex::Complex64;

use super::pulse::PulseGate;
use crate::config::{DETECTOR_FFT_SIZE, DETECTOR_RATE};
use crate::dsp::FrameFft;
use crate::events::{TickEvent, TickMarkerEvent};

/// Tick width window in ms.
const TICK_MIN_MS: f64 = 2.0;
const TICK_MAX_MS: f64 = 50.0;

/// Minute-marker candidate width window in ms.
const MARKER_MIN_MS: f64 = 500.0;
const MARKER_MAX_MS: f64 = 900.0;

/// Quality gate on emitted ticks. A single noisy frame can cross the 2x
/// energy threshold (bucket energy is chi-square distributed), but it
/// cannot fake an 8x peak; markers need no gate because noise cannot
/// sustain 500 ms.
const TICK_MIN_SNR_DB: f64 = 9.0;

/// WWV tick tone (1000 Hz) sits in bin 5 at 195.3 Hz/bin; WWVH (1200 Hz)
/// in bin 6. The baseband audio is real, so the mirror bins carry the
/// same energy and are included.
const BUCKET_FIRST: usize = 5;
const BUCKET_LAST: usize = 6;

/// What one processed sample produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutput {
    None,
    Tick(TickEvent),
    TickMarker(TickMarkerEvent),
}

pub struct TickDetector {
    fft: FrameFft,
    gate: PulseGate,
    frame_ms: f64,
    tick_count: u64,
    discarded: u64,
}

impl TickDetector {
    pub fn new() -> Self {
        Self {
            fft: FrameFft::new(DETECTOR_FFT_SIZE),
            gate: PulseGate::standard(),
            frame_ms: DETECTOR_FFT_SIZE as f64 * 1000.0 / DETECTOR_RATE,
            tick_count: 0,
            discarded: 0,
        }
    }

    /// Feed one sync-band sample. `ts_ms` is the sample's timestamp.
    pub fn process(&mut self, sample: Complex64, ts_ms: f64) -> TickOutput {
        if !self.fft.push(sample) {
            return TickOutput::None;
        }

        let n = self.fft.size();
        let energy = self.fft.bucket_energy(BUCKET_FIRST, BUCKET_LAST)
            + self.fft.bucket_energy(n - BUCKET_LAST, n - BUCKET_FIRST);

        let pulse = match self.gate.on_frame(energy, ts_ms, self.frame_ms) {
            Some(p) => p,
            None => return TickOutput::None,
        };

        if (TICK_MIN_MS..=TICK_MAX_MS).contains(&pulse.duration_ms) {
            if pulse.snr_db < TICK_MIN_SNR_DB {
                self.discarded += 1;
                return TickOutput::None;
            }
            self.tick_count += 1;
            TickOutput::Tick(TickEvent {
                tick_number: self.tick_count,
                timestamp_ms: pulse.start_ms,
                duration_ms: pulse.duration_ms,
                peak_energy: pulse.peak_energy,
                noise_floor: pulse.noise_floor,
                snr_db: pulse.snr_db,
            })
        } else if (MARKER_MIN_MS..=MARKER_MAX_MS).contains(&pulse.duration_ms) {
            TickOutput::TickMarker(TickMarkerEvent {
                timestamp_ms: pulse.start_ms,
                duration_ms: pulse.duration_ms,
                // Filled in by the tick correlator.
                corr_ratio: 0.0,
            })
        } else {
            self.discarded += 1;
            TickOutput::None
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn reset(&mut self) {
        self.fft.reset();
        self.gate.reset();
    }
}

impl Default for TickDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    /// Feed `ms` milliseconds of signal: noise amplitude plus an optional
    /// 1000 Hz tone at `tone_amp`.
    fn feed(det: &mut TickDetector, ms: f64, tone_amp: f64, start_sample: &mut u64) -> Vec<TickOutput> {
        let n = (ms * DETECTOR_RATE / 1000.0) as u64;
        let mut out = Vec::new();
        for _ in 0..n {
            let i = *start_sample;
            let t = i as f64 / DETECTOR_RATE;
            let phase = TAU * 1000.0 * t;
            // Small deterministic jitter keeps the noise floor non-zero.
            let noise = 0.01 * ((i % 37) as f64 / 37.0 - 0.5);
            let s = Complex64::new(tone_amp * phase.cos() + noise, tone_amp * phase.sin());
            let ts = i as f64 * 1000.0 / DETECTOR_RATE;
            let ev = det.process(s, ts);
            if ev != TickOutput::None {
                out.push(ev);
            }
            *start_sample += 1;
        }
        out
    }

    #[test]
    fn silence_emits_nothing() {
        let mut det = TickDetector::new();
        let mut n = 0;
        let out = feed(&mut det, 2000.0, 0.0, &mut n);
        assert!(out.is_empty());
        assert_eq!(det.tick_count(), 0);
    }

    #[test]
    fn five_ms_burst_yields_one_tick() {
        let mut det = TickDetector::new();
        let mut n = 0;
        // Settle the noise floor first.
        feed(&mut det, 1000.0, 0.0, &mut n);
        let mut events = feed(&mut det, 5.12, 1.0, &mut n);
        events.extend(feed(&mut det, 500.0, 0.0, &mut n));

        let ticks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TickOutput::Tick(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 1);
        assert!(ticks[0].duration_ms >= 4.0 && ticks[0].duration_ms <= 11.0);
        assert!(ticks[0].snr_db > 9.0);
    }

    #[test]
    fn eight_hundred_ms_burst_yields_marker_candidate() {
        let mut det = TickDetector::new();
        let mut n = 0;
        feed(&mut det, 1000.0, 0.0, &mut n);
        let mut events = feed(&mut det, 800.0, 1.0, &mut n);
        events.extend(feed(&mut det, 500.0, 0.0, &mut n));

        let markers: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TickOutput::TickMarker(m) => Some(*m),
                _ => None,
            })
            .collect();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].duration_ms >= 500.0 && markers[0].duration_ms <= 900.0);
    }

    #[test]
    fn widths_outside_both_windows_are_discarded() {
        let mut det = TickDetector::new();
        let mut n = 0;
        feed(&mut det, 1000.0, 0.0, &mut n);
        // ~200 ms burst: too long for a tick, too short for a marker.
        let mut events = feed(&mut det, 200.0, 1.0, &mut n);
        events.extend(feed(&mut det, 500.0, 0.0, &mut n));
        assert!(events.is_empty());
        assert_eq!(det.discarded(), 1);
    }

    #[test]
    fn width_window_is_enforced_on_the_measured_frames() {
        // Frame-aligned feeds so the widths are exact frame multiples:
        // 9 frames (46.08 ms) sits inside the [2, 50] ms tick window,
        // 11 frames (56.32 ms) falls outside both windows.
        let mut det = TickDetector::new();
        let mut n = 0;
        feed(&mut det, 1003.52, 0.0, &mut n);

        let mut events = feed(&mut det, 46.08, 1.0, &mut n);
        events.extend(feed(&mut det, 957.44, 0.0, &mut n));
        let ticks = events
            .iter()
            .filter(|e| matches!(e, TickOutput::Tick(_)))
            .count();
        assert_eq!(ticks, 1);

        let mut more = feed(&mut det, 56.32, 1.0, &mut n);
        more.extend(feed(&mut det, 501.76, 0.0, &mut n));
        assert!(more.iter().all(|e| !matches!(e, TickOutput::Tick(_))));
        assert_eq!(det.discarded(), 1);
    }

    #[test]
    fn tick_numbers_are_strictly_increasing() {
        let mut det = TickDetector::new();
        let mut n = 0;
        feed(&mut det, 1000.0, 0.0, &mut n);
        let mut nums = Vec::new();
        for _ in 0..5 {
            let events = feed(&mut det, 5.12, 1.0, &mut n);
            for e in &events {
                if let TickOutput::Tick(t) = e {
                    nums.push(t.tick_number);
                }
            }
            let more = feed(&mut det, 994.88, 0.0, &mut n);
            for e in &more {
                if let TickOutput::Tick(t) = e {
                    nums.push(t.tick_number);
                }
            }
        }
        assert!(!nums.is_empty());
        assert!(nums.windows(2).all(|w| w[1] > w[0]));
    }
}
