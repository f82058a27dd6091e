//! Narrowband 100 Hz subcarrier detector on the data channel.
//!
//! Works on the data-band filtered signal (150 Hz low-pass channel
//! filter) and tracks the subcarrier envelope directly instead of going
//! through an FFT. The detection baseline combines the detector's own
//! envelope floor with the process-wide subcarrier noise floor written by
//! the active tone tracker.

use atomic_float::AtomicF64;
use num_complex::Complex64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::DETECTOR_RATE;
use crate::dsp::EnvelopeFollower;
use crate::events::{BcdEvent, BcdSource};

/// Minimum envelope hold before a pulse is reported.
const MIN_HOLD_MS: f64 = 100.0;

/// Maximum credible pulse width; the gate force-closes past this.
const MAX_HOLD_MS: f64 = 1000.0;

const ENTRY_FACTOR: f64 = 2.0;
const HYSTERESIS: f64 = 0.7;

pub struct BcdFreqDetector {
    envelope: EnvelopeFollower,
    own_floor: f64,
    floor_seeded: bool,
    shared_floor: Option<Arc<AtomicF64>>,
    pulse_start_ms: Option<f64>,
    accumulated_energy: f64,
    peak_envelope: f64,
    sample_period_ms: f64,
    event_count: u64,
}

impl BcdFreqDetector {
    pub fn new() -> Self {
        Self {
            envelope: EnvelopeFollower::new(5.0, 10.0, DETECTOR_RATE),
            own_floor: 0.0,
            floor_seeded: false,
            shared_floor: None,
            pulse_start_ms: None,
            accumulated_energy: 0.0,
            peak_envelope: 0.0,
            sample_period_ms: 1000.0 / DETECTOR_RATE,
            event_count: 0,
        }
    }

    /// Attach the shared subcarrier noise floor maintained by the tone
    /// trackers; it raises the baseline when the band is noisy.
    pub fn set_shared_floor(&mut self, floor: Arc<AtomicF64>) {
        self.shared_floor = Some(floor);
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    fn baseline(&self) -> f64 {
        let shared = self
            .shared_floor
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(0.0);
        self.own_floor.max(shared)
    }

    /// Feed one data-band sample.
    pub fn process(&mut self, sample: Complex64, ts_ms: f64) -> Option<BcdEvent> {
        let env = self.envelope.process(sample);

        if !self.floor_seeded {
            self.own_floor = env;
            self.floor_seeded = true;
            return None;
        }

        let baseline = self.baseline();
        let threshold = baseline * ENTRY_FACTOR;

        match self.pulse_start_ms {
            None => {
                if baseline > 0.0 && env > threshold {
                    self.pulse_start_ms = Some(ts_ms);
                    self.accumulated_energy = env * env;
                    self.peak_envelope = env;
                } else {
                    self.own_floor += 1e-4 * (env - self.own_floor);
                }
                None
            }
            Some(start) => {
                let held = ts_ms - start;
                if env < HYSTERESIS * threshold || held > MAX_HOLD_MS {
                    self.pulse_start_ms = None;
                    if held < MIN_HOLD_MS || held > MAX_HOLD_MS {
                        return None;
                    }
                    self.event_count += 1;
                    let snr_db = crate::dsp::power_db(self.peak_envelope, self.own_floor);
                    return Some(BcdEvent {
                        source: BcdSource::Freq,
                        timestamp_ms: start,
                        duration_ms: held,
                        // The window correlator weighs FREQ events by
                        // their accumulated energy.
                        energy: self.accumulated_energy,
                        snr_db,
                    });
                }
                self.accumulated_energy += env * env;
                self.peak_envelope = self.peak_envelope.max(env);
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.envelope.reset();
        self.own_floor = 0.0;
        self.floor_seeded = false;
        self.pulse_start_ms = None;
    }
}

impl Default for BcdFreqDetector {
    fn default() -> Self {
        Self::new()
    }
}
