//! Reference-tone trackers on the 12 kHz display path.
//!
//! Each instance watches one nominal frequency: 500 Hz, 600 Hz, or 0 Hz
//! (the residual carrier at DC). A Blackman-Harris windowed 4096-point
//! FFT over the latest display samples gives 2.93 Hz bins; parabolic
//! interpolation around the USB and LSB peaks refines the estimate well
//! below a bin. The measured offset, scaled to ppm, characterizes the
//! receiver LO error against the station's cesium-derived tones.

use atomic_float::AtomicF64;
use num_complex::Complex64;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::{DISPLAY_RATE, TONE_FFT_SIZE};
use crate::dsp::{blackman_harris, parabolic_peak};
use crate::errors::DspError;
use crate::events::ToneMeasurement;

/// Peak search half-width around the expected bin.
const SEARCH_BINS: i64 = 10;

/// Noise estimation region (both spectrum halves).
const NOISE_FIRST_BIN: usize = 50;
const NOISE_LAST_BIN: usize = 150;

/// Validity gate.
const MIN_SNR_DB: f64 = 10.0;

/// Adaptation rate of the shared subcarrier noise floor.
const SHARED_FLOOR_ADAPT: f64 = 0.1;

/// Samples between measurements (one measurement per quarter buffer).
const MEASURE_INTERVAL: usize = TONE_FFT_SIZE / 4;

pub struct ToneTracker {
    nominal_hz: f64,
    bin_width: f64,
    ring: Vec<Complex32>,
    ring_pos: usize,
    total_samples: u64,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    mags: Vec<f64>,
    noise_floor: f64,
    shared_floor: Option<Arc<AtomicF64>>,
    last_ts_ms: f64,
    valid_count: u64,
    invalid_count: u64,
}

impl ToneTracker {
    /// `nominal_hz` of 0 builds the DC (carrier) tracker. The nominal
    /// must leave room for the peak search below the display Nyquist.
    pub fn new(nominal_hz: f64) -> Result<Self, DspError> {
        let search_margin = SEARCH_BINS as f64 * DISPLAY_RATE / TONE_FFT_SIZE as f64;
        if !nominal_hz.is_finite()
            || nominal_hz < 0.0
            || nominal_hz + search_margin >= DISPLAY_RATE / 2.0
        {
            return Err(DspError::ToneOutOfBand { nominal_hz });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            nominal_hz,
            bin_width: DISPLAY_RATE / TONE_FFT_SIZE as f64,
            ring: vec![Complex32::new(0.0, 0.0); TONE_FFT_SIZE],
            ring_pos: 0,
            total_samples: 0,
            window: blackman_harris(TONE_FFT_SIZE),
            fft: planner.plan_fft_forward(TONE_FFT_SIZE),
            scratch: vec![Complex32::new(0.0, 0.0); TONE_FFT_SIZE],
            mags: vec![0.0; TONE_FFT_SIZE],
            noise_floor: 0.0,
            shared_floor: None,
            last_ts_ms: 0.0,
            valid_count: 0,
            invalid_count: 0,
        })
    }

    /// Attach the process-wide subcarrier noise floor. The tracker
    /// slow-adapts it whenever it produces a valid measurement.
    pub fn set_shared_floor(&mut self, floor: Arc<AtomicF64>) {
        self.shared_floor = Some(floor);
    }

    pub fn nominal_hz(&self) -> f64 {
        self.nominal_hz
    }

    pub fn valid_count(&self) -> u64 {
        self.valid_count
    }

    pub fn invalid_count(&self) -> u64 {
        self.invalid_count
    }

    /// Feed one display-path sample; returns a measurement once per
    /// interval after the buffer has filled.
    pub fn push(&mut self, sample: Complex64, ts_ms: f64) -> Option<ToneMeasurement> {
        self.last_ts_ms = ts_ms;
        let re = if sample.re.is_finite() {
            sample.re as f32
        } else {
            0.0
        };
        let im = if sample.im.is_finite() {
            sample.im as f32
        } else {
            0.0
        };
        self.ring[self.ring_pos] = Complex32::new(re, im);
        self.ring_pos = (self.ring_pos + 1) % TONE_FFT_SIZE;
        self.total_samples += 1;

        if self.total_samples < TONE_FFT_SIZE as u64
            || self.total_samples % MEASURE_INTERVAL as u64 != 0
        {
            return None;
        }
        Some(self.measure())
    }

    fn measure(&mut self) -> ToneMeasurement {
        let n = TONE_FFT_SIZE;

        // Oldest-first copy with the window applied.
        for i in 0..n {
            let s = self.ring[(self.ring_pos + i) % n];
            let w = self.window[i] as f32;
            self.scratch[i] = Complex32::new(s.re * w, s.im * w);
        }
        self.fft.process(&mut self.scratch);
        for (m, c) in self.mags.iter_mut().zip(self.scratch.iter()) {
            let v = c.norm() as f64;
            *m = if v.is_finite() { v } else { 0.0 };
        }

        let (measured_hz, peak_mag, usb_bin, lsb_bin) = if self.nominal_hz > 0.0 {
            self.measure_tone()
        } else {
            self.measure_dc()
        };

        let noise = self.noise_estimate(usb_bin, lsb_bin);
        let snr_db = 20.0 * (peak_mag / (noise + 1e-10)).max(1e-12).log10();
        let valid = snr_db >= MIN_SNR_DB;

        if valid {
            self.valid_count += 1;
            self.noise_floor = noise;
            if let Some(shared) = &self.shared_floor {
                let prev = shared.load(Ordering::Relaxed);
                shared.store(
                    prev + SHARED_FLOOR_ADAPT * (noise - prev),
                    Ordering::Relaxed,
                );
            }
            let offset_hz = measured_hz - self.nominal_hz;
            let offset_ppm = if self.nominal_hz > 0.0 {
                offset_hz / self.nominal_hz * 1e6
            } else {
                // DC offset is an RF error: ppm against the 10 MHz carrier.
                offset_hz / 10.0
            };
            ToneMeasurement {
                timestamp_ms: self.last_ts_ms,
                nominal_hz: self.nominal_hz,
                measured_hz,
                offset_hz,
                offset_ppm,
                snr_db,
                noise_floor_linear: self.noise_floor,
                valid: true,
            }
        } else {
            self.invalid_count += 1;
            // Zero offset, held noise floor.
            ToneMeasurement {
                timestamp_ms: self.last_ts_ms,
                nominal_hz: self.nominal_hz,
                measured_hz: self.nominal_hz,
                offset_hz: 0.0,
                offset_ppm: 0.0,
                snr_db,
                noise_floor_linear: self.noise_floor,
                valid: false,
            }
        }
    }

    /// USB + LSB sub-bin peak average for a nonzero nominal.
    fn measure_tone(&self) -> (f64, f64, i64, i64) {
        let n = TONE_FFT_SIZE as i64;
        let usb_expected = (self.nominal_hz / self.bin_width).round() as i64;
        let lsb_expected = n - usb_expected;

        let (usb_peak, usb_mag) = self.peak_near(usb_expected);
        let (lsb_peak, lsb_mag) = self.peak_near(lsb_expected);

        let f_usb = usb_peak * self.bin_width;
        let f_lsb = (n as f64 - lsb_peak) * self.bin_width;
        let measured = 0.5 * (f_usb + f_lsb);

        (measured, usb_mag.max(lsb_mag), usb_expected, lsb_expected)
    }

    /// Signed offset around bin 0 for the DC tracker.
    fn measure_dc(&self) -> (f64, f64, i64, i64) {
        let n = TONE_FFT_SIZE as i64;
        // Unwrap bins [-SEARCH..+SEARCH] into a contiguous slice so the
        // parabolic fit can straddle DC.
        let span = (2 * SEARCH_BINS + 1) as usize;
        let mut local = vec![0.0; span];
        for (j, slot) in local.iter_mut().enumerate() {
            let k = j as i64 - SEARCH_BINS;
            *slot = self.mags[k.rem_euclid(n) as usize];
        }

        let peak_j = local
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(j, _)| j)
            .unwrap_or(SEARCH_BINS as usize);

        let pos = parabolic_peak(&local, peak_j);
        let signed_bin = pos - SEARCH_BINS as f64;
        (signed_bin * self.bin_width, local[peak_j], 0, 0)
    }

    /// Magnitude peak and parabolic position within +-SEARCH_BINS of an
    /// expected bin.
    fn peak_near(&self, expected: i64) -> (f64, f64) {
        let n = TONE_FFT_SIZE as i64;
        let lo = (expected - SEARCH_BINS).max(1);
        let hi = (expected + SEARCH_BINS).min(n - 2);

        let mut best = lo;
        for k in lo..=hi {
            if self.mags[k as usize] > self.mags[best as usize] {
                best = k;
            }
        }
        let pos = parabolic_peak(&self.mags, best as usize);
        (pos, self.mags[best as usize])
    }

    /// Mean magnitude over bins 50-150 on both halves, excluding any bin
    /// inside a search window.
    fn noise_estimate(&self, usb_bin: i64, lsb_bin: i64) -> f64 {
        let n = TONE_FFT_SIZE as i64;
        let in_search = |k: i64| -> bool {
            (k - usb_bin).abs() <= SEARCH_BINS
                || (k - lsb_bin).abs() <= SEARCH_BINS
                || (k - n + usb_bin).abs() <= SEARCH_BINS
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        for k in NOISE_FIRST_BIN as i64..=NOISE_LAST_BIN as i64 {
            for half in [k, n - k] {
                if !in_search(half) {
                    sum += self.mags[half as usize];
                    count += 1;
                }
            }
        }
        if count == 0 {
            return self.noise_floor;
        }
        sum / count as f64
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = Complex32::new(0.0, 0.0));
        self.ring_pos = 0;
        self.total_samples = 0;
        self.noise_floor = 0.0;
    }
}
