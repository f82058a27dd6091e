//! Frame FFT plumbing shared by the 50 kHz detectors.
//!
//! The tick, marker and BCD-time detectors all look at the spectrum of
//! consecutive 256-sample frames. This wrapper owns the plan, the sample
//! accumulator and the scratch buffer; each completed frame hands bucket
//! energies back to the owner through the return value.

use num_complex::Complex64;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::sync::Arc;

/// Accumulates complex samples and runs a forward FFT per full frame.
pub struct FrameFft {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    pending: Vec<Complex32>,
    scratch: Vec<Complex32>,
    /// Per-bin energy (|X[k]|^2) of the most recent completed frame.
    energies: Vec<f64>,
}

impl FrameFft {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            fft,
            size,
            pending: Vec::with_capacity(size),
            scratch: vec![Complex32::new(0.0, 0.0); size],
            energies: vec![0.0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Push one sample. Returns `true` when a frame just completed and
    /// `energies()` holds fresh values.
    ///
    /// Non-finite inputs are coerced to zero so a corrupt sample cannot
    /// poison the frame; bad samples never propagate as errors.
    #[inline]
    pub fn push(&mut self, sample: Complex64) -> bool {
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
        self.pending.push(Complex32::new(re, im));

        if self.pending.len() < self.size {
            return false;
        }

        self.scratch.copy_from_slice(&self.pending);
        self.pending.clear();
        self.fft.process(&mut self.scratch);

        for (e, c) in self.energies.iter_mut().zip(self.scratch.iter()) {
            let v = c.norm_sqr() as f64;
            *e = if v.is_finite() { v } else { 0.0 };
        }
        true
    }

    /// Bin energies of the last completed frame.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Sum of energies over an inclusive bin range.
    pub fn bucket_energy(&self, first_bin: usize, last_bin: usize) -> f64 {
        let last = last_bin.min(self.size - 1);
        self.energies[first_bin..=last].iter().sum()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.energies.iter_mut().for_each(|e| *e = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn frame_completes_every_size_samples() {
        let mut fft = FrameFft::new(256);
        let mut completions = 0;
        for i in 0..1024 {
            if fft.push(Complex64::new(i as f64 * 1e-3, 0.0)) {
                completions += 1;
            }
        }
        assert_eq!(completions, 4);
    }

    #[test]
    fn tone_lands_in_expected_bucket() {
        // 1000 Hz at 50 kHz with 256 bins: bin width 195.3 Hz, bin 5
        let mut fft = FrameFft::new(256);
        let mut done = false;
        for i in 0..256 {
            let t = i as f64 / 50_000.0;
            let phase = TAU * 1000.0 * t;
            done = fft.push(Complex64::new(phase.cos(), phase.sin()));
        }
        assert!(done);

        let bucket = fft.bucket_energy(5, 6);
        let total: f64 = fft.energies().iter().sum();
        assert!(
            bucket > 0.5 * total,
            "bucket {bucket} vs total {total}: tone not concentrated"
        );
    }

    #[test]
    fn non_finite_samples_do_not_poison_the_frame() {
        let mut fft = FrameFft::new(256);
        for i in 0..256 {
            let s = if i % 7 == 0 {
                Complex64::new(f64::NAN, f64::INFINITY)
            } else {
                Complex64::new(0.1, 0.0)
            };
            fft.push(s);
        }
        assert!(fft.energies().iter().all(|e| e.is_finite()));
    }
}
