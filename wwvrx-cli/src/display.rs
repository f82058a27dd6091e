//! Display-path plumbing the core treats as external: the 50 kHz to
//! 12 kHz fractional decimator and the windowed display FFT whose frames
//! feed the slow marker detector.

use num_complex::Complex64;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::sync::Arc;

use wwvrx_core::config::{DISPLAY_FFT_SIZE, DISPLAY_RATE};
use wwvrx_core::DetectorPipeline;

/// Fractional 50 kHz -> 12 kHz decimator (ratio 25/6) with a boxcar over
/// the samples spanned by each output step, plus the overlapped display
/// FFT. Crude next to an SDR's polyphase stages, but it only exists to
/// drive the two display-path entry points.
pub struct DisplayPath {
    phase: f64,
    step: f64,
    acc: Complex64,
    acc_count: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
    bins: Vec<f64>,
    display_samples: u64,
}

impl DisplayPath {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let window: Vec<f32> = (0..DISPLAY_FFT_SIZE)
            .map(|i| {
                let x = std::f32::consts::TAU * i as f32 / (DISPLAY_FFT_SIZE - 1) as f32;
                0.5 * (1.0 - x.cos())
            })
            .collect();
        Self {
            phase: 0.0,
            step: DISPLAY_RATE / 50_000.0,
            acc: Complex64::new(0.0, 0.0),
            acc_count: 0,
            fft: planner.plan_fft_forward(DISPLAY_FFT_SIZE),
            window,
            buffer: Vec::with_capacity(DISPLAY_FFT_SIZE),
            bins: vec![0.0; DISPLAY_FFT_SIZE],
            display_samples: 0,
        }
    }

    /// Feed one 50 kHz sample; forwards decimated samples and completed
    /// FFT frames into the pipeline.
    pub fn push(&mut self, i: f64, q: f64, pipeline: &mut DetectorPipeline) {
        self.acc += Complex64::new(i, q);
        self.acc_count += 1;
        self.phase += self.step;
        if self.phase < 1.0 {
            return;
        }
        self.phase -= 1.0;

        let sample = self.acc / self.acc_count as f64;
        self.acc = Complex64::new(0.0, 0.0);
        self.acc_count = 0;

        pipeline.process_display_sample(sample.re, sample.im);
        let ts_ms = self.display_samples as f64 * 1000.0 / DISPLAY_RATE;
        self.display_samples += 1;

        self.buffer
            .push(Complex32::new(sample.re as f32, sample.im as f32));
        if self.buffer.len() < DISPLAY_FFT_SIZE {
            return;
        }

        let mut scratch: Vec<Complex32> = self
            .buffer
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex32::new(s.re * w, s.im * w))
            .collect();
        self.fft.process(&mut scratch);
        for (b, c) in self.bins.iter_mut().zip(scratch.iter()) {
            *b = c.norm_sqr() as f64;
        }
        pipeline.process_display_fft(&self.bins, ts_ms);

        // 50% overlap: keep the back half.
        self.buffer.drain(..DISPLAY_FFT_SIZE / 2);
    }
}

impl Default for DisplayPath {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wwvrx_core::PipelineConfig;

    #[test]
    fn decimator_produces_twelve_kilohertz() {
        let mut pipeline = DetectorPipeline::new(PipelineConfig::default()).unwrap();
        let mut display = DisplayPath::new();
        for _ in 0..50_000 {
            display.push(0.0, 0.0, &mut pipeline);
        }
        let out = pipeline.statistics().display_samples;
        assert!((11_900..=12_100).contains(&(out as u32)), "rate {out}");
    }
}
