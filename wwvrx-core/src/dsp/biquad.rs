//! Biquad IIR sections and the fixed channel-splitting filters.
//!
//! The channel filters split the 50 kHz detector stream into a sync band
//! (800-1400 Hz, where the tick and marker tones live) and a data band
//! (below 150 Hz, where the 100 Hz BCD subcarrier lives). Both are
//! two-section cascades with coefficients fixed at construction; the
//! per-sample path is pure arithmetic on value-type state.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::errors::DspError;

/// One direct-form-I biquad section.
///
/// Coefficients are normalized (a0 = 1). State is the usual
/// {x1, x2, y1, y2} delay line, mutated only by `process`.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Butterworth low-pass section (RBJ cookbook, Q = 1/sqrt(2)).
    pub fn lowpass(corner_hz: f64, sample_rate: f64) -> Self {
        Self::from_rbj(corner_hz, sample_rate, false)
    }

    /// Butterworth high-pass section (RBJ cookbook, Q = 1/sqrt(2)).
    pub fn highpass(corner_hz: f64, sample_rate: f64) -> Self {
        Self::from_rbj(corner_hz, sample_rate, true)
    }

    fn from_rbj(corner_hz: f64, sample_rate: f64, highpass: bool) -> Self {
        let w0 = 2.0 * PI * corner_hz / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / std::f64::consts::SQRT_2;

        let a0 = 1.0 + alpha;
        let (b0, b1, b2) = if highpass {
            let k = (1.0 + cos_w0) / 2.0;
            (k, -(1.0 + cos_w0), k)
        } else {
            let k = (1.0 - cos_w0) / 2.0;
            (k, 1.0 - cos_w0, k)
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Process one sample through the section.
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Clear the delay line, keeping coefficients.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// A fixed cascade of two biquad sections.
#[derive(Debug, Clone, Copy)]
pub struct BiquadCascade {
    sections: [Biquad; 2],
}

impl BiquadCascade {
    pub fn new(first: Biquad, second: Biquad) -> Self {
        Self {
            sections: [first, second],
        }
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let mid = self.sections[0].process(x);
        self.sections[1].process(mid)
    }

    pub fn reset(&mut self) {
        for s in &mut self.sections {
            s.reset();
        }
    }
}

/// Which band a channel filter extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBand {
    /// 800 Hz high-pass then 1400 Hz low-pass: the tick/marker tones.
    Sync,
    /// 150 Hz low-pass (two sections): the BCD subcarrier region.
    Data,
}

/// One channel filter: identical cascades on I and Q.
#[derive(Debug, Clone, Copy)]
pub struct ChannelFilter {
    i: BiquadCascade,
    q: BiquadCascade,
}

impl ChannelFilter {
    /// Build a channel filter for the given band at `sample_rate` Hz.
    /// The band's highest corner must sit below Nyquist.
    pub fn new(band: ChannelBand, sample_rate: f64) -> Result<Self, DspError> {
        let top_corner = match band {
            ChannelBand::Sync => 1400.0,
            ChannelBand::Data => 150.0,
        };
        if sample_rate <= 0.0 || top_corner >= sample_rate / 2.0 {
            return Err(DspError::FilterAboveNyquist {
                corner_hz: top_corner,
                sample_rate,
            });
        }

        let cascade = match band {
            ChannelBand::Sync => BiquadCascade::new(
                Biquad::highpass(800.0, sample_rate),
                Biquad::lowpass(1400.0, sample_rate),
            ),
            ChannelBand::Data => BiquadCascade::new(
                Biquad::lowpass(150.0, sample_rate),
                Biquad::lowpass(150.0, sample_rate),
            ),
        };
        Ok(Self {
            i: cascade,
            q: cascade,
        })
    }

    /// Filter one complex sample. Strict streaming, no buffering.
    #[inline]
    pub fn process(&mut self, sample: Complex64) -> Complex64 {
        Complex64::new(self.i.process(sample.re), self.q.process(sample.im))
    }

    pub fn reset(&mut self) {
        self.i.reset();
        self.q.reset();
    }
}
