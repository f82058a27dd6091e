//! Window functions and spectral peak interpolation.

/// Generate a 4-term Blackman-Harris window of length `n`.
///
/// Used by the tone trackers before their 4096-point FFT: the -92 dB
/// sidelobes keep the 500/600 Hz reference tones from leaking into the
/// noise-floor estimation bins.
pub fn blackman_harris(n: usize) -> Vec<f64> {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;

    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }

    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let x = std::f64::consts::TAU * i as f64 / denom;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()
        })
        .collect()
}

/// Parabolic interpolation of a spectral peak.
///
/// Given magnitudes at `peak_idx - 1`, `peak_idx`, `peak_idx + 1`, returns
/// the sub-bin peak position as `peak_idx + p` with `|p| <= 1`. At the
/// array edges no interpolation is possible and the integer index is
/// returned. When the curvature denominator collapses below 1e-10 the
/// integer bin wins the tie.
pub fn parabolic_peak(mags: &[f64], peak_idx: usize) -> f64 {
    if peak_idx == 0 || peak_idx + 1 >= mags.len() {
        return peak_idx as f64;
    }

    let alpha = mags[peak_idx - 1];
    let beta = mags[peak_idx];
    let gamma = mags[peak_idx + 1];

    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < 1e-10 {
        return peak_idx as f64;
    }

    let p = 0.5 * (alpha - gamma) / denom;
    // The vertex of a parabola through three adjacent bins cannot fall
    // outside them; clamp against pathological (non-peak) inputs.
    peak_idx as f64 + p.clamp(-1.0, 1.0)
}

/// Power ratio to decibels with a floor guard.
pub fn power_db(signal: f64, noise: f64) -> f64 {
    20.0 * (signal / (noise + 1e-10)).max(1e-12).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn blackman_harris_is_symmetric_and_bounded() {
        let w = blackman_harris(64);
        assert_eq!(w.len(), 64);
        for i in 0..32 {
            assert_relative_eq!(w[i], w[63 - i], epsilon = 1e-12);
        }
        for &v in &w {
            assert!(v >= -1e-6 && v <= 1.0);
        }
        // Endpoints are near zero for a 4-term BH window
        assert!(w[0] < 1e-4);
    }

    #[test]
    fn parabolic_peak_recovers_known_offset() {
        // Sample a parabola y = 1 - (x - 0.3)^2 at x = -1, 0, 1
        let mags = [
            1.0 - (-1.0_f64 - 0.3).powi(2),
            1.0 - (0.0_f64 - 0.3).powi(2),
            1.0 - (1.0_f64 - 0.3).powi(2),
        ];
        let p = parabolic_peak(&mags, 1);
        assert_relative_eq!(p, 1.3, epsilon = 1e-9);
    }

    #[test]
    fn parabolic_peak_offset_bounded_by_one() {
        // Even for a lopsided (non-parabolic) peak the offset stays in [-1, 1]
        let mags = [0.0, 1.0, 0.999_999];
        let p = parabolic_peak(&mags, 1);
        assert!((p - 1.0).abs() <= 1.0);
    }

    #[test]
    fn parabolic_peak_edge_returns_edge_index() {
        let mags = [3.0, 2.0, 1.0];
        assert_eq!(parabolic_peak(&mags, 0), 0.0);
        assert_eq!(parabolic_peak(&mags, 2), 2.0);
    }

    #[test]
    fn parabolic_peak_flat_top_ties_to_integer_bin() {
        let mags = [1.0, 1.0, 1.0];
        assert_eq!(parabolic_peak(&mags, 1), 1.0);
    }
}
