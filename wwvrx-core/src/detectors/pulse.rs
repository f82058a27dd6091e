//! Adaptive-threshold pulse gating shared by the frame-FFT detectors.
//!
//! The tick detector and the BCD time detector run the same per-frame
//! machine: track a noise floor while idle, open a pulse when the bucket
//! energy crosses floor x entry factor, close it on the hysteresis exit or
//! the hard duration cap, then let the owner classify the finished pulse
//! by width.

/// A finished pulse, ready for width classification by the owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    /// Timestamp of the first above-threshold frame.
    pub start_ms: f64,
    pub duration_ms: f64,
    pub peak_energy: f64,
    pub energy_sum: f64,
    /// Noise floor at pulse open (frozen for the pulse lifetime).
    pub noise_floor: f64,
    pub snr_db: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GateState {
    Idle,
    Pulse {
        start_ms: f64,
        frames: u32,
        energy_sum: f64,
        peak: f64,
    },
}

/// Per-frame pulse gate with adaptive noise floor.
#[derive(Debug, Clone, Copy)]
pub struct PulseGate {
    noise_floor: f64,
    seeded: bool,
    /// First-order adaptation rate of the floor while idle.
    adapt: f64,
    /// Entry threshold = floor x entry_factor.
    entry_factor: f64,
    /// Exit threshold = hysteresis x entry threshold.
    hysteresis: f64,
    max_duration_ms: f64,
    state: GateState,
}

impl PulseGate {
    pub fn new(adapt: f64, entry_factor: f64, hysteresis: f64, max_duration_ms: f64) -> Self {
        Self {
            noise_floor: 0.0,
            seeded: false,
            adapt,
            entry_factor,
            hysteresis,
            max_duration_ms,
            state: GateState::Idle,
        }
    }

    /// Standard gate used by the tick and BCD-time detectors: 2x entry,
    /// 0.7x hysteresis, 1000 ms pulse cap.
    pub fn standard() -> Self {
        Self::new(0.02, 2.0, 0.7, 1000.0)
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    pub fn in_pulse(&self) -> bool {
        matches!(self.state, GateState::Pulse { .. })
    }

    /// Feed one frame's bucket energy. Returns a finished pulse when the
    /// gate closes on this frame.
    ///
    /// `frame_ms` is the frame period (5.12 ms for the 256-point FFTs).
    pub fn on_frame(&mut self, energy: f64, ts_ms: f64, frame_ms: f64) -> Option<Pulse> {
        let energy = if energy.is_finite() { energy } else { 0.0 };

        // The first frame only seeds the floor; detecting against a zero
        // floor would fire on any energy at all.
        if !self.seeded {
            self.noise_floor = energy;
            self.seeded = true;
            return None;
        }

        let threshold = self.noise_floor * self.entry_factor;

        match self.state {
            GateState::Idle => {
                if self.noise_floor > 0.0 && energy > threshold {
                    self.state = GateState::Pulse {
                        start_ms: ts_ms,
                        frames: 1,
                        energy_sum: energy,
                        peak: energy,
                    };
                } else {
                    // Floor adapts only while idle; a pulse must not pull
                    // its own threshold up.
                    self.noise_floor += self.adapt * (energy - self.noise_floor);
                }
                None
            }
            GateState::Pulse {
                start_ms,
                frames,
                energy_sum,
                peak,
            } => {
                let duration = frames as f64 * frame_ms;
                let below_exit = energy < self.hysteresis * threshold;
                if below_exit || duration > self.max_duration_ms {
                    self.state = GateState::Idle;
                    let noise = self.noise_floor;
                    return Some(Pulse {
                        start_ms,
                        duration_ms: duration,
                        peak_energy: peak,
                        energy_sum,
                        noise_floor: noise,
                        snr_db: crate::dsp::power_db(peak.sqrt(), noise.sqrt()),
                    });
                }
                self.state = GateState::Pulse {
                    start_ms,
                    frames: frames + 1,
                    energy_sum: energy_sum + energy,
                    peak: peak.max(energy),
                };
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.noise_floor = 0.0;
        self.seeded = false;
        self.state = GateState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: f64 = 5.12;

    fn run(gate: &mut PulseGate, energies: &[f64]) -> Vec<Pulse> {
        let mut out = Vec::new();
        for (i, &e) in energies.iter().enumerate() {
            if let Some(p) = gate.on_frame(e, i as f64 * FRAME_MS, FRAME_MS) {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn quiet_input_never_opens_a_pulse() {
        let mut gate = PulseGate::standard();
        let pulses = run(&mut gate, &vec![1.0; 500]);
        assert!(pulses.is_empty());
        assert!((gate.noise_floor() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn burst_yields_one_pulse_with_width_in_frames() {
        let mut gate = PulseGate::standard();
        let mut energies = vec![1.0; 100];
        energies.extend(vec![10.0; 3]);
        energies.extend(vec![1.0; 100]);

        let pulses = run(&mut gate, &energies);
        assert_eq!(pulses.len(), 1);
        let p = &pulses[0];
        assert!((p.duration_ms - 3.0 * FRAME_MS).abs() < 1e-9);
        assert!(p.peak_energy >= 10.0);
        assert!(p.snr_db > 9.0);
    }

    #[test]
    fn floor_freezes_during_pulse() {
        let mut gate = PulseGate::standard();
        run(&mut gate, &vec![1.0; 100]);
        let floor_before = gate.noise_floor();
        run(&mut gate, &vec![50.0; 20]);
        assert_eq!(gate.noise_floor(), floor_before);
    }

    #[test]
    fn overlong_pulse_is_force_closed() {
        let mut gate = PulseGate::standard();
        let mut energies = vec![1.0; 100];
        energies.extend(vec![10.0; 400]); // > 1000 ms of frames
        let pulses = run(&mut gate, &energies);
        assert!(!pulses.is_empty());
        assert!(pulses[0].duration_ms > 1000.0);
        assert!(pulses[0].duration_ms < 1010.0);
    }

    #[test]
    fn non_finite_energy_is_treated_as_zero() {
        let mut gate = PulseGate::standard();
        let pulses = run(&mut gate, &[1.0, 1.0, f64::NAN, f64::INFINITY, 1.0]);
        assert!(pulses.is_empty());
        assert!(gate.noise_floor().is_finite());
    }
}
