//! Configuration types for the wwvrx pipeline.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sample rate of the detector path in Hz.
pub const DETECTOR_RATE: f64 = 50_000.0;

/// Sample rate of the display path in Hz.
pub const DISPLAY_RATE: f64 = 12_000.0;

/// Frame size of the 50 kHz detector FFTs (5.12 ms frames).
pub const DETECTOR_FFT_SIZE: usize = 256;

/// FFT size of the externally produced display FFT.
pub const DISPLAY_FFT_SIZE: usize = 1024;

/// FFT size of the tone trackers.
pub const TONE_FFT_SIZE: usize = 4096;

/// Top-level pipeline configuration.
///
/// Every detector group can be disabled independently; the orchestrator
/// simply does not instantiate a disabled component and drops the events
/// that would have fed it. All flags default to enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for CSV logs. Sinks that cannot open their file
    /// downgrade to no-log rather than failing construction.
    pub output_dir: PathBuf,
    pub enable_tick: bool,
    pub enable_marker: bool,
    pub enable_sync: bool,
    pub enable_tone: bool,
    pub enable_correlators: bool,
    pub enable_slow_marker: bool,
    /// Optional stale-lock degradation: drop LOCKED to TENTATIVE when no
    /// marker has been confirmed for `lock_timeout_sec`. Off by default;
    /// the baseline behavior never demotes on signal loss alone.
    pub lock_timeout_enabled: bool,
    pub lock_timeout_sec: f64,
    /// Write per-component CSV logs under `output_dir`.
    pub enable_csv: bool,
    /// Broadcast event records over UDP (fire-and-forget).
    pub telemetry_addr: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            enable_tick: true,
            enable_marker: true,
            enable_sync: true,
            enable_tone: true,
            enable_correlators: true,
            enable_slow_marker: true,
            lock_timeout_enabled: false,
            lock_timeout_sec: 180.0,
            enable_csv: false,
            telemetry_addr: None,
        }
    }
}

impl PipelineConfig {
    /// Validate cross-field constraints that cannot be expressed by types.
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        use crate::errors::ConfigError;
        if !(self.enable_tick || self.enable_marker || self.enable_tone) {
            return Err(ConfigError::NothingEnabled);
        }
        if self.lock_timeout_enabled && self.lock_timeout_sec <= 0.0 {
            return Err(ConfigError::InvalidLockTimeout {
                seconds: self.lock_timeout_sec,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_everything() {
        let cfg = PipelineConfig::default();
        assert!(cfg.enable_tick && cfg.enable_marker && cfg.enable_sync);
        assert!(cfg.enable_tone && cfg.enable_correlators && cfg.enable_slow_marker);
        assert!(!cfg.lock_timeout_enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn all_detectors_off_is_rejected() {
        let cfg = PipelineConfig {
            enable_tick: false,
            enable_marker: false,
            enable_tone: false,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
