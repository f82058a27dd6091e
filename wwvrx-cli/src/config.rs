//! CLI configuration: TOML file plus command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use wwvrx_core::PipelineConfig;

/// Input sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// 2-channel WAV, I in channel 0 and Q in channel 1.
    #[default]
    Wav,
    /// Interleaved little-endian f32 I/Q pairs.
    F32le,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Input file; `-` reads raw samples from stdin.
    pub input: Option<PathBuf>,
    pub format: InputFormat,
    /// Rate of the input stream. Must be an integer multiple of the
    /// 50 kHz detector rate; the wrapper boxcar-decimates down.
    pub input_rate: u32,
    pub output_dir: PathBuf,
    pub enable_tick: bool,
    pub enable_marker: bool,
    pub enable_sync: bool,
    pub enable_tone: bool,
    pub enable_correlators: bool,
    pub enable_slow_marker: bool,
    pub lock_timeout_enabled: bool,
    pub lock_timeout_sec: f64,
    pub csv: bool,
    pub telemetry_addr: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            input: None,
            format: InputFormat::default(),
            input_rate: 50_000,
            output_dir: PathBuf::from("."),
            enable_tick: true,
            enable_marker: true,
            enable_sync: true,
            enable_tone: true,
            enable_correlators: true,
            enable_slow_marker: true,
            lock_timeout_enabled: false,
            lock_timeout_sec: 180.0,
            csv: false,
            telemetry_addr: None,
        }
    }
}

impl CliConfig {
    pub fn from_file(path: &Path) -> color_eyre::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output_dir.clone(),
            enable_tick: self.enable_tick,
            enable_marker: self.enable_marker,
            enable_sync: self.enable_sync,
            enable_tone: self.enable_tone,
            enable_correlators: self.enable_correlators,
            enable_slow_marker: self.enable_slow_marker,
            lock_timeout_enabled: self.lock_timeout_enabled,
            lock_timeout_sec: self.lock_timeout_sec,
            enable_csv: self.csv,
            telemetry_addr: self.telemetry_addr.clone(),
        }
    }

    pub fn decimation(&self) -> color_eyre::Result<u32> {
        if self.input_rate == 0 || self.input_rate % 50_000 != 0 {
            color_eyre::eyre::bail!(
                "input rate {} is not a multiple of the 50 kHz detector rate",
                self.input_rate
            );
        }
        Ok(self.input_rate / 50_000)
    }
}
