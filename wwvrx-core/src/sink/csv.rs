//! CSV log files, one per component.
//!
//! Every log starts with two banner lines and a schema line:
//!
//! ```text
//! # <component name> v<version>
//! # Started: 2026-08-01 14:03:22
//! time,timestamp_ms,...
//! ```
//!
//! Records are flushed as they are written so a crash loses nothing.
//! A file that cannot be created downgrades that log to a no-op; logging
//! failure must never take the pipeline down.

use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::EventSink;
use crate::detectors::RxMetadata;
use crate::events::{BcdSymbol, CorrelatedMarker, SyncUpdate, TickEvent, ToneMeasurement};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One CSV log file with the standard banner.
pub struct CsvLog {
    writer: Option<BufWriter<File>>,
}

impl CsvLog {
    /// Open a log under `dir`. On any failure the log silently becomes a
    /// no-op; the `Option` inside tracks that state.
    pub fn create(dir: &Path, file_name: &str, component: &str, schema: &str) -> Self {
        let path = dir.join(file_name);
        let writer = File::create(&path).ok().and_then(|f| {
            let mut w = BufWriter::new(f);
            let started = Local::now().format("%Y-%m-%d %H:%M:%S");
            let header = format!("# {component} v{VERSION}\n# Started: {started}\n{schema}\n");
            w.write_all(header.as_bytes()).ok()?;
            w.flush().ok()?;
            Some(w)
        });
        Self { writer }
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    /// Write one record and flush. Errors drop the writer: the log
    /// downgrades rather than erroring out of the sample path.
    pub fn record(&mut self, line: &str) {
        if let Some(w) = &mut self.writer {
            let ok = writeln!(w, "{line}").is_ok() && w.flush().is_ok();
            if !ok {
                self.writer = None;
            }
        }
    }
}

fn wall_time() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// CSV sink writing the per-component logs the pipeline is configured for.
pub struct CsvSink {
    tick: CsvLog,
    marker_corr: CsvLog,
    sync: CsvLog,
    bcd: CsvLog,
    tone: CsvLog,
}

impl CsvSink {
    pub fn new(dir: &Path) -> Self {
        Self {
            tick: CsvLog::create(
                dir,
                "ticks.csv",
                "tick detector",
                "time,timestamp_ms,tick_num,duration_ms,peak_energy,noise_floor,snr_db",
            ),
            marker_corr: CsvLog::create(
                dir,
                "marker_correlator.csv",
                "marker correlator",
                "time,timestamp_ms,marker_num,duration_ms,energy,snr_db,confidence",
            ),
            sync: CsvLog::create(
                dir,
                "sync.csv",
                "sync detector",
                "time,timestamp_ms,marker_num,state,interval_sec,delta_ms,tick_dur_ms,marker_dur_ms",
            ),
            bcd: CsvLog::create(
                dir,
                "bcd_symbols.csv",
                "bcd window correlator",
                "time,timestamp_ms,symbol_index,second,value,duration_ms,source,confidence",
            ),
            tone: CsvLog::create(
                dir,
                "tones.csv",
                "tone tracker",
                "time,timestamp_ms,nominal_hz,measured_hz,offset_hz,offset_ppm,snr_db,valid",
            ),
        }
    }
}

impl EventSink for CsvSink {
    fn on_tick(&mut self, e: &TickEvent) {
        self.tick.record(&format!(
            "{},{:.3},{},{:.2},{:.6e},{:.6e},{:.2}",
            wall_time(),
            e.timestamp_ms,
            e.tick_number,
            e.duration_ms,
            e.peak_energy,
            e.noise_floor,
            e.snr_db
        ));
    }

    fn on_correlated_marker(&mut self, e: &CorrelatedMarker) {
        self.marker_corr.record(&format!(
            "{},{:.3},{},{:.2},{:.6e},{:.2},{:?}",
            wall_time(),
            e.timestamp_ms,
            e.marker_number,
            e.duration_ms,
            e.energy,
            e.snr_db,
            e.confidence
        ));
    }

    fn on_sync(&mut self, u: &SyncUpdate) {
        self.sync.record(&format!(
            "{},{:.3},{},{},{:.3},{:.2},{:.2},{:.2}",
            wall_time(),
            u.timestamp_ms,
            u.marker_number,
            u.state,
            u.interval_sec,
            u.delta_ms,
            u.tick_duration_ms,
            u.marker_duration_ms
        ));
    }

    fn on_bcd_symbol(&mut self, s: &BcdSymbol) {
        self.bcd.record(&format!(
            "{},{:.3},{},{},{:?},{:.2},{:?},{:.3}",
            wall_time(),
            s.timestamp_ms,
            s.symbol_index,
            s.second,
            s.value,
            s.pulse_duration_ms,
            s.source,
            s.confidence
        ));
    }

    fn on_tone(&mut self, m: &ToneMeasurement) {
        self.tone.record(&format!(
            "{},{:.3},{:.0},{:.4},{:.4},{:.4},{:.2},{}",
            wall_time(),
            m.timestamp_ms,
            m.nominal_hz,
            m.measured_hz,
            m.offset_hz,
            m.offset_ppm,
            m.snr_db,
            m.valid
        ));
    }

    fn on_metadata(&mut self, meta: &RxMetadata) {
        // Annotation only: a comment line in the marker correlator log.
        self.marker_corr.record(&format!(
            "# meta: center_freq_hz={:.0},gain_db={:.1},lna={}",
            meta.center_freq_hz, meta.gain_db, meta.lna_enabled
        ));
    }
}
