//! The detector pipeline: single owner of every component lifecycle.
//!
//! Samples enter through two documented entry points (`process_detector_
//! sample` at 50 kHz, `process_display_sample` at 12 kHz, plus completed
//! display FFTs); events propagate forward only, through the routing laid
//! out in the system design:
//!
//! ```text
//! detector path -> sync filter -> tick detector  -> tick correlator
//!                               |                -> tick-marker -> sync
//!                               -> marker detector -> marker corr + sync
//!               -> raw          -> bcd time detector -> bcd windows
//!               -> data filter  -> bcd freq detector -> bcd windows
//! display path  -> tone trackers (shared subcarrier floor)
//! display FFT   -> slow marker  -> marker correlator
//! sync LOCKED gates the bcd window correlator.
//! ```
//!
//! Processing never returns errors; anomalies surface through status
//! snapshots and sinks.

use atomic_float::AtomicF64;
use num_complex::Complex64;
use std::sync::Arc;

use crate::config::{DETECTOR_FFT_SIZE, DETECTOR_RATE, DISPLAY_RATE, PipelineConfig};
use crate::correlators::{
    BcdWindowCorrelator, MarkerCorrStats, MarkerCorrelator, SyncDetector, TickCorrelator,
    TickStats,
};
use crate::detectors::{
    BcdFreqDetector, BcdTimeDetector, MarkerDetector, RxMetadata, SlowMarkerDetector,
    TickDetector, TickOutput, ToneTracker,
};
use crate::dsp::biquad::{ChannelBand, ChannelFilter};
use crate::errors::Result;
use crate::events::{BcdSymbol, SyncState, SyncStatus};
use crate::sink::{CsvSink, EventSink, TelemetrySink};

/// Aggregate statistics snapshot across the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct PipelineStats {
    pub detector_samples: u64,
    pub display_samples: u64,
    pub ticks: u64,
    pub tick_markers: u64,
    pub fast_markers: u64,
    pub bcd_time_events: u64,
    pub bcd_freq_events: u64,
    pub bcd_symbols: u64,
    pub tone_valid: u64,
    pub tone_invalid: u64,
    pub marker_correlation: MarkerCorrStats,
    pub tick_grid: TickStats,
    pub sync: SyncStatus,
}

pub struct DetectorPipeline {
    config: PipelineConfig,

    // 50 kHz path
    sync_filter: ChannelFilter,
    data_filter: ChannelFilter,
    tick: Option<TickDetector>,
    marker: Option<MarkerDetector>,
    bcd_time: BcdTimeDetector,
    bcd_freq: BcdFreqDetector,

    // 12 kHz path
    tones: Vec<ToneTracker>,
    slow_marker: Option<SlowMarkerDetector>,

    // Correlation stage
    tick_corr: Option<TickCorrelator>,
    marker_corr: Option<MarkerCorrelator>,
    sync: Option<SyncDetector>,
    bcd_corr: Option<BcdWindowCorrelator>,

    /// Process-wide subcarrier noise floor: written by whichever tone
    /// tracker is producing valid measurements, read by the BCD freq
    /// detector as its baseline.
    subcarrier_floor: Arc<AtomicF64>,

    sinks: Vec<Box<dyn EventSink>>,

    detector_samples: u64,
    display_samples: u64,
    tick_marker_count: u64,
    bcd_symbol_count: u64,
    shut_down: bool,
}

impl DetectorPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let subcarrier_floor = Arc::new(AtomicF64::new(0.0));

        let mut tones = Vec::new();
        if config.enable_tone {
            for nominal in [0.0, 500.0, 600.0] {
                let mut tracker = ToneTracker::new(nominal)?;
                tracker.set_shared_floor(subcarrier_floor.clone());
                tones.push(tracker);
            }
        }

        // The BCD detectors are not individually switchable; they ride
        // along whenever the pipeline exists.
        let mut bcd_freq = BcdFreqDetector::new();
        bcd_freq.set_shared_floor(subcarrier_floor.clone());

        let mut sinks: Vec<Box<dyn EventSink>> = Vec::new();
        if config.enable_csv {
            // Best effort; individual logs downgrade on failure.
            let _ = std::fs::create_dir_all(&config.output_dir);
            sinks.push(Box::new(CsvSink::new(&config.output_dir)));
        }
        if let Some(addr) = &config.telemetry_addr {
            sinks.push(Box::new(TelemetrySink::new(addr)));
        }

        let lock_timeout_ms = config
            .lock_timeout_enabled
            .then_some(config.lock_timeout_sec * 1000.0);

        Ok(Self {
            tick: config.enable_tick.then(TickDetector::new),
            marker: config.enable_marker.then(MarkerDetector::new),
            bcd_time: BcdTimeDetector::new(),
            bcd_freq,
            tones,
            slow_marker: config.enable_slow_marker.then(SlowMarkerDetector::new),
            tick_corr: config.enable_correlators.then(TickCorrelator::new),
            marker_corr: config.enable_correlators.then(MarkerCorrelator::new),
            sync: config
                .enable_sync
                .then(|| SyncDetector::new(lock_timeout_ms)),
            bcd_corr: config.enable_correlators.then(BcdWindowCorrelator::new),
            sync_filter: ChannelFilter::new(ChannelBand::Sync, DETECTOR_RATE)?,
            data_filter: ChannelFilter::new(ChannelBand::Data, DETECTOR_RATE)?,
            subcarrier_floor,
            sinks,
            detector_samples: 0,
            display_samples: 0,
            tick_marker_count: 0,
            bcd_symbol_count: 0,
            shut_down: false,
            config,
        })
    }

    /// Register an additional event receiver.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Forward tuner metadata to the marker detector and the logs.
    pub fn log_metadata(&mut self, meta: RxMetadata) {
        if let Some(marker) = &mut self.marker {
            marker.log_metadata(meta);
        }
        for sink in &mut self.sinks {
            sink.on_metadata(&meta);
        }
    }

    fn locked(&self) -> bool {
        self.sync
            .as_ref()
            .map(|s| s.state() == SyncState::Locked)
            .unwrap_or(false)
    }

    /// One 50 kHz detector-path sample.
    pub fn process_detector_sample(&mut self, i: f64, q: f64) {
        if self.shut_down {
            return;
        }
        let ts_ms = self.detector_samples as f64 * 1000.0 / DETECTOR_RATE;
        self.detector_samples += 1;

        // Coerce before the IIR filters; a NaN would live in their state
        // forever.
        let i = if i.is_finite() { i } else { 0.0 };
        let q = if q.is_finite() { q } else { 0.0 };
        let raw = Complex64::new(i, q);
        let sync_band = self.sync_filter.process(raw);
        let data_band = self.data_filter.process(raw);

        let tick_out = match &mut self.tick {
            Some(tick) => tick.process(sync_band, ts_ms),
            None => TickOutput::None,
        };
        match tick_out {
            TickOutput::Tick(event) => {
                if let Some(corr) = &mut self.tick_corr {
                    corr.on_tick(&event);
                }
                for sink in &mut self.sinks {
                    sink.on_tick(&event);
                }
            }
            TickOutput::TickMarker(candidate) => {
                self.tick_marker_count += 1;
                let annotated = match &self.tick_corr {
                    Some(corr) => corr.annotate(candidate),
                    None => candidate,
                };
                for sink in &mut self.sinks {
                    sink.on_tick_marker(&annotated);
                }
                let update = self
                    .sync
                    .as_mut()
                    .and_then(|sync| sync.on_tick_marker(annotated));
                if let Some(update) = update {
                    self.handle_sync_update(update);
                }
            }
            TickOutput::None => {}
        }

        let marker_event = self
            .marker
            .as_mut()
            .and_then(|marker| marker.process(sync_band, ts_ms));
        if let Some(event) = marker_event {
            for sink in &mut self.sinks {
                sink.on_marker(&event);
            }
            if let Some(corr) = &mut self.marker_corr {
                corr.on_fast(event);
            }
            let update = self.sync.as_mut().and_then(|sync| sync.on_marker(event));
            if let Some(update) = update {
                self.handle_sync_update(update);
            }
        }

        let locked = self.locked();
        if let Some(event) = self.bcd_time.process(raw, ts_ms) {
            let symbols = match &mut self.bcd_corr {
                Some(corr) => corr.on_event(&event, locked),
                None => Vec::new(),
            };
            self.emit_symbols(symbols);
        }
        if let Some(event) = self.bcd_freq.process(data_band, ts_ms) {
            let symbols = match &mut self.bcd_corr {
                Some(corr) => corr.on_event(&event, locked),
                None => Vec::new(),
            };
            self.emit_symbols(symbols);
        }

        // Housekeeping once per detector frame: expire pending slots,
        // resolve stale correlation windows, close elapsed BCD windows.
        if self.detector_samples % DETECTOR_FFT_SIZE as u64 == 0 {
            if let Some(sync) = &mut self.sync {
                sync.advance(ts_ms);
            }
            let resolved = self.marker_corr.as_mut().and_then(|corr| corr.advance(ts_ms));
            if let Some(marker) = resolved {
                for sink in &mut self.sinks {
                    sink.on_correlated_marker(&marker);
                }
            }
            let locked = self.locked();
            let symbols = match &mut self.bcd_corr {
                Some(corr) => corr.advance(ts_ms, locked),
                None => Vec::new(),
            };
            self.emit_symbols(symbols);
        }
    }

    /// One 12 kHz display-path sample.
    pub fn process_display_sample(&mut self, i: f64, q: f64) {
        if self.shut_down {
            return;
        }
        let ts_ms = self.display_samples as f64 * 1000.0 / DISPLAY_RATE;
        self.display_samples += 1;

        let i = if i.is_finite() { i } else { 0.0 };
        let q = if q.is_finite() { q } else { 0.0 };
        let sample = Complex64::new(i, q);

        for tracker in &mut self.tones {
            if let Some(measurement) = tracker.push(sample, ts_ms) {
                for sink in &mut self.sinks {
                    sink.on_tone(&measurement);
                }
            }
        }
    }

    /// One completed display FFT (power per bin), timestamped by the
    /// producer on the common millisecond clock.
    pub fn process_display_fft(&mut self, bins: &[f64], ts_ms: f64) {
        if self.shut_down {
            return;
        }
        let Some(slow) = &mut self.slow_marker else {
            return;
        };
        let Some(frame) = slow.process_fft(bins, ts_ms) else {
            return;
        };
        for sink in &mut self.sinks {
            sink.on_slow_frame(&frame);
        }
        if let Some(corr) = &mut self.marker_corr {
            if let Some(marker) = corr.on_slow_frame(&frame) {
                for sink in &mut self.sinks {
                    sink.on_correlated_marker(&marker);
                }
            }
        }
    }

    fn handle_sync_update(&mut self, update: crate::events::SyncUpdate) {
        for sink in &mut self.sinks {
            sink.on_sync(&update);
        }
        if let Some(corr) = &mut self.bcd_corr {
            // Close out the old minute on the old grid, then re-anchor;
            // set_anchor drains the window still open on the old grid.
            let mut symbols =
                corr.advance(update.timestamp_ms, update.state == SyncState::Locked);
            if let Some(drained) = corr.set_anchor(update.timestamp_ms) {
                symbols.push(drained);
            }
            self.emit_symbols(symbols);
        }
    }

    fn emit_symbols(&mut self, symbols: Vec<BcdSymbol>) {
        for symbol in symbols {
            self.bcd_symbol_count += 1;
            for sink in &mut self.sinks {
                sink.on_bcd_symbol(&symbol);
            }
        }
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync.as_ref().map(|s| s.status()).unwrap_or_default()
    }

    /// Latest shared subcarrier noise floor (diagnostic).
    pub fn subcarrier_noise_floor(&self) -> f64 {
        self.subcarrier_floor.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn statistics(&self) -> PipelineStats {
        PipelineStats {
            detector_samples: self.detector_samples,
            display_samples: self.display_samples,
            ticks: self.tick.as_ref().map(|t| t.tick_count()).unwrap_or(0),
            tick_markers: self.tick_marker_count,
            fast_markers: self.marker.as_ref().map(|m| m.marker_count()).unwrap_or(0),
            bcd_time_events: self.bcd_time.event_count(),
            bcd_freq_events: self.bcd_freq.event_count(),
            bcd_symbols: self.bcd_symbol_count,
            tone_valid: self.tones.iter().map(|t| t.valid_count()).sum(),
            tone_invalid: self.tones.iter().map(|t| t.invalid_count()).sum(),
            marker_correlation: self
                .marker_corr
                .as_ref()
                .map(|c| c.stats())
                .unwrap_or_default(),
            tick_grid: self
                .tick_corr
                .as_ref()
                .map(|c| c.stats())
                .unwrap_or_default(),
            sync: self.sync_status(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Drain and stop: the open BCD window emits its final symbol if it
    /// holds anything, then all processing entry points become no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if let Some(corr) = &mut self.bcd_corr {
            if let Some(symbol) = corr.shutdown() {
                self.bcd_symbol_count += 1;
                for sink in &mut self.sinks {
                    sink.on_bcd_symbol(&symbol);
                }
            }
        }
        self.shut_down = true;
    }
}
