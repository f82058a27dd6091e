mod config;
mod display;

use chrono::Local;
use clap::Parser;
use color_eyre::eyre::{bail, Context, Result};
use std::io::Read;
use std::path::PathBuf;

use config::{CliConfig, InputFormat};
use display::DisplayPath;
use wwvrx_core::events::{BcdSymbol, CorrelatedMarker, SyncUpdate, TickEvent};
use wwvrx_core::sink::EventSink;
use wwvrx_core::DetectorPipeline;

#[derive(Parser, Debug)]
#[command(author, version, about = "WWV/WWVH time-signal receiver pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input file (2-channel WAV or raw f32le I/Q); `-` for stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Input sample format
    #[arg(long, value_enum)]
    format: Option<InputFormat>,

    /// Input sample rate in Hz (multiple of 50000)
    #[arg(long)]
    input_rate: Option<u32>,

    /// Directory for CSV logs (enables CSV output)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// UDP telemetry destination, host:port
    #[arg(long)]
    telemetry: Option<String>,

    #[arg(long)]
    no_tick: bool,
    #[arg(long)]
    no_marker: bool,
    #[arg(long)]
    no_sync: bool,
    #[arg(long)]
    no_tone: bool,
    #[arg(long)]
    no_correlators: bool,
    #[arg(long)]
    no_slow_marker: bool,

    /// Print individual ticks as they are detected
    #[arg(short, long)]
    verbose: bool,
}

/// Prints pipeline events to stdout.
struct PrintSink {
    verbose: bool,
}

impl EventSink for PrintSink {
    fn on_tick(&mut self, e: &TickEvent) {
        if self.verbose {
            println!(
                "tick #{} at {:.3} s ({:.1} ms, {:.1} dB)",
                e.tick_number,
                e.timestamp_ms / 1000.0,
                e.duration_ms,
                e.snr_db
            );
        }
    }

    fn on_correlated_marker(&mut self, m: &CorrelatedMarker) {
        println!(
            "marker #{} at {:.3} s ({:.0} ms, {:?})",
            m.marker_number,
            m.timestamp_ms / 1000.0,
            m.duration_ms,
            m.confidence
        );
    }

    fn on_sync(&mut self, u: &SyncUpdate) {
        println!(
            "sync: marker #{} at {:.3} s, state {}, interval {:.1} s, delta {:.0} ms",
            u.marker_number,
            u.timestamp_ms / 1000.0,
            u.state,
            u.interval_sec,
            u.delta_ms
        );
    }

    fn on_bcd_symbol(&mut self, s: &BcdSymbol) {
        println!(
            "bcd: second {:02} -> {:?} ({:.0} ms, {:?}, conf {:.2})",
            s.second, s.value, s.pulse_duration_ms, s.source, s.confidence
        );
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)
            .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
        None => CliConfig::default(),
    };

    // CLI flags override the file.
    if let Some(input) = args.input {
        config.input = Some(input);
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(rate) = args.input_rate {
        config.input_rate = rate;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
        config.csv = true;
    }
    if let Some(addr) = args.telemetry {
        config.telemetry_addr = Some(addr);
    }
    config.enable_tick &= !args.no_tick;
    config.enable_marker &= !args.no_marker;
    config.enable_sync &= !args.no_sync;
    config.enable_tone &= !args.no_tone;
    config.enable_correlators &= !args.no_correlators;
    config.enable_slow_marker &= !args.no_slow_marker;

    let decimation = config.decimation()?;
    let mut pipeline = DetectorPipeline::new(config.pipeline_config())
        .wrap_err("invalid pipeline configuration")?;
    pipeline.add_sink(Box::new(PrintSink {
        verbose: args.verbose,
    }));

    let started = Local::now();

    let fed = match config.format {
        InputFormat::Wav => run_wav(&config, decimation, &mut pipeline)?,
        InputFormat::F32le => run_raw(&config, decimation, &mut pipeline)?,
    };

    pipeline.shutdown();
    let stats = pipeline.statistics();
    let elapsed = Local::now() - started;
    eprintln!(
        "[{}] processed {} samples in {:.1} s: {} ticks, {} markers, {} correlated ({:?}), {} bcd symbols, sync {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        fed,
        elapsed.num_milliseconds() as f64 / 1000.0,
        stats.ticks,
        stats.fast_markers,
        stats.marker_correlation.confirmed
            + stats.marker_correlation.fast_only
            + stats.marker_correlation.slow_only,
        stats.marker_correlation,
        stats.bcd_symbols,
        stats.sync.state
    );
    Ok(())
}

/// Boxcar decimator down to the 50 kHz detector rate, fanning into the
/// detector path and the display path.
struct Frontend {
    decimation: u32,
    acc_i: f64,
    acc_q: f64,
    count: u32,
    display: DisplayPath,
    fed: u64,
}

impl Frontend {
    fn new(decimation: u32) -> Self {
        Self {
            decimation,
            acc_i: 0.0,
            acc_q: 0.0,
            count: 0,
            display: DisplayPath::new(),
            fed: 0,
        }
    }

    fn push(&mut self, i: f64, q: f64, pipeline: &mut DetectorPipeline) {
        self.acc_i += i;
        self.acc_q += q;
        self.count += 1;
        if self.count < self.decimation {
            return;
        }
        let scale = 1.0 / self.decimation as f64;
        let (i, q) = (self.acc_i * scale, self.acc_q * scale);
        self.acc_i = 0.0;
        self.acc_q = 0.0;
        self.count = 0;

        pipeline.process_detector_sample(i, q);
        self.display.push(i, q, pipeline);
        self.fed += 1;
    }
}

fn run_wav(config: &CliConfig, decimation: u32, pipeline: &mut DetectorPipeline) -> Result<u64> {
    let Some(path) = &config.input else {
        bail!("no input file; pass --input or set `input` in the config");
    };
    let mut reader = hound::WavReader::open(path)
        .wrap_err_with(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 2 {
        bail!("need a 2-channel (I/Q) WAV, got {} channels", spec.channels);
    }

    let mut frontend = Frontend::new(decimation);
    match spec.sample_format {
        hound::SampleFormat::Float => {
            let mut pending: Option<f64> = None;
            for sample in reader.samples::<f32>() {
                let v = sample? as f64;
                match pending.take() {
                    None => pending = Some(v),
                    Some(i) => frontend.push(i, v, pipeline),
                }
            }
        }
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f64;
            let mut pending: Option<f64> = None;
            for sample in reader.samples::<i32>() {
                let v = sample? as f64 * scale;
                match pending.take() {
                    None => pending = Some(v),
                    Some(i) => frontend.push(i, v, pipeline),
                }
            }
        }
    }
    Ok(frontend.fed)
}

fn run_raw(config: &CliConfig, decimation: u32, pipeline: &mut DetectorPipeline) -> Result<u64> {
    let reader: Box<dyn Read> = match &config.input {
        Some(path) if path.as_os_str() != "-" => Box::new(
            std::fs::File::open(path)
                .wrap_err_with(|| format!("failed to open {}", path.display()))?,
        ),
        _ => Box::new(std::io::stdin().lock()),
    };
    let mut reader = std::io::BufReader::new(reader);

    let mut frontend = Frontend::new(decimation);
    let mut buf = [0u8; 8];
    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => {
                let i = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64;
                let q = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as f64;
                frontend.push(i, q, pipeline);
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).wrap_err("sample source failed"),
        }
    }
    Ok(frontend.fed)
}
