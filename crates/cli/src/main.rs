use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use serde::Serialize;

use rfft2_backend_cpu::CpuBackend;
use rfft2_backend_cuda::CudaBackend;
use rfft2_core::{
    backend::FftDevice,
    config::{BackendKind, ConfigError, RoundTripConfig},
    driver::{RoundTrip, RoundTripError},
    error::DeviceError,
    report::{ReportSink, RoundTripReport, TextSink, Verification},
    shape::TransformShape,
};

#[derive(Parser, Debug)]
#[command(
    name = "rfft2-roundtrip",
    about = "Batched 2-D real FFT round trip: R2C forward, C2R inverse"
)]
struct Cli {
    /// Path to a TOML configuration file (defaults reproduce the 5x5 all-ones run)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the configured backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Override the configured device ordinal (CUDA only)
    #[arg(long)]
    device: Option<usize>,
    /// Wait for a line on stdin before exiting after a memory or copy failure
    #[arg(long)]
    wait_on_error: bool,
    /// Write a JSON summary of the run to this path
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Only log warnings and errors (stderr)
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Cpu,
    Cuda,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Cpu => BackendKind::Cpu,
            BackendArg::Cuda => BackendKind::Cuda,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    RoundTrip(#[from] RoundTripError),

    #[error("failed to write summary {}: {source}", .path.display())]
    Summary {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::RoundTrip(err) => err.exit_code(),
            CliError::Device(err) => u8::try_from(err.code().clamp(1, 255)).unwrap_or(1),
            CliError::Config(_) | CliError::Summary { .. } => 1,
        }
    }

    /// Memory and copy failures, the ones an operator may want to inspect
    /// before the process goes away.
    fn is_transfer_layer(&self) -> bool {
        match self {
            CliError::RoundTrip(err) => err.is_transfer_layer(),
            CliError::Device(_) => true,
            CliError::Config(_) | CliError::Summary { .. } => false,
        }
    }

    fn waits_for_operator(&self, wait_on_error: bool) -> bool {
        wait_on_error && self.is_transfer_layer()
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    backend: &'static str,
    shape: &'a TransformShape,
    normalized: bool,
    frequency_bins: usize,
    samples: usize,
    verification: Verification,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            if err.waits_for_operator(cli.wait_on_error) {
                wait_for_operator();
            }
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("[cli] loading config {}", path.display());
            RoundTripConfig::from_file(path)?
        }
        None => RoundTripConfig::default(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    info!(
        "[cli] round trip of {} ({:?}) on {}",
        config.shape, config.signal, config.backend
    );

    let (backend, report) = match config.backend {
        BackendKind::Cpu => {
            let device = CpuBackend::new();
            let report = execute(&device, &config, &mut TextSink::stdout())?;
            debug!(
                "[cli] cpu ledger: peak {} bytes over {} allocations",
                device.ledger().peak_bytes(),
                device.ledger().allocations()
            );
            (device.name(), report)
        }
        BackendKind::Cuda => {
            let device = CudaBackend::try_new(config.device)?;
            (device.name(), execute(&device, &config, &mut TextSink::stdout())?)
        }
    };

    let verification = report.verify(config.tolerance);
    if verification.passed() {
        info!(
            "[cli] verified: dc error {:.2e}, round-trip error {:.2e} (scale {})",
            verification.max_dc_error, verification.max_roundtrip_error, verification.scale
        );
    } else {
        warn!(
            "[cli] verification failed at tolerance {:.2e}: dc error {:.2e}, dc imag {:.2e}, round-trip error {:.2e}",
            verification.tolerance,
            verification.max_dc_error,
            verification.max_dc_imag,
            verification.max_roundtrip_error
        );
    }

    if let Some(path) = &cli.summary {
        let summary = RunSummary {
            backend,
            shape: &report.shape,
            normalized: report.normalized,
            frequency_bins: report.frequency.len(),
            samples: report.reconstructed.len(),
            verification,
        };
        write_summary(&summary, path).map_err(|source| CliError::Summary {
            path: path.clone(),
            source,
        })?;
        info!("[cli] wrote summary to {}", path.display());
    }
    Ok(())
}

/// Run the round trip on `device`, resetting it when a plan or execution
/// failure leaves it unusable.
fn execute<D: FftDevice, S: ReportSink>(
    device: &D,
    config: &RoundTripConfig,
    sink: &mut S,
) -> Result<RoundTripReport, CliError> {
    let result = RoundTrip::new(device, config.shape.clone())
        .with_options(config.options())
        .run_signal(&config.signal, sink);

    match result {
        Ok(report) => Ok(report),
        Err(err) => {
            // Every buffer and plan is already dropped at this point.
            if err.is_transform_layer() {
                device.reset();
            }
            Err(err.into())
        }
    }
}

fn write_summary(summary: &RunSummary<'_>, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()
}

fn wait_for_operator() {
    eprintln!("press enter to exit");
    let mut line = String::new();
    if let Err(err) = io::stdin().lock().read_line(&mut line) {
        debug!("[cli] could not read acknowledgment: {err}");
    }
}
