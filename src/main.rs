//! CLI entry point for the Icarus calibration bench.
//!
//! Subcommands:
//! - `check`   - run a calibration-check sweep (single run or field series)
//! - `offsets` - measure the analog-output offset against the drive monitor
//! - `probe`   - zero the drive and take one Hall-probe snapshot

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use icarus_calib::adapters::SimDaq;
use icarus_calib::config::Settings;
use icarus_calib::core::Instrument;
use icarus_calib::instrument::{SenisHallProbe, SimVectorMagnet};
use icarus_calib::procedure::{DriveMode, ProcedureConfig};
use icarus_calib::runner::{Experiment, ExperimentRunner};
use icarus_calib::sweep::SweepParameter;
use icarus_calib::tools;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "icarus_calib")]
#[command(about = "Field-sweep calibration bench for the Daedalus vector magnet", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calibration-check sweep
    Check {
        /// Run name used in output filenames and headers
        #[arg(long, default_value = "icarus")]
        name: String,

        /// Hold a fixed drive voltage instead of commanding field setpoints
        #[arg(long)]
        voltage: bool,

        /// Field strength in tesla (volts in voltage mode); overrides config
        #[arg(long)]
        setpoint: Option<f64>,

        /// Sweep the setpoint up to this value, one run per step
        #[arg(long, requires = "series_step")]
        series_end: Option<f64>,

        /// Setpoint increment for a series sweep
        #[arg(long, requires = "series_end")]
        series_step: Option<f64>,

        /// Probe samples averaged per point; overrides config
        #[arg(long)]
        num_averages: Option<u32>,

        /// Output directory; overrides config
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Measure the drive offset by stepping the analog output
    Offsets,

    /// Zero the drive and print one Hall-probe reading
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.application.log_level)),
        )
        .init();

    info!(application = %settings.application.name, "starting");

    // Simulation backend. The wired loopback plays the supply's voltage
    // monitor, including its small constant readback offset.
    let daq = SimDaq::new(&settings.magnet.device).with_loopback(
        &settings.magnet.ao_channel,
        &settings.magnet.ai_channel,
        0.012,
    );

    match cli.command {
        Commands::Check {
            name,
            voltage,
            setpoint,
            series_end,
            series_step,
            num_averages,
            output,
        } => {
            let defaults = &settings.procedure;
            let base = ProcedureConfig {
                name,
                drive_mode: if voltage {
                    DriveMode::Voltage
                } else {
                    defaults.drive_mode
                },
                setpoint: setpoint.unwrap_or(defaults.setpoint),
                phi: defaults.phi,
                theta: defaults.theta,
                num_averages: num_averages.unwrap_or(defaults.num_averages),
                delay: defaults.delay,
                settle_timeout: settings.magnet.settle_timeout,
                angle_formula: defaults.angle_formula,
                zero_offsets: defaults.zero_offsets,
                calibration_file: settings.magnet.calibration_file.clone(),
                first: true,
                last: true,
            };

            let output_dir = output.unwrap_or_else(|| settings.application.data_dir.clone());
            let experiment = match (series_end, series_step) {
                (Some(end), Some(step)) => {
                    let swept = SweepParameter::from_range("field", base.setpoint, end, step);
                    Experiment::series(output_dir, base, swept)
                }
                _ => Experiment::single(output_dir, base),
            };

            let runner = ExperimentRunner::new();
            let stop = runner.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping after the current point");
                    stop.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            });

            let magnet = SimVectorMagnet::new(daq.clone(), &settings.magnet, &settings.probe);
            let probe = SenisHallProbe::new(daq, &settings.probe);
            let summaries = runner.run(experiment, magnet, probe).await?;

            let mut failed = false;
            for summary in &summaries {
                info!(
                    path = %summary.path.display(),
                    records = summary.records,
                    failed = summary.failed,
                    "run finished"
                );
                failed |= summary.failed;
            }
            if failed {
                error!("one or more runs failed");
                std::process::exit(1);
            }
        }

        Commands::Offsets => {
            let report = tools::measure_ao_offsets(
                &daq,
                &settings.magnet.ao_channel,
                &settings.magnet.ai_channel,
                Duration::from_secs(1),
            )
            .await?;
            for (volts, offset) in &report.per_step {
                println!("{volts:+6.1} V -> offset {offset:+.5} V");
            }
            println!("mean offset: {:+.5} V", report.mean_offset);
        }

        Commands::Probe => {
            let mut probe = SenisHallProbe::new(daq.clone(), &settings.probe);
            probe.initialize().await?;
            let sample =
                tools::probe_snapshot(&daq, &settings.magnet.ao_channel, &probe).await?;
            println!("x: {:.7} T", sample.x);
            println!("y: {:.7} T", sample.y);
            println!("z: {:.7} T", sample.z);
            probe.shutdown().await?;
        }
    }

    Ok(())
}
