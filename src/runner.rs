//! Headless experiment runner.
//!
//! Owns the instruments and drives one or more procedure runs through the
//! `startup` → `execute` → `shutdown` lifecycle, consuming the event stream
//! into a results file as it arrives. An execute error marks the run failed
//! and aborts any remaining series members, but the cleanup contract always
//! holds: the magnet drive is forced to zero on every termination path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::core::{HallProbe, VectorMagnet};
use crate::error::{AppResult, CalibError};
use crate::procedure::{CalibCheckProcedure, DriveMode, ProcedureConfig, ProcedureEvent};
use crate::storage::{run_prefix, unique_filename, ResultsWriter, SeriesIndex};
use crate::sweep::SweepParameter;

/// A single run or a series of runs sharing one pair of instruments.
pub struct Experiment {
    /// Directory run output lands in.
    pub output_dir: PathBuf,
    /// Whether output goes into a dated subfolder.
    pub dated_folder: bool,
    /// Base procedure configuration; series members override the setpoint.
    pub base: ProcedureConfig,
    /// When present, one run per swept value plus a series-index file.
    pub series: Option<SweepParameter>,
}

impl Experiment {
    /// A single standalone run.
    pub fn single(output_dir: PathBuf, base: ProcedureConfig) -> Self {
        Self {
            output_dir,
            dated_folder: true,
            base,
            series: None,
        }
    }

    /// A series of runs varying the drive setpoint.
    pub fn series(output_dir: PathBuf, base: ProcedureConfig, swept: SweepParameter) -> Self {
        Self {
            output_dir,
            dated_folder: true,
            base,
            series: Some(swept),
        }
    }

    /// Expand into per-run configurations with first/last set at the ends.
    fn runs(&self) -> Vec<ProcedureConfig> {
        match &self.series {
            None => {
                let mut config = self.base.clone();
                config.first = true;
                config.last = true;
                vec![config]
            }
            Some(swept) => {
                let mut configs: Vec<ProcedureConfig> = swept
                    .values
                    .iter()
                    .map(|&value| {
                        let mut config = self.base.clone();
                        config.setpoint = value;
                        config.first = false;
                        config.last = false;
                        config
                    })
                    .collect();
                if let Some(first) = configs.first_mut() {
                    first.first = true;
                }
                if let Some(last) = configs.last_mut() {
                    last.last = true;
                }
                configs
            }
        }
    }

    fn setpoint_units(&self) -> &'static str {
        match self.base.drive_mode {
            DriveMode::Field => "T",
            DriveMode::Voltage => "V",
        }
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunSummary {
    /// The results file written for this run.
    pub path: PathBuf,
    /// Records written.
    pub records: usize,
    /// Whether execute or shutdown errored.
    pub failed: bool,
}

/// Drives experiments and exposes the asynchronous stop flag.
pub struct ExperimentRunner {
    stop: Arc<AtomicBool>,
}

impl Default for ExperimentRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentRunner {
    /// Create a runner with a fresh stop flag.
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle another task (e.g. a Ctrl-C listener) can use to request a
    /// stop; observed at sweep-point boundaries.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the experiment to completion, stop, or first failure.
    pub async fn run<M, P>(
        &self,
        experiment: Experiment,
        magnet: M,
        probe: P,
    ) -> AppResult<Vec<RunSummary>>
    where
        M: VectorMagnet,
        P: HallProbe,
    {
        let mut magnet = Some(magnet);
        let mut probe = Some(probe);
        let mut summaries = Vec::new();
        let outcome = self
            .run_all(&experiment, &mut magnet, &mut probe, &mut summaries)
            .await;

        // Cleanup contract: the drive never stays energized past the
        // experiment, whatever happened above. The instrument slots hold the
        // magnet again at every early return, so this covers storage and
        // consumer-task failures too, not just run failures.
        if let Some(magnet) = magnet.as_mut() {
            if let Err(e) = magnet.set_volts(0.0).await {
                error!("failed to de-energize magnet during cleanup: {e:#}");
            }
        }

        outcome.map(|()| summaries)
    }

    /// The fallible part of [`run`](Self::run). Instruments live in the
    /// caller's slots whenever this returns, so the caller can always
    /// de-energize.
    async fn run_all<M, P>(
        &self,
        experiment: &Experiment,
        magnet_slot: &mut Option<M>,
        probe_slot: &mut Option<P>,
        summaries: &mut Vec<RunSummary>,
    ) -> AppResult<()>
    where
        M: VectorMagnet,
        P: HallProbe,
    {
        let mut series_index = match &experiment.series {
            Some(swept) => {
                let path = unique_filename(
                    &experiment.output_dir,
                    &format!("{}_calibCheck_series_", experiment.base.name),
                    "txt",
                    experiment.dated_folder,
                )?;
                info!(path = %path.display(), "starting series");
                Some(SeriesIndex::create(&path, swept, experiment.setpoint_units())?)
            }
            None => None,
        };

        for config in experiment.runs() {
            let prefix = run_prefix(&config.name, config.setpoint);
            let path = unique_filename(
                &experiment.output_dir,
                &prefix,
                "csv",
                experiment.dated_folder,
            )?;
            if let Some(index) = series_index.as_mut() {
                index.push(&path)?;
            }
            info!(path = %path.display(), setpoint = config.setpoint, "starting run");

            let mut writer = ResultsWriter::create(&path, &config)?;

            let (magnet, probe) = match (magnet_slot.take(), probe_slot.take()) {
                (Some(m), Some(p)) => (m, p),
                _ => {
                    return Err(CalibError::Instrument(
                        "instruments lost between runs".to_string(),
                    ))
                }
            };
            let (mut procedure, mut events) =
                CalibCheckProcedure::new(config, magnet, probe, self.stop.clone());

            let consumer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ProcedureEvent::Progress(p) => info!(progress = p, "sweep progress"),
                        ProcedureEvent::Record(record) => writer.write_record(&record)?,
                    }
                }
                Ok::<usize, CalibError>(writer.records())
            });

            let run_result = match procedure.startup().await {
                Ok(()) => procedure.execute().await,
                Err(e) => Err(e),
            };
            // shutdown semantics run on every path, including failure
            let shutdown_result = procedure.shutdown().await;
            let (m, p) = procedure.into_instruments();
            *magnet_slot = Some(m);
            *probe_slot = Some(p);

            let records = consumer
                .await
                .map_err(|e| CalibError::Storage(format!("result writer task: {e}")))??;

            let failed = run_result.is_err() || shutdown_result.is_err();
            if let Err(e) = &run_result {
                error!("run failed: {e:#}");
            }
            if let Err(e) = &shutdown_result {
                error!("shutdown failed: {e:#}");
            }
            info!(records, failed, "run finished");
            summaries.push(RunSummary {
                path,
                records,
                failed,
            });

            if failed || self.stop.load(Ordering::Relaxed) {
                break;
            }
        }

        Ok(())
    }
}
