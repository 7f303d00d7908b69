//! The field-sweep measurement procedure.
//!
//! One parameterized procedure replaces the four near-identical scripts that
//! previously existed for the field-mode / voltage-mode / zero-offset
//! variants: the differences are captured by [`ProcedureConfig`]
//! (`drive_mode`, `zero_offsets`, `angle_formula`) set at construction.
//!
//! # Lifecycle
//!
//! A runner drives the procedure through `startup` → `execute` → `shutdown`.
//! `execute` walks the angular grid row-major by theta, settles the magnet,
//! averages `num_averages` probe readings per point, and emits exactly one
//! [`ResultRecord`] per commanded point plus a [`ProcedureEvent::Progress`]
//! update after every individual reading. A stop flag is observed once per
//! point, never mid-batch, so an interrupted run is always a clean prefix of
//! the full grid.
//!
//! Instrument soft errors are drained and logged as warnings; they never
//! abort a run. Hard adapter failures propagate to the runner, which still
//! guarantees the de-energization contract.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::{HallProbe, VectorMagnet};
use crate::stats::{AngleFormula, SampleBatch, ZeroOffsets};
use crate::sweep::{SweepAxis, SweepGrid, SweepPoint};

/// Column names of the results file, in emission order.
pub const DATA_COLUMNS: [&str; 17] = [
    "phi",
    "theta",
    "X",
    "Y",
    "act_phi",
    "act_theta",
    "Xfield_avg",
    "Yfield_avg",
    "Zfield_avg",
    "Xfield_std",
    "Yfield_std",
    "Zfield_std",
    "Bmag",
    "V",
    "act_V",
    "Bmag_dev",
    "Bmag_dev_pct",
];

/// How the magnet is driven during the sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Command calibrated vector-field setpoints per point.
    #[default]
    Field,
    /// Hold a fixed drive voltage; never reposition during execute.
    Voltage,
}

/// Full parameterization of one procedure run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcedureConfig {
    /// Run name, used in output filenames and headers.
    pub name: String,
    /// Drive mode for this run.
    pub drive_mode: DriveMode,
    /// Field strength in tesla (field mode) or drive volts (voltage mode).
    pub setpoint: f64,
    /// Phi scan range, degrees.
    pub phi: SweepAxis,
    /// Theta scan range, degrees.
    pub theta: SweepAxis,
    /// Probe samples averaged per point. Must be >= 1.
    pub num_averages: u32,
    /// Delay before each probe sample.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// How long to wait for motion to settle before giving up.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    /// Angle formulation for the derived direction columns.
    pub angle_formula: AngleFormula,
    /// Per-axis probe zero offsets, subtracted before averaging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_offsets: Option<ZeroOffsets>,
    /// Magnet calibration parameter file loaded during startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,
    /// Whether this run opens a series. Non-first runs skip the initial
    /// positioning command; the first point of execute re-commands anyway.
    pub first: bool,
    /// Whether this run closes a series. Non-last runs leave the drive
    /// energized between series members; the runner's cleanup performs the
    /// unconditional final de-energize.
    pub last: bool,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            name: "icarus".to_string(),
            drive_mode: DriveMode::Field,
            setpoint: 0.1,
            phi: SweepAxis::new(10.0, 13.0, 0.1),
            theta: SweepAxis::new(10.0, 13.0, 0.1),
            num_averages: 1,
            delay: Duration::from_millis(100),
            settle_timeout: Duration::from_secs(60),
            angle_formula: AngleFormula::Atan2,
            zero_offsets: None,
            calibration_file: None,
            first: true,
            last: true,
        }
    }
}

/// One reduced row of the results file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Commanded phi, degrees.
    pub phi: f64,
    /// Commanded theta, degrees.
    pub theta: f64,
    /// x motion-stage position, mm.
    #[serde(rename = "X")]
    pub x: f64,
    /// y motion-stage position, mm.
    #[serde(rename = "Y")]
    pub y: f64,
    /// Actual azimuthal angle derived from the batch means, degrees.
    pub act_phi: f64,
    /// Actual polar angle derived from the batch means, degrees.
    pub act_theta: f64,
    /// Mean x field, tesla.
    #[serde(rename = "Xfield_avg")]
    pub xfield_avg: f64,
    /// Mean y field, tesla.
    #[serde(rename = "Yfield_avg")]
    pub yfield_avg: f64,
    /// Mean z field (sign-corrected), tesla.
    #[serde(rename = "Zfield_avg")]
    pub zfield_avg: f64,
    /// Population std of the x samples.
    #[serde(rename = "Xfield_std")]
    pub xfield_std: f64,
    /// Population std of the y samples.
    #[serde(rename = "Yfield_std")]
    pub yfield_std: f64,
    /// Population std of the z samples.
    #[serde(rename = "Zfield_std")]
    pub zfield_std: f64,
    /// Field magnitude from the batch means, tesla.
    #[serde(rename = "Bmag")]
    pub bmag: f64,
    /// Commanded drive voltage.
    #[serde(rename = "V")]
    pub volts: f64,
    /// Actual drive voltage from the monitor channel.
    #[serde(rename = "act_V")]
    pub act_volts: f64,
    /// `Bmag - commanded field`; field mode only.
    #[serde(rename = "Bmag_dev")]
    pub bmag_dev: Option<f64>,
    /// Deviation as a percentage of `Bmag`; field mode only.
    #[serde(rename = "Bmag_dev_pct")]
    pub bmag_dev_pct: Option<f64>,
}

/// Events a running procedure emits to its runner.
#[derive(Clone, Debug)]
pub enum ProcedureEvent {
    /// Overall progress, 0-100, updated after every individual reading.
    Progress(u8),
    /// One reduced record for a completed sweep point.
    Record(ResultRecord),
}

/// The calibration-check sweep procedure.
///
/// Owns its instruments for the duration of a run;
/// [`into_instruments`](Self::into_instruments) hands them back so a series
/// runner can thread the same hardware through consecutive runs.
pub struct CalibCheckProcedure<M, P> {
    config: ProcedureConfig,
    magnet: M,
    probe: P,
    events: mpsc::UnboundedSender<ProcedureEvent>,
    stop: Arc<AtomicBool>,
}

impl<M: VectorMagnet, P: HallProbe> CalibCheckProcedure<M, P> {
    /// Create a procedure and the event stream its runner consumes.
    pub fn new(
        config: ProcedureConfig,
        magnet: M,
        probe: P,
        stop: Arc<AtomicBool>,
    ) -> (Self, mpsc::UnboundedReceiver<ProcedureEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                magnet,
                probe,
                events,
                stop,
            },
            rx,
        )
    }

    /// The run configuration.
    pub fn config(&self) -> &ProcedureConfig {
        &self.config
    }

    /// Whether a stop has been requested.
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Consume the procedure and recover its instruments.
    pub fn into_instruments(self) -> (M, P) {
        (self.magnet, self.probe)
    }

    fn emit(&self, event: ProcedureEvent) {
        // Ignore errors if the runner has dropped its receiver.
        let _ = self.events.send(event);
    }

    async fn log_soft_errors(&mut self) {
        for err in self.magnet.drain_errors().await {
            warn!("{err}");
        }
    }

    /// Connect instruments, load calibration, and drive to the initial
    /// operating point.
    pub async fn startup(&mut self) -> Result<()> {
        info!("Connecting and configuring the instruments");
        self.magnet.initialize().await?;
        self.probe.initialize().await?;
        self.log_soft_errors().await;

        if let Some(path) = self.config.calibration_file.clone() {
            self.magnet.load_calibration(&path).await?;
        }

        match self.config.drive_mode {
            DriveMode::Field => {
                if self.config.first {
                    info!(
                        field = self.config.setpoint,
                        phi = self.config.phi.start,
                        theta = self.config.theta.start,
                        "setting initial vector field"
                    );
                    self.magnet
                        .set_vector_field(
                            self.config.setpoint,
                            self.config.phi.start,
                            self.config.theta.start,
                        )
                        .await?;
                }
            }
            DriveMode::Voltage => {
                info!(volts = self.config.setpoint, "setting drive voltage");
                self.magnet.set_volts(self.config.setpoint).await?;
            }
        }
        self.magnet.wait_settled(self.config.settle_timeout).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.log_soft_errors().await;
        Ok(())
    }

    /// Run the sweep, emitting one record per commanded point.
    pub async fn execute(&mut self) -> Result<()> {
        let grid = SweepGrid::new(&self.config.phi, &self.config.theta);
        let total_readings = grid.total_points() * self.config.num_averages as usize;
        let mut readings_done = 0usize;
        self.emit(ProcedureEvent::Progress(0));

        'thetas: for &theta in grid.thetas() {
            for &phi in grid.phis() {
                let point = SweepPoint { phi, theta };
                let record = self
                    .measure_point(point, total_readings, &mut readings_done)
                    .await?;
                self.emit(ProcedureEvent::Record(record));

                if self.should_stop() {
                    warn!("Caught stop flag in procedure");
                    break 'thetas;
                }
            }
        }
        Ok(())
    }

    async fn measure_point(
        &mut self,
        point: SweepPoint,
        total_readings: usize,
        readings_done: &mut usize,
    ) -> Result<ResultRecord> {
        match self.config.drive_mode {
            DriveMode::Field => {
                info!(phi = point.phi, theta = point.theta, "moving magnet");
                self.magnet
                    .set_vector_field(self.config.setpoint, point.phi, point.theta)
                    .await?;
            }
            // Voltage mode never repositions; just wait out any prior motion.
            DriveMode::Voltage => {}
        }
        self.magnet.wait_settled(self.config.settle_timeout).await?;
        self.log_soft_errors().await;

        let (x, y) = self.magnet.stage_position().await?;
        let act_volts = self.magnet.read_volts().await?;

        let num_averages = self.config.num_averages;
        let mut batch = SampleBatch::with_capacity(num_averages as usize);
        for j in 0..num_averages {
            tokio::time::sleep(self.config.delay).await;
            info!("Recording average {} of {}", j + 1, num_averages);
            let raw = self.probe.read_fields().await?;
            let mut sample = match self.config.zero_offsets {
                Some(offsets) => offsets.apply(raw),
                None => raw,
            };
            // The probe z axis is mounted anti-parallel to the magnet's.
            sample.z = -sample.z;
            batch.push(sample);

            *readings_done += 1;
            self.emit(ProcedureEvent::Progress(
                (100 * *readings_done / total_readings) as u8,
            ));
        }

        let stats = batch.reduce();
        let bmag = stats.magnitude();
        let (bmag_dev, bmag_dev_pct) = match self.config.drive_mode {
            DriveMode::Field => {
                let dev = bmag - self.config.setpoint;
                (Some(dev), Some(dev / bmag * 100.0))
            }
            DriveMode::Voltage => (None, None),
        };

        Ok(ResultRecord {
            phi: point.phi,
            theta: point.theta,
            x,
            y,
            act_phi: stats.act_phi(self.config.angle_formula),
            act_theta: stats.act_theta(self.config.angle_formula),
            xfield_avg: stats.x.mean,
            yfield_avg: stats.y.mean,
            zfield_avg: stats.z.mean,
            xfield_std: stats.x.std,
            yfield_std: stats.y.std,
            zfield_std: stats.z.std,
            bmag,
            volts: self.magnet.volts(),
            act_volts,
            bmag_dev,
            bmag_dev_pct,
        })
    }

    /// De-energize (when closing a series) and release the instruments.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.config.last {
            info!("Done with sweep, de-energizing magnet");
            self.magnet.set_volts(0.0).await?;
        } else {
            info!("Series continues, leaving magnet energized");
        }
        self.magnet.shutdown().await?;
        self.probe.shutdown().await?;
        Ok(())
    }
}
