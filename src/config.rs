//! Configuration system using Figment.
//!
//! This module provides strongly-typed configuration loading for the
//! calibration bench. Configuration is loaded from:
//! 1. a `config.toml` file (base configuration)
//! 2. environment variables (prefixed with `ICARUS_`)
//!
//! # Environment Variable Overrides
//!
//! ```text
//! ICARUS_APPLICATION__LOG_LEVEL=debug
//! ICARUS_PROCEDURE__NUM_AVERAGES=10
//! ```
//!
//! # Example
//!
//! ```no_run
//! use icarus_calib::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     println!("Application: {}", settings.application.name);
//!     println!("Log level: {}", settings.application.log_level);
//!     Ok(())
//! }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, CalibError};
use crate::procedure::DriveMode;
use crate::stats::{AngleFormula, ZeroOffsets};
use crate::sweep::SweepAxis;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Magnet channel assignment and timing.
    pub magnet: MagnetConfig,
    /// Hall-probe channel assignment and scaling.
    pub probe: ProbeConfig,
    /// Default sweep-procedure parameters.
    pub procedure: ProcedureDefaults,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Directory that run output lands in.
    pub data_dir: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "icarus_calib".to_string(),
            log_level: "info".to_string(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Magnet DAQ channel assignment and motion timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagnetConfig {
    /// DAQ device/resource name (e.g. "Dev2").
    pub device: String,
    /// Analog output channel driving the supply.
    pub ao_channel: String,
    /// Analog input channel monitoring the actual drive voltage.
    pub ai_channel: String,
    /// Magnet calibration parameter file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<PathBuf>,
    /// Simulated per-move travel time (simulation backend only).
    #[serde(with = "humantime_serde")]
    pub move_time: Duration,
    /// How long to wait for motion to settle before giving up.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self {
            device: "Dev2".to_string(),
            ao_channel: "ao0".to_string(),
            ai_channel: "ai1".to_string(),
            calibration_file: Some(PathBuf::from("./calibrations/icarus.toml")),
            move_time: Duration::from_millis(200),
            settle_timeout: Duration::from_secs(60),
        }
    }
}

/// Hall-probe DAQ channel assignment and scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// DAQ device/resource name.
    pub device: String,
    /// The three analog input channels, in (x, y, z) order.
    pub channels: [String; 3],
    /// Probe sensitivity in volts per tesla.
    pub sensitivity_v_per_t: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            device: "Dev2".to_string(),
            channels: [
                "ai0".to_string(),
                "ai2".to_string(),
                "ai4".to_string(),
            ],
            sensitivity_v_per_t: 5.0,
        }
    }
}

/// Default sweep-procedure parameters, overridable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDefaults {
    /// Drive mode: calibrated field setpoints or raw voltage.
    pub drive_mode: DriveMode,
    /// Field strength in tesla (field mode) or drive volts (voltage mode).
    pub setpoint: f64,
    /// Phi scan range, degrees.
    pub phi: SweepAxis,
    /// Theta scan range, degrees.
    pub theta: SweepAxis,
    /// Hall-probe samples per point.
    pub num_averages: u32,
    /// Delay before each probe sample.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Angle formulation for derived direction columns.
    pub angle_formula: AngleFormula,
    /// Per-axis probe zero offsets, subtracted before averaging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_offsets: Option<ZeroOffsets>,
}

impl Default for ProcedureDefaults {
    fn default() -> Self {
        Self {
            drive_mode: DriveMode::Field,
            setpoint: 0.1,
            phi: SweepAxis::new(10.0, 13.0, 0.1),
            theta: SweepAxis::new(10.0, 13.0, 0.1),
            num_averages: 1,
            delay: Duration::from_millis(100),
            angle_formula: AngleFormula::Atan2,
            zero_offsets: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            magnet: MagnetConfig::default(),
            probe: ProbeConfig::default(),
            procedure: ProcedureDefaults::default(),
        }
    }
}

impl Settings {
    /// Load configuration from defaults, an optional TOML file, and
    /// `ICARUS_`-prefixed environment variables (highest precedence).
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(p) => figment = figment.merge(Toml::file(p)),
            None => figment = figment.merge(Toml::file("config.toml")),
        }
        let settings: Settings = figment
            .merge(Env::prefixed("ICARUS_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        if self.procedure.num_averages == 0 {
            return Err(CalibError::Configuration(
                "num_averages must be at least 1".to_string(),
            ));
        }
        if self.procedure.phi.step <= 0.0 || self.procedure.theta.step <= 0.0 {
            return Err(CalibError::Configuration(
                "sweep axis steps must be positive".to_string(),
            ));
        }
        if self.probe.sensitivity_v_per_t <= 0.0 {
            return Err(CalibError::Configuration(
                "probe sensitivity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.application.log_level, "info");
        assert_eq!(settings.probe.channels[2], "ai4");
    }

    #[test]
    fn test_zero_averages_rejected() {
        let mut settings = Settings::default();
        settings.procedure.num_averages = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let settings = Settings::default();
        let text = toml::to_string(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back.procedure.setpoint, settings.procedure.setpoint);
        assert_eq!(back.magnet.move_time, settings.magnet.move_time);
    }
}
