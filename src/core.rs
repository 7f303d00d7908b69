//! Core traits and data types for the calibration bench.
//!
//! This module defines the foundational abstractions the sweep procedure is
//! written against, providing capability-based trait interfaces for the two
//! instruments on the bench.
//!
//! # Architecture Overview
//!
//! - [`Instrument`]: base trait with lifecycle management
//! - [`VectorMagnet`]: the Daedalus/Icarus projection-field magnet (vector
//!   field setpoints, drive voltage, motion status, soft-error list)
//! - [`HallProbe`]: a 3-axis Hall probe producing instantaneous
//!   [`FieldSample`] readings
//!
//! # Thread Safety
//!
//! All traits require `Send + Sync` so a procedure can run in its own Tokio
//! task while a stop request arrives from elsewhere. Within one running
//! procedure every instrument call is strictly sequential.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One instantaneous 3-axis Hall-probe reading, in the probe's native
/// orientation and units (tesla).
///
/// The probe is mounted with its z axis anti-parallel to the magnet's; the
/// sign flip is applied by the procedure, not by the probe driver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    /// Field along the probe x axis.
    pub x: f64,
    /// Field along the probe y axis.
    pub y: f64,
    /// Field along the probe z axis (native sign).
    pub z: f64,
}

/// Base trait for all instruments on the bench.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Unique instrument identifier.
    fn id(&self) -> &str;

    /// Initialize hardware connection.
    ///
    /// Called once before the instrument can be used. Should establish the
    /// adapter connection and verify communication.
    async fn initialize(&mut self) -> Result<()>;

    /// Shutdown hardware connection gracefully.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Capability trait for the vector electromagnet.
///
/// Covers both drive modes of the physical instrument: calibrated vector
/// field setpoints (tesla + two spherical angles) and raw drive voltage.
#[async_trait]
pub trait VectorMagnet: Instrument {
    /// Load the magnet calibration parameter file.
    async fn load_calibration(&mut self, path: &Path) -> Result<()>;

    /// Command a vector field: magnitude in tesla, phi/theta in degrees.
    ///
    /// Returns as soon as the command is accepted; motion completes
    /// asynchronously (poll [`in_motion`](Self::in_motion)).
    async fn set_vector_field(&mut self, field: f64, phi: f64, theta: f64) -> Result<()>;

    /// Set the raw drive voltage on the analog output.
    async fn set_volts(&mut self, volts: f64) -> Result<()>;

    /// The most recently commanded drive voltage.
    fn volts(&self) -> f64;

    /// Read back the actual drive voltage from the monitor channel.
    async fn read_volts(&self) -> Result<f64>;

    /// Whether any magnet axis is still moving.
    async fn in_motion(&self) -> Result<bool>;

    /// Take and clear the instrument's accumulated soft-error strings.
    ///
    /// These are non-fatal; callers log them as warnings and continue.
    async fn drain_errors(&mut self) -> Vec<String>;

    /// Current (x, y) positions of the motion stages, in mm.
    async fn stage_position(&self) -> Result<(f64, f64)>;

    /// Wait for motion to settle, polling at a fixed 50 ms cadence.
    async fn wait_settled(&self, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        loop {
            if !self.in_motion().await? {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(anyhow::anyhow!(
                    "Timeout waiting for magnet motion to settle"
                ));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Capability trait for 3-axis Hall probes.
#[async_trait]
pub trait HallProbe: Instrument {
    /// Take one instantaneous (x, y, z) field reading.
    async fn read_fields(&self) -> Result<FieldSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_sample_roundtrip() {
        let s = FieldSample {
            x: 0.1,
            y: -0.2,
            z: 0.05,
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: FieldSample = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
