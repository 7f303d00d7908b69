//! Simulated Daedalus/Icarus projection-field magnet.
//!
//! Reproduces the observable surface of the hardware wrapper: vector-field
//! setpoints, raw drive voltage, an `in_motion` flag that clears a fixed
//! travel time after each positioning command, an accumulating soft-error
//! list, and motion-stage positions. The produced field is coupled straight
//! onto the shared [`SimDaq`] probe channels so the Hall-probe driver reads
//! back a consistent picture of whatever the magnet is commanded to do. The
//! drive monitor readback comes from the adapter's wired loopback.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adapters::{DaqAdapter, SimDaq};
use crate::config::{MagnetConfig, ProbeConfig};
use crate::core::{Instrument, VectorMagnet};
use crate::error::CalibError;

/// Magnet calibration parameters, loaded from a TOML file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MagnetCalibration {
    /// Drive volts per tesla of field magnitude.
    pub volts_per_tesla: f64,
    /// Hard limit of the analog output.
    pub max_volts: f64,
    /// Stage travel per degree of commanded angle.
    pub stage_mm_per_deg: f64,
}

impl Default for MagnetCalibration {
    fn default() -> Self {
        Self {
            volts_per_tesla: 20.0,
            max_volts: 10.0,
            stage_mm_per_deg: 0.1,
        }
    }
}

impl MagnetCalibration {
    /// Load calibration parameters from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CalibError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| CalibError::Calibration(format!("{}: {e}", path.display())))
    }
}

/// Simulated vector electromagnet over a shared [`SimDaq`].
pub struct SimVectorMagnet {
    id: String,
    daq: SimDaq,
    ao_channel: String,
    ai_channel: String,
    probe_channels: [String; 3],
    probe_sensitivity_v_per_t: f64,
    calibration: MagnetCalibration,
    move_time: Duration,
    commanded_volts: f64,
    field: f64,
    phi: f64,
    theta: f64,
    motion_done_at: Option<Instant>,
    errors: Vec<String>,
}

impl SimVectorMagnet {
    /// Build the simulated magnet sharing channel state with the probe.
    pub fn new(daq: SimDaq, magnet: &MagnetConfig, probe: &ProbeConfig) -> Self {
        Self {
            id: "daedalus".to_string(),
            daq,
            ao_channel: magnet.ao_channel.clone(),
            ai_channel: magnet.ai_channel.clone(),
            probe_channels: probe.channels.clone(),
            probe_sensitivity_v_per_t: probe.sensitivity_v_per_t,
            calibration: MagnetCalibration::default(),
            move_time: magnet.move_time,
            commanded_volts: 0.0,
            field: 0.0,
            phi: 0.0,
            theta: 0.0,
            motion_done_at: None,
            errors: Vec::new(),
        }
    }

    /// Queue a soft error, as the hardware does for recoverable faults.
    pub fn push_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    async fn apply_drive(&mut self, volts: f64) -> Result<()> {
        let clamped = volts.clamp(-self.calibration.max_volts, self.calibration.max_volts);
        if clamped != volts {
            self.errors.push(format!(
                "drive request {volts:.3} V clamped to {clamped:.3} V"
            ));
        }
        self.commanded_volts = clamped;
        self.daq.write_voltage(&self.ao_channel, clamped).await?;
        Ok(())
    }

    /// Project the produced field onto the probe channels.
    async fn couple_field(&self) {
        let phi = self.phi.to_radians();
        let theta = self.theta.to_radians();
        let bx = self.field * theta.cos() * phi.sin();
        let by = self.field * theta.cos() * phi.cos();
        let bz = self.field * theta.sin();
        let s = self.probe_sensitivity_v_per_t;
        self.daq.set_channel(&self.probe_channels[0], bx * s).await;
        self.daq.set_channel(&self.probe_channels[1], by * s).await;
        // probe z axis is mounted anti-parallel to the magnet's
        self.daq.set_channel(&self.probe_channels[2], -bz * s).await;
    }
}

#[async_trait]
impl Instrument for SimVectorMagnet {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self) -> Result<()> {
        info!(
            ao = %self.ao_channel,
            ai = %self.ai_channel,
            "simulated magnet connected"
        );
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl VectorMagnet for SimVectorMagnet {
    async fn load_calibration(&mut self, path: &Path) -> Result<()> {
        self.calibration = MagnetCalibration::load(path)?;
        info!(path = %path.display(), "loaded magnet calibration");
        Ok(())
    }

    async fn set_vector_field(&mut self, field: f64, phi: f64, theta: f64) -> Result<()> {
        self.field = field;
        self.phi = phi;
        self.theta = theta;
        self.apply_drive(field * self.calibration.volts_per_tesla)
            .await?;
        self.couple_field().await;
        self.motion_done_at = Some(Instant::now() + self.move_time);
        Ok(())
    }

    async fn set_volts(&mut self, volts: f64) -> Result<()> {
        self.apply_drive(volts).await?;
        // voltage drive changes the magnitude at the current angles
        self.field = self.commanded_volts / self.calibration.volts_per_tesla;
        self.couple_field().await;
        Ok(())
    }

    fn volts(&self) -> f64 {
        self.commanded_volts
    }

    async fn read_volts(&self) -> Result<f64> {
        self.daq.read_voltage(&self.ai_channel).await
    }

    async fn in_motion(&self) -> Result<bool> {
        Ok(self
            .motion_done_at
            .map_or(false, |done| Instant::now() < done))
    }

    async fn drain_errors(&mut self) -> Vec<String> {
        if !self.errors.is_empty() {
            warn!(count = self.errors.len(), "draining magnet soft errors");
        }
        std::mem::take(&mut self.errors)
    }

    async fn stage_position(&self) -> Result<(f64, f64)> {
        Ok((
            self.phi * self.calibration.stage_mm_per_deg,
            self.theta * self.calibration.stage_mm_per_deg,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_pair() -> (SimVectorMagnet, SimDaq) {
        let daq = SimDaq::new("Dev2").with_loopback("ao0", "ai1", 0.012);
        let magnet = SimVectorMagnet::new(
            daq.clone(),
            &MagnetConfig {
                move_time: Duration::from_millis(20),
                ..MagnetConfig::default()
            },
            &ProbeConfig::default(),
        );
        (magnet, daq)
    }

    #[tokio::test]
    async fn test_motion_clears_after_move_time() {
        let (mut magnet, _daq) = sim_pair();
        magnet.set_vector_field(0.1, 10.0, 10.0).await.unwrap();
        assert!(magnet.in_motion().await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!magnet.in_motion().await.unwrap());
    }

    #[tokio::test]
    async fn test_field_couples_onto_probe_channels() {
        let (mut magnet, daq) = sim_pair();
        // 0.1 T entirely along the magnet y axis (phi = theta = 0)
        magnet.set_vector_field(0.1, 0.0, 0.0).await.unwrap();
        let y_volts = daq.read_voltage("ai2").await.unwrap();
        assert!((y_volts - 0.5).abs() < 1e-12);
        assert!(daq.read_voltage("ai0").await.unwrap().abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_monitor_reads_back_with_offset() {
        let (mut magnet, _daq) = sim_pair();
        magnet.set_volts(2.0).await.unwrap();
        assert_eq!(magnet.volts(), 2.0);
        let monitored = magnet.read_volts().await.unwrap();
        assert!((monitored - 2.012).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_overrange_drive_is_clamped_with_soft_error() {
        let (mut magnet, _daq) = sim_pair();
        magnet.set_volts(25.0).await.unwrap();
        assert_eq!(magnet.volts(), 10.0);
        let errors = magnet.drain_errors().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("clamped"));
        assert!(magnet.drain_errors().await.is_empty());
    }
}
