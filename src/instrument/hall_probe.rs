//! Senis-style 3-axis Hall probe driver.
//!
//! The probe is three analog channels on the DAQ with a fixed volts-per-tesla
//! sensitivity. Readings are returned in the probe's native orientation; the
//! z sign correction belongs to the procedure, not the driver.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::adapters::DaqAdapter;
use crate::config::ProbeConfig;
use crate::core::{FieldSample, HallProbe, Instrument};

/// 3-axis Hall probe over three DAQ analog inputs.
pub struct SenisHallProbe<A> {
    id: String,
    adapter: A,
    channels: [String; 3],
    sensitivity_v_per_t: f64,
}

impl<A: DaqAdapter> SenisHallProbe<A> {
    /// Build the driver from configuration.
    pub fn new(adapter: A, config: &ProbeConfig) -> Self {
        Self {
            id: "hall_probe".to_string(),
            adapter,
            channels: config.channels.clone(),
            sensitivity_v_per_t: config.sensitivity_v_per_t,
        }
    }

    async fn read_axis(&self, index: usize) -> Result<f64> {
        let volts = self.adapter.read_voltage(&self.channels[index]).await?;
        Ok(volts / self.sensitivity_v_per_t)
    }
}

#[async_trait]
impl<A: DaqAdapter> Instrument for SenisHallProbe<A> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self) -> Result<()> {
        info!(
            device = self.adapter.resource_name(),
            channels = ?self.channels,
            "Hall probe connected"
        );
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<A: DaqAdapter> HallProbe for SenisHallProbe<A> {
    async fn read_fields(&self) -> Result<FieldSample> {
        Ok(FieldSample {
            x: self.read_axis(0).await?,
            y: self.read_axis(1).await?,
            z: self.read_axis(2).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimDaq;

    #[tokio::test]
    async fn test_reading_scales_by_sensitivity() {
        let daq = SimDaq::new("Dev2");
        daq.set_channel("ai0", 0.5).await;
        daq.set_channel("ai2", -1.0).await;
        daq.set_channel("ai4", 0.25).await;

        let probe = SenisHallProbe::new(daq, &ProbeConfig::default());
        let sample = probe.read_fields().await.unwrap();
        assert_eq!(sample.x, 0.1);
        assert_eq!(sample.y, -0.2);
        assert_eq!(sample.z, 0.05);
    }
}
