//! A simulated DAQ device.
//!
//! Channel state is shared behind an `Arc`, so one `SimDaq` can be cloned
//! between the magnet driver (which writes the probe channels with the field
//! it produces) and the Hall-probe driver (which reads them back). Read noise
//! uses a deterministic phase-stepped sine instead of a thread-local RNG so
//! the adapter stays `Send` across await points and tests stay reproducible.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::DaqAdapter;

/// Simulated multi-channel analog DAQ device.
#[derive(Clone)]
pub struct SimDaq {
    resource: String,
    channels: Arc<RwLock<HashMap<String, f64>>>,
    loopback: Option<Loopback>,
    noise_amplitude: f64,
    phase: Arc<AtomicU64>,
}

#[derive(Clone)]
struct Loopback {
    from: String,
    to: String,
    offset_v: f64,
}

impl SimDaq {
    /// Create a noiseless simulated device.
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            channels: Arc::new(RwLock::new(HashMap::new())),
            loopback: None,
            noise_amplitude: 0.0,
            phase: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wire an output channel to an input channel, as the bench does with
    /// the drive monitor: every write to `from` lands on `to` plus a fixed
    /// offset.
    pub fn with_loopback(mut self, from: &str, to: &str, offset_v: f64) -> Self {
        self.loopback = Some(Loopback {
            from: from.to_string(),
            to: to.to_string(),
            offset_v,
        });
        self
    }

    /// Add deterministic read noise of the given amplitude (volts).
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Set a channel directly, bypassing the adapter surface. Used by the
    /// simulated magnet to couple its field onto the probe channels.
    pub async fn set_channel(&self, channel: &str, volts: f64) {
        self.channels
            .write()
            .await
            .insert(channel.to_string(), volts);
    }

    fn noise(&self) -> f64 {
        if self.noise_amplitude == 0.0 {
            return 0.0;
        }
        let phase = self.phase.fetch_add(1, Ordering::Relaxed) as f64;
        (phase * 37.0).sin() * self.noise_amplitude
    }
}

#[async_trait]
impl DaqAdapter for SimDaq {
    fn resource_name(&self) -> &str {
        &self.resource
    }

    async fn write_voltage(&self, channel: &str, volts: f64) -> Result<()> {
        let mut channels = self.channels.write().await;
        channels.insert(channel.to_string(), volts);
        if let Some(loopback) = &self.loopback {
            if loopback.from == channel {
                channels.insert(loopback.to.clone(), volts + loopback.offset_v);
            }
        }
        Ok(())
    }

    async fn read_voltage(&self, channel: &str) -> Result<f64> {
        let value = self
            .channels
            .read()
            .await
            .get(channel)
            .copied()
            .unwrap_or(0.0);
        Ok(value + self.noise())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let daq = SimDaq::new("Dev2");
        daq.write_voltage("ao0", 2.5).await.unwrap();
        assert_eq!(daq.read_voltage("ao0").await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn test_unwritten_channel_reads_zero() {
        let daq = SimDaq::new("Dev2");
        assert_eq!(daq.read_voltage("ai7").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_clones_share_channel_state() {
        let daq = SimDaq::new("Dev2");
        let other = daq.clone();
        other.set_channel("ai0", 1.25).await;
        assert_eq!(daq.read_voltage("ai0").await.unwrap(), 1.25);
    }

    #[tokio::test]
    async fn test_loopback_mirrors_writes_with_offset() {
        let daq = SimDaq::new("Dev2").with_loopback("ao0", "ai1", 0.012);
        daq.write_voltage("ao0", 3.0).await.unwrap();
        let monitored = daq.read_voltage("ai1").await.unwrap();
        assert!((monitored - 3.012).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_noise_is_bounded() {
        let daq = SimDaq::new("Dev2").with_noise(0.01);
        for _ in 0..100 {
            let v = daq.read_voltage("ai0").await.unwrap();
            assert!(v.abs() <= 0.01);
        }
    }
}
