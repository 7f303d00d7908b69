//! DAQ adapter abstraction.
//!
//! All instrument communication goes through the [`DaqAdapter`] trait, which
//! models the named-analog-channel surface of the bench's data-acquisition
//! hardware. The NI-DAQmx-backed implementation lives outside this crate;
//! [`SimDaq`] provides a full simulation backend so procedures and tools run
//! end-to-end without hardware.

use anyhow::Result;
use async_trait::async_trait;

pub mod sim;

pub use sim::SimDaq;

/// Low-level analog I/O abstraction over named device channels.
#[async_trait]
pub trait DaqAdapter: Send + Sync {
    /// The device/resource name (e.g. "Dev2").
    fn resource_name(&self) -> &str;

    /// Drive an analog output channel to `volts`.
    async fn write_voltage(&self, channel: &str, volts: f64) -> Result<()>;

    /// Read one scalar voltage from an analog input channel.
    async fn read_voltage(&self, channel: &str) -> Result<f64>;
}
