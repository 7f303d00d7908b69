//! One-off bench utilities.
//!
//! These wrap the two small maintenance chores that were previously separate
//! scripts: measuring the analog-output offset against the drive monitor
//! channel, and taking a single Hall-probe snapshot with the drive zeroed.

use anyhow::Result;
use std::time::Duration;
use tracing::info;

use crate::adapters::DaqAdapter;
use crate::core::{FieldSample, HallProbe};
use crate::sweep::arange;

/// Result of one offset-calibration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetReport {
    /// `(commanded, readback - commanded)` per step.
    pub per_step: Vec<(f64, f64)>,
    /// Mean offset across all steps.
    pub mean_offset: f64,
}

/// Step the analog output from -10 V to +10 V in 1 V steps, letting the
/// supply settle between steps, and measure the readback offset on the
/// monitor channel at each step.
pub async fn measure_ao_offsets<A: DaqAdapter>(
    adapter: &A,
    ao_channel: &str,
    ai_channel: &str,
    settle: Duration,
) -> Result<OffsetReport> {
    let mut per_step = Vec::new();
    for volts in arange(-10.0, 10.0, 1.0) {
        adapter.write_voltage(ao_channel, volts).await?;
        tokio::time::sleep(settle).await;
        let readback = adapter.read_voltage(ai_channel).await?;
        let offset = readback - volts;
        info!(volts, offset, "offset step");
        per_step.push((volts, offset));
    }
    let mean_offset = per_step.iter().map(|(_, o)| o).sum::<f64>() / per_step.len() as f64;
    Ok(OffsetReport {
        per_step,
        mean_offset,
    })
}

/// Zero the drive output and take one probe reading.
pub async fn probe_snapshot<A, P>(
    adapter: &A,
    ao_channel: &str,
    probe: &P,
) -> Result<FieldSample>
where
    A: DaqAdapter,
    P: HallProbe,
{
    adapter.write_voltage(ao_channel, 0.0).await?;
    probe.read_fields().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimDaq;
    use crate::config::ProbeConfig;
    use crate::instrument::SenisHallProbe;

    #[tokio::test]
    async fn test_offsets_measure_the_loopback_offset() {
        let daq = SimDaq::new("Dev2").with_loopback("ao0", "ai1", 0.012);
        let report = measure_ao_offsets(&daq, "ao0", "ai1", Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(report.per_step.len(), 20);
        assert_eq!(report.per_step[0].0, -10.0);
        assert!((report.mean_offset - 0.012).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_probe_snapshot_zeros_the_drive() {
        let daq = SimDaq::new("Dev2");
        daq.set_channel("ao0", 5.0).await;
        daq.set_channel("ai0", 0.5).await;
        let probe = SenisHallProbe::new(daq.clone(), &ProbeConfig::default());

        let sample = probe_snapshot(&daq, "ao0", &probe).await.unwrap();
        assert_eq!(daq.read_voltage("ao0").await.unwrap(), 0.0);
        assert_eq!(sample.x, 0.1);
    }
}
