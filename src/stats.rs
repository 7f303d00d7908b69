//! Sample reduction and derived field quantities.
//!
//! A [`SampleBatch`] accumulates the repeated Hall-probe triples taken at a
//! single sweep point and reduces them to per-axis mean and population
//! standard deviation. All derived quantities (actual spherical angles, field
//! magnitude, deviation from the commanded field) are computed from the batch
//! means, never per sample.

use serde::{Deserialize, Serialize};

use crate::core::FieldSample;

const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Per-axis zero-field offsets of a specific physical probe, subtracted from
/// every raw sample before averaging. Injected configuration, not a constant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZeroOffsets {
    /// x-axis offset in tesla.
    pub x: f64,
    /// y-axis offset in tesla.
    pub y: f64,
    /// z-axis offset in tesla (native probe sign).
    pub z: f64,
}

impl ZeroOffsets {
    /// Subtract the offsets from one raw sample.
    pub fn apply(&self, sample: FieldSample) -> FieldSample {
        FieldSample {
            x: sample.x - self.x,
            y: sample.y - self.y,
            z: sample.z - self.z,
        }
    }
}

/// Which angle formulation to use when deriving the actual field direction.
///
/// `Atan` reproduces the plain `atan(x/y)` form of the older scripts. It is
/// kept as a distinct configuration because recorded data depends on it, but
/// it returns wrong-quadrant results for `mean_y < 0` and is ill-defined at
/// `mean_y == 0`. `Atan2` is the robust form and the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleFormula {
    /// Plain `atan(x/y)`, quadrant-blind.
    Atan,
    /// Quadrant-aware `atan2(x, y)`.
    #[default]
    Atan2,
}

/// Mean and population standard deviation of one probe axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation (N divisor).
    pub std: f64,
}

/// Reduced statistics of one sample batch, per probe axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    /// x-axis statistics.
    pub x: AxisStats,
    /// y-axis statistics.
    pub y: AxisStats,
    /// z-axis statistics.
    pub z: AxisStats,
}

impl FieldStats {
    /// Field magnitude from the batch means. Independent of the angle
    /// formulation: angles never feed back into the magnitude.
    pub fn magnitude(&self) -> f64 {
        (self.x.mean.powi(2) + self.y.mean.powi(2) + self.z.mean.powi(2)).sqrt()
    }

    /// Actual azimuthal angle in degrees.
    ///
    /// With [`AngleFormula::Atan2`] the result lies in (-180, 180] and is
    /// total (e.g. means (1, 0) give 90.0 exactly).
    pub fn act_phi(&self, formula: AngleFormula) -> f64 {
        match formula {
            AngleFormula::Atan2 => self.x.mean.atan2(self.y.mean) * RAD_TO_DEG,
            AngleFormula::Atan => (self.x.mean / self.y.mean).atan() * RAD_TO_DEG,
        }
    }

    /// Actual polar angle in degrees, in [-90, 90].
    pub fn act_theta(&self, formula: AngleFormula) -> f64 {
        let r = (self.x.mean.powi(2) + self.y.mean.powi(2)).sqrt();
        match formula {
            AngleFormula::Atan2 => self.z.mean.atan2(r) * RAD_TO_DEG,
            AngleFormula::Atan => (self.z.mean / r).atan() * RAD_TO_DEG,
        }
    }
}

/// The raw triples collected at one sweep point. Append-only; reduced once
/// and then discarded.
#[derive(Clone, Debug, Default)]
pub struct SampleBatch {
    xs: Vec<f64>,
    ys: Vec<f64>,
    zs: Vec<f64>,
}

impl SampleBatch {
    /// Pre-allocate for the configured number of averages.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            xs: Vec::with_capacity(n),
            ys: Vec::with_capacity(n),
            zs: Vec::with_capacity(n),
        }
    }

    /// Append one sample.
    pub fn push(&mut self, sample: FieldSample) {
        self.xs.push(sample.x);
        self.ys.push(sample.y);
        self.zs.push(sample.z);
    }

    /// Number of samples collected so far.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Reduce to per-axis mean and population standard deviation.
    ///
    /// The batch must hold at least one sample; the procedure guarantees
    /// `num_averages >= 1`.
    pub fn reduce(&self) -> FieldStats {
        FieldStats {
            x: axis_stats(&self.xs),
            y: axis_stats(&self.ys),
            z: axis_stats(&self.zs),
        }
    }
}

fn axis_stats(values: &[f64]) -> AxisStats {
    let mean = mean(values);
    AxisStats {
        mean,
        std: pop_std(values, mean),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn pop_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
