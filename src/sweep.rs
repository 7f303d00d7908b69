//! Sweep-axis and setpoint generation.
//!
//! The angular grid is produced by inclusive arithmetic stepping: an axis
//! `[start, end]` with step `s` is enumerated as `arange(start, end + s, s)`,
//! so the endpoint is always captured (at the cost of occasionally producing
//! one point just past `end` when floating-point accumulation rounds up).
//! Output-file columns and plot axes depend on the resulting row-major
//! ordering, theta outer / phi inner.

use serde::{Deserialize, Serialize};

/// Half-open arithmetic range, mirroring `numpy.arange` semantics: the
/// length is fixed up front as `ceil((stop - start) / step)` and values are
/// computed as `start + i * step`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let span = (stop - start) / step;
    if !span.is_finite() || span <= 0.0 {
        return Vec::new();
    }
    let n = span.ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// A closed sweep range `[start, end]` with a fixed step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepAxis {
    /// First commanded value.
    pub start: f64,
    /// Last commanded value (inclusive).
    pub end: f64,
    /// Step between commanded values. Must be positive.
    pub step: f64,
}

impl SweepAxis {
    /// Create a new axis definition.
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    /// The ordered sample points of this axis, endpoint inclusive.
    pub fn points(&self) -> Vec<f64> {
        arange(self.start, self.end + self.step, self.step)
    }
}

/// One commanded magnet configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepPoint {
    /// Azimuthal angle in degrees.
    pub phi: f64,
    /// Polar angle in degrees.
    pub theta: f64,
}

/// The full angular grid: outer loop over theta, inner loop over phi.
#[derive(Clone, Debug)]
pub struct SweepGrid {
    phis: Vec<f64>,
    thetas: Vec<f64>,
}

impl SweepGrid {
    /// Build the grid from the two axis definitions.
    pub fn new(phi: &SweepAxis, theta: &SweepAxis) -> Self {
        Self {
            phis: phi.points(),
            thetas: theta.points(),
        }
    }

    /// Total number of commanded points.
    pub fn total_points(&self) -> usize {
        self.phis.len() * self.thetas.len()
    }

    /// Phi values of the inner loop.
    pub fn phis(&self) -> &[f64] {
        &self.phis
    }

    /// Theta values of the outer loop.
    pub fn thetas(&self) -> &[f64] {
        &self.thetas
    }

    /// Iterate the grid row-major by theta.
    pub fn iter(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        self.thetas.iter().flat_map(move |&theta| {
            self.phis.iter().map(move |&phi| SweepPoint { phi, theta })
        })
    }
}

/// Generate the setpoint list for a series sweep (field or voltage).
///
/// Uses a half-open arange so the final run lands exactly on `end`: when the
/// endpoint does not fall on the step grid it is appended once, e.g.
/// `setpoint_sweep(0.0, 1.0, 0.3)` yields `[0.0, 0.3, 0.6, 0.9, 1.0]`.
pub fn setpoint_sweep(start: f64, end: f64, step: f64) -> Vec<f64> {
    let mut values = arange(start, end, step);
    if !values.contains(&end) {
        values.push(end);
    }
    values
}

/// An explicitly named series sweep: which procedure parameter is swept and
/// the ordered values it takes, built directly by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepParameter {
    /// Procedure parameter being swept (e.g. `"field"`).
    pub name: String,
    /// Ordered setpoint values, one run per value.
    pub values: Vec<f64>,
}

impl SweepParameter {
    /// Build a named sweep from start/end/step with the endpoint patch.
    pub fn from_range(name: &str, start: f64, end: f64, step: f64) -> Self {
        Self {
            name: name.to_string(),
            values: setpoint_sweep(start, end, step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arange_half_open() {
        let v = arange(-10.0, 10.0, 1.0);
        assert_eq!(v.len(), 20);
        assert_eq!(v[0], -10.0);
        assert_eq!(v[19], 9.0);
    }

    #[test]
    fn test_arange_empty_for_inverted_range() {
        assert!(arange(1.0, 0.0, 0.5).is_empty());
        assert!(arange(0.0, 1.0, -0.5).is_empty());
    }

    #[test]
    fn test_axis_points_include_endpoint() {
        let axis = SweepAxis::new(0.0, 1.0, 0.25);
        let pts = axis.points();
        assert_eq!(pts, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_axis_points_monotonic_and_near_end() {
        let axis = SweepAxis::new(10.0, 13.0, 0.1);
        let pts = axis.points();
        assert_eq!(pts[0], 10.0);
        assert!(pts.windows(2).all(|w| w[1] > w[0]));
        // last value within one step of the endpoint, inclusive
        let last = *pts.last().unwrap();
        assert!(last >= axis.end - axis.step && last <= axis.end + axis.step);
    }

    #[test]
    fn test_grid_is_theta_outer_row_major() {
        let grid = SweepGrid::new(&SweepAxis::new(0.0, 1.0, 1.0), &SweepAxis::new(5.0, 6.0, 1.0));
        let order: Vec<(f64, f64)> = grid.iter().map(|p| (p.theta, p.phi)).collect();
        assert_eq!(
            order,
            vec![(5.0, 0.0), (5.0, 1.0), (6.0, 0.0), (6.0, 1.0)]
        );
        assert_eq!(grid.total_points(), 4);
    }

    #[test]
    fn test_setpoint_sweep_endpoint_patch() {
        let v = setpoint_sweep(0.0, 1.0, 0.3);
        assert_eq!(v.len(), 5);
        assert_eq!(v[0], 0.0);
        assert_eq!(*v.last().unwrap(), 1.0);
    }

    #[test]
    fn test_setpoint_sweep_on_grid_endpoint_once() {
        let v = setpoint_sweep(0.0, 2.0, 1.0);
        assert_eq!(v, vec![0.0, 1.0, 2.0]);
    }
}
