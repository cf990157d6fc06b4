//! Thruster allocation: distribute a body twist across the vehicle's eight thrusters.
//!
//! The [`ThrustAllocator`] owns a fixed 6x8 configuration matrix (one column per
//! motor, see [`Motor::column`]) and its Moore-Penrose pseudo-inverse, which is computed
//! once on construction. Each [`allocate`](ThrustAllocator::allocate) is then a single
//! matrix-vector product.

use core::fmt;
use core::ops::Index;
use core::str::FromStr;

use nalgebra::{SMatrix, SVector, Vector6, SVD};
use serde::Deserialize;
use thiserror::Error;

use crate::msg::{Axis, Float32MultiArray, Twist};

mod motor;
pub use motor::{seahawk_motors, Motor, FRAC_1_SQRT_3};

pub const MOTOR_COUNT: usize = 8;

/// Relative cutoff below which singular values are treated as zero.
pub const RCOND: f64 = 1e-15;

/// Rows are linear x, y, z then angular x, y, z. Columns are motors.
pub type MotorConfigMatrix = SMatrix<f64, 6, MOTOR_COUNT>;

pub type AllocationMatrix = SMatrix<f64, MOTOR_COUNT, 6>;

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("twist {axis} is not finite ({value})")]
    NonFinite { axis: Axis, value: f64 },

    #[error("effort for motor {motor} overflowed")]
    Overflow { motor: usize },

    #[error("motor configuration entry ({row}, {col}) is not finite")]
    NonFiniteConfig { row: usize, col: usize },

    #[error("singular value decomposition did not converge")]
    NoConvergence,

    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(&'static str),
}

/// Normalized per-motor effort, nominally in -1 ~ +1, in motor index order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorEffort(pub SVector<f64, MOTOR_COUNT>);

impl MotorEffort {
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    /// Largest absolute effort across all motors.
    pub fn max_magnitude(&self) -> f64 {
        self.0.iter().fold(0., |max, effort| effort.abs().max(max))
    }

    pub fn is_within_range(&self) -> bool {
        self.max_magnitude() <= 1.
    }

    pub fn saturate(self, saturation: Saturation) -> Self {
        match saturation {
            Saturation::None => self,
            Saturation::Clamp => Self(self.0.map(|effort| effort.clamp(-1., 1.))),
            Saturation::Scale => {
                let max = self.max_magnitude();
                if !max.is_finite() {
                    self.saturate(Saturation::Clamp)
                } else if max > 1. {
                    Self(self.0 / max)
                } else {
                    self
                }
            }
        }
    }
}

impl Index<usize> for MotorEffort {
    type Output = f64;

    fn index(&self, motor: usize) -> &f64 {
        &self.0[motor]
    }
}

impl From<MotorEffort> for Float32MultiArray {
    fn from(effort: MotorEffort) -> Self {
        Self {
            data: effort.iter().map(|&effort| effort as f32).collect(),
        }
    }
}

/// How efforts outside -1 ~ +1 are brought back into range before they reach the motors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Saturation {
    /// Pass efforts through untouched; the motor drivers saturate.
    #[default]
    None,
    /// Clamp each motor independently.
    Clamp,
    /// Scale every motor by the largest magnitude, keeping the commanded direction.
    Scale,
}

impl fmt::Display for Saturation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Saturation::None => "none",
            Saturation::Clamp => "clamp",
            Saturation::Scale => "scale",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown saturation `{0}` (expected none, clamp or scale)")]
pub struct ParseSaturationError(String);

impl FromStr for Saturation {
    type Err = ParseSaturationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Saturation::None),
            "clamp" => Ok(Saturation::Clamp),
            "scale" => Ok(Saturation::Scale),
            _ => Err(ParseSaturationError(s.to_owned())),
        }
    }
}

/// Maps body twists onto motor efforts through the pseudo-inverse of the motor configuration.
#[derive(Clone, Debug)]
pub struct ThrustAllocator {
    config: MotorConfigMatrix,
    allocation: AllocationMatrix,
}

impl ThrustAllocator {
    /// Create an allocator for Seahawk's thruster layout.
    ///
    /// ```
    /// use seahawk::{msg::Twist, ThrustAllocator};
    ///
    /// let allocator = ThrustAllocator::new().unwrap();
    /// let effort = allocator.allocate(&Twist::default()).unwrap();
    /// assert!(effort.iter().all(|&e| e == 0.));
    /// ```
    pub fn new() -> Result<Self, AllocationError> {
        Self::from_motors(&seahawk_motors())
    }

    pub fn from_motors(motors: &[Motor; MOTOR_COUNT]) -> Result<Self, AllocationError> {
        let columns: Vec<_> = motors.iter().map(Motor::column).collect();
        Self::from_config(MotorConfigMatrix::from_columns(&columns))
    }

    pub fn from_config(config: MotorConfigMatrix) -> Result<Self, AllocationError> {
        for col in 0..MOTOR_COUNT {
            for row in 0..6 {
                if !config[(row, col)].is_finite() {
                    return Err(AllocationError::NonFiniteConfig { row, col });
                }
            }
        }

        let allocation = pseudo_inverse(&config, RCOND)?;
        tracing::debug!(%allocation, "computed thrust allocation matrix");

        Ok(Self { config, allocation })
    }

    pub fn config(&self) -> &MotorConfigMatrix {
        &self.config
    }

    pub fn allocation(&self) -> &AllocationMatrix {
        &self.allocation
    }

    /// Calculate the effort on each motor needed to command `twist`.
    ///
    /// The result is not saturated (see [`MotorEffort::saturate`]). A twist large enough
    /// to overflow any effort is rejected.
    pub fn allocate(&self, twist: &Twist) -> Result<MotorEffort, AllocationError> {
        let twist = twist.to_vector();
        if let Some((axis, &value)) = Axis::ALL
            .iter()
            .zip(twist.iter())
            .find(|(_, value)| !value.is_finite())
        {
            return Err(AllocationError::NonFinite { axis: *axis, value });
        }

        let effort = self.allocation * twist;
        if let Some(motor) = effort.iter().position(|effort| !effort.is_finite()) {
            return Err(AllocationError::Overflow { motor });
        }

        Ok(MotorEffort(effort))
    }

    /// The twist produced by driving the motors at `effort`.
    pub fn achieved(&self, effort: &MotorEffort) -> Twist {
        Twist::from_vector(&(self.config * effort.0))
    }
}

/// SVD pseudo-inverse with a cutoff relative to the largest singular value.
fn pseudo_inverse(
    config: &MotorConfigMatrix,
    rcond: f64,
) -> Result<AllocationMatrix, AllocationError> {
    let svd = SVD::try_new(*config, true, true, f64::EPSILON, 0)
        .ok_or(AllocationError::NoConvergence)?;

    let largest = svd
        .singular_values
        .iter()
        .fold(0., |max: f64, &value| max.max(value));

    svd.pseudo_inverse(rcond * largest)
        .map_err(AllocationError::PseudoInverse)
}

/// Singular values of the motor configuration, largest first.
pub fn singular_values(config: &MotorConfigMatrix) -> Vector6<f64> {
    let mut values = config.singular_values();
    values
        .as_mut_slice()
        .sort_by(|a, b| b.partial_cmp(a).unwrap_or(core::cmp::Ordering::Equal));
    values
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{SMatrix, Vector3, Vector6};

    use super::{
        singular_values, AllocationError, MotorConfigMatrix, MotorEffort, Saturation,
        ThrustAllocator, FRAC_1_SQRT_3,
    };
    use crate::msg::{Axis, Twist};

    fn allocator() -> ThrustAllocator {
        ThrustAllocator::new().unwrap()
    }

    fn twist(v: [f64; 6]) -> Twist {
        Twist::from(v)
    }

    #[test]
    fn config_matches_layout() {
        let r = FRAC_1_SQRT_3;
        #[rustfmt::skip]
        let expected = MotorConfigMatrix::from_row_slice(&[
            r, r, r, r, -r, -r, -r, -r,
            -r, r, -r, r, -r, r, -r, r,
            r, r, -r, -r, r, r, -r, -r,
            r, -r, -r, r, r, -r, -r, r,
            -2. * r, -2. * r, 2. * r, 2. * r, 2. * r, 2. * r, -2. * r, -2. * r,
            -1. / r, 1. / r, -1. / r, 1. / r, 1. / r, -1. / r, 1. / r, -1. / r,
        ]);
        assert_relative_eq!(*allocator().config(), expected, epsilon = 1e-12);
    }

    #[test]
    fn config_has_full_row_rank() {
        let values = singular_values(allocator().config());
        assert_relative_eq!(values[0], 24f64.sqrt(), epsilon = 1e-12);
        assert!(values.iter().all(|&v| v > 1.));
    }

    #[test]
    fn zero_twist_rests_motors() {
        let effort = allocator().allocate(&Twist::default()).unwrap();
        assert_eq!(effort, MotorEffort::zeros());
    }

    #[test]
    fn linearity() {
        let allocator = allocator();
        let t = Vector6::new(0.3, -0.2, 0.5, 0.1, -0.4, 0.25);
        let k = 2.5;

        let scaled = allocator.allocate(&Twist::from_vector(&(t * k))).unwrap();
        let effort = allocator.allocate(&Twist::from_vector(&t)).unwrap();
        assert_relative_eq!(scaled.0, effort.0 * k, epsilon = 1e-12);
    }

    #[test]
    fn superposition() {
        let allocator = allocator();
        let a = Vector6::new(0.7, 0., -0.1, 0.2, 0., -0.6);
        let b = Vector6::new(-0.2, 0.4, 0.9, 0., 0.3, 0.1);

        let sum = allocator.allocate(&Twist::from_vector(&(a + b))).unwrap();
        let ea = allocator.allocate(&Twist::from_vector(&a)).unwrap();
        let eb = allocator.allocate(&Twist::from_vector(&b)).unwrap();
        assert_relative_eq!(sum.0, ea.0 + eb.0, epsilon = 1e-12);
    }

    #[test]
    fn surge_is_mirrored_left_to_right() {
        let effort = allocator().allocate(&twist([1., 0., 0., 0., 0., 0.])).unwrap();
        let magnitude = 3f64.sqrt() / 8.;

        for motor in 0..4 {
            // Right side motors 0-3 are mirrored by left side motors 4-7.
            assert_relative_eq!(effort[motor], magnitude, epsilon = 1e-12);
            assert_relative_eq!(effort[motor + 4], -effort[motor], epsilon = 1e-12);
        }
    }

    #[test]
    fn yaw_alternates_between_bottom_and_top() {
        let effort = allocator().allocate(&twist([0., 0., 0., 0., 0., 1.])).unwrap();
        let magnitude = 3f64.sqrt() / 24.;

        for motor in 0..8 {
            assert_relative_eq!(effort[motor].abs(), magnitude, epsilon = 1e-12);
        }
        for bottom in (0..8).step_by(2) {
            assert_relative_eq!(effort[bottom], -effort[bottom + 1], epsilon = 1e-12);
        }
        let bottom_sum: f64 = (0..8).step_by(2).map(|motor| effort[motor]).sum();
        assert_relative_eq!(bottom_sum, 0., epsilon = 1e-12);
    }

    #[test]
    fn round_trip() {
        let allocator = allocator();
        let identity = allocator.config() * allocator.allocation();
        assert_relative_eq!(identity, SMatrix::<f64, 6, 6>::identity(), epsilon = 1e-12);

        let twist = Twist::new(Vector3::new(0.2, -0.8, 0.4), Vector3::new(-0.1, 0.05, 0.9));
        let effort = allocator.allocate(&twist).unwrap();
        let achieved = allocator.achieved(&effort);
        assert_relative_eq!(achieved.linear, twist.linear, epsilon = 1e-12);
        assert_relative_eq!(achieved.angular, twist.angular, epsilon = 1e-12);
    }

    #[test]
    fn deterministic() {
        let allocator = allocator();
        let twist = twist([0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(
            allocator.allocate(&twist).unwrap(),
            allocator.allocate(&twist).unwrap()
        );
    }

    #[test]
    fn rejects_non_finite_twist() {
        let err = allocator()
            .allocate(&twist([0., 0., f64::NAN, 0., 0., 0.]))
            .unwrap_err();
        assert!(matches!(
            err,
            AllocationError::NonFinite {
                axis: Axis::LinearZ,
                ..
            }
        ));

        let err = allocator()
            .allocate(&twist([0., 0., 0., 0., 0., f64::INFINITY]))
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::NonFinite {
                axis: Axis::AngularZ,
                value: f64::INFINITY
            }
        );
    }

    #[test]
    fn rejects_overflowing_twist() {
        // Every term of motor 0's row adds up, past f64::MAX.
        let max = f64::MAX;
        let err = allocator()
            .allocate(&twist([max, -max, max, max, -max, -max]))
            .unwrap_err();
        assert!(matches!(err, AllocationError::Overflow { .. }));

        let huge = allocator().allocate(&twist([1e300, 0., 0., 0., 0., 0.])).unwrap();
        let scaled = huge.saturate(Saturation::Scale);
        assert!(scaled.iter().all(|e| e.is_finite()));
        assert_relative_eq!(scaled.max_magnitude(), 1., epsilon = 1e-12);
    }

    #[test]
    fn scale_falls_back_to_clamp_when_unbounded() {
        let mut effort = MotorEffort::zeros();
        effort.0[0] = f64::INFINITY;
        effort.0[5] = -0.5;

        let scaled = effort.saturate(Saturation::Scale);
        assert_eq!(scaled[0], 1.);
        assert_eq!(scaled[5], -0.5);
        assert!(scaled.iter().all(|e| e.is_finite()));
    }

    #[test]
    fn rejects_non_finite_config() {
        let mut config = *allocator().config();
        config[(4, 2)] = f64::NAN;
        assert_eq!(
            ThrustAllocator::from_config(config).unwrap_err(),
            AllocationError::NonFiniteConfig { row: 4, col: 2 }
        );
    }

    #[test]
    fn rank_deficient_config_gives_least_squares() {
        // Only motors 0 and 1 exist and both push along surge.
        let mut config = MotorConfigMatrix::zeros();
        config[(0, 0)] = 1.;
        config[(0, 1)] = 1.;
        let allocator = ThrustAllocator::from_config(config).unwrap();

        let effort = allocator.allocate(&twist([1., 1., 0., 0., 0., 0.])).unwrap();
        // Minimum norm: split surge evenly, ignore the unreachable sway.
        assert_relative_eq!(effort[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(effort[1], 0.5, epsilon = 1e-12);
        for motor in 2..8 {
            assert_relative_eq!(effort[motor], 0., epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_config_allocates_nothing() {
        let allocator = ThrustAllocator::from_config(MotorConfigMatrix::zeros()).unwrap();
        let effort = allocator.allocate(&twist([1., 2., 3., 4., 5., 6.])).unwrap();
        assert_eq!(effort, MotorEffort::zeros());
    }

    #[test]
    fn aggressive_command_leaves_range() {
        let effort = allocator().allocate(&twist([8., 0., 0., 0., 0., 0.])).unwrap();
        assert!(!effort.is_within_range());
        assert_relative_eq!(effort.max_magnitude(), 3f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn saturation() {
        let effort = allocator().allocate(&twist([8., 0., 0., 0., 0., 0.])).unwrap();

        assert_eq!(effort.saturate(Saturation::None), effort);

        let clamped = effort.saturate(Saturation::Clamp);
        assert!(clamped.iter().all(|&e| e.abs() == 1.));

        let mixed = allocator()
            .allocate(&twist([8., 0., 0., 0., 0., 2.]))
            .unwrap()
            .saturate(Saturation::Scale);
        assert_relative_eq!(mixed.max_magnitude(), 1., epsilon = 1e-12);

        let small = allocator().allocate(&twist([0.5, 0., 0., 0., 0., 0.])).unwrap();
        assert_eq!(small.saturate(Saturation::Scale), small);
    }

    #[test]
    fn parse_saturation() {
        assert_eq!("Clamp".parse(), Ok(Saturation::Clamp));
        assert_eq!(" scale ".parse(), Ok(Saturation::Scale));
        assert!("saturate".parse::<Saturation>().is_err());
        assert_eq!(Saturation::default().to_string(), "none");
    }

    #[test]
    fn motors_message_in_motor_order() {
        let effort = allocator().allocate(&twist([1., 0., 0., 0., 0., 0.])).unwrap();
        let msg = crate::msg::Float32MultiArray::from(effort);
        assert_eq!(msg.data.len(), 8);
        assert!(msg.data[..4].iter().all(|&e| e > 0.));
        assert!(msg.data[4..].iter().all(|&e| e < 0.));
    }
}
