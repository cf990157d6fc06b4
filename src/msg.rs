//! Message types carried on the [`Bus`](crate::bus::Bus).
//!
//! These mirror the ROS2 `geometry_msgs`, `sensor_msgs` and `std_msgs` layouts the
//! surface station and the ROV exchange.

use core::fmt;

use nalgebra::{Quaternion, Vector3, Vector6};

/// A message that can be sent over a topic.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Message for T {}

/// One axis of a [`Twist`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    LinearX,
    LinearY,
    LinearZ,
    AngularX,
    AngularY,
    AngularZ,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::LinearX,
        Axis::LinearY,
        Axis::LinearZ,
        Axis::AngularX,
        Axis::AngularY,
        Axis::AngularZ,
    ];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::LinearX => "linear.x",
            Axis::LinearY => "linear.y",
            Axis::LinearZ => "linear.z",
            Axis::AngularX => "angular.x",
            Axis::AngularY => "angular.y",
            Axis::AngularZ => "angular.z",
        };
        f.write_str(name)
    }
}

/// Desired body velocity: linear (surge, sway, heave) and angular (roll, pitch, yaw rates).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Twist {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

impl Twist {
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Stack the twist as `[vx, vy, vz, wx, wy, wz]`.
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        )
    }

    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self {
            linear: Vector3::new(v[0], v[1], v[2]),
            angular: Vector3::new(v[3], v[4], v[5]),
        }
    }
}

impl From<[f64; 6]> for Twist {
    fn from(v: [f64; 6]) -> Self {
        Self {
            linear: Vector3::new(v[0], v[1], v[2]),
            angular: Vector3::new(v[3], v[4], v[5]),
        }
    }
}

/// `std_msgs/Float32`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Float32 {
    pub data: f32,
}

/// `std_msgs/Float32MultiArray`, without the layout description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Float32MultiArray {
    pub data: Vec<f32>,
}

/// Seconds and nanoseconds since the clock's epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Time {
    pub sec: u32,
    pub nanosec: u32,
}

impl Time {
    pub fn from_micros(micros: u32) -> Self {
        Self {
            sec: micros / 1_000_000,
            nanosec: (micros % 1_000_000) * 1_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// `sensor_msgs/Imu` in the ROS body frame (X forward, Y left, Z up).
#[derive(Clone, Debug, PartialEq)]
pub struct Imu {
    pub header: Header,
    pub orientation: Quaternion<f64>,
    /// rad/s
    pub angular_velocity: Vector3<f64>,
    /// m/s^2, gravity removed
    pub linear_acceleration: Vector3<f64>,
}

impl Default for Imu {
    fn default() -> Self {
        Self {
            header: Header::default(),
            orientation: Quaternion::identity(),
            angular_velocity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector6;

    use super::{Time, Twist};

    #[test]
    fn twist_vector_order() {
        let twist = Twist::from([1., 2., 3., 4., 5., 6.]);
        assert_eq!(twist.to_vector(), Vector6::new(1., 2., 3., 4., 5., 6.));
        assert_eq!(Twist::from_vector(&twist.to_vector()), twist);
    }

    #[test]
    fn time_from_micros() {
        let time = Time::from_micros(3_250_001);
        assert_eq!(time.sec, 3);
        assert_eq!(time.nanosec, 250_001_000);
    }
}
