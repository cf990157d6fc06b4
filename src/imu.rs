//! BNO085 orientation sensor readings as ROS `Imu` messages.

use nalgebra::{Quaternion, Vector3};
use thiserror::Error;

use crate::hal::{ImuSensor, Report};
use crate::msg::{Header, Imu, Time};

/// Default I2C address of the BNO085 breakout.
pub const DEFAULT_ADDRESS: u8 = 0x4a;

pub const DEFAULT_FRAME_ID: &str = "base_link";

/// Reports enabled on startup.
pub const REPORTS: [Report; 3] = [
    Report::GeomagneticRotationVector,
    Report::Gyroscope,
    Report::LinearAcceleration,
];

#[derive(Debug, Error, PartialEq)]
pub enum ImuError<E> {
    #[error("failed to enable {report:?} report: {cause:?}")]
    Enable { report: Report, cause: E },

    #[error("sensor read failed: {0:?}")]
    Read(E),
}

/// Sensor axes are X right, Y forward, Z up. ROS axes are X forward, Y left, Z up.
fn to_ros_frame(v: [f32; 3]) -> Vector3<f64> {
    Vector3::new(v[1] as f64, -v[0] as f64, v[2] as f64)
}

fn quaternion_to_ros_frame(q: [f32; 4]) -> Quaternion<f64> {
    let [i, j, k, real] = q;
    Quaternion::new(real as f64, j as f64, -i as f64, k as f64)
}

pub struct Bno085<S> {
    sensor: S,
    frame_id: String,
}

impl<S> Bno085<S>
where
    S: ImuSensor,
{
    /// Enable the rotation vector, gyroscope and linear acceleration reports.
    pub fn new(mut sensor: S, frame_id: impl Into<String>) -> Result<Self, ImuError<S::Error>> {
        for report in REPORTS {
            sensor
                .enable_feature(report)
                .map_err(|cause| ImuError::Enable { report, cause })?;
        }

        Ok(Self {
            sensor,
            frame_id: frame_id.into(),
        })
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Read the sensor into an `Imu` message stamped with `stamp`.
    pub fn read(&mut self, stamp: Time) -> Result<Imu, ImuError<S::Error>> {
        let orientation = self.sensor.geomagnetic_quaternion().map_err(ImuError::Read)?;
        let gyro = self.sensor.gyro().map_err(ImuError::Read)?;
        let acceleration = self.sensor.linear_acceleration().map_err(ImuError::Read)?;

        Ok(Imu {
            header: Header {
                stamp,
                frame_id: self.frame_id.clone(),
            },
            orientation: quaternion_to_ros_frame(orientation),
            angular_velocity: to_ros_frame(gyro),
            linear_acceleration: to_ros_frame(acceleration),
        })
    }

    pub fn release(self) -> S {
        self.sensor
    }
}
