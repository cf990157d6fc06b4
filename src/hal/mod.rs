//! Hardware abstraction layer.

pub mod servo;
pub use servo::Servo;

/// Feature reports an [`ImuSensor`] can stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Report {
    GeomagneticRotationVector,
    Gyroscope,
    LinearAcceleration,
}

pub trait Actuator<T> {
    type Error;

    /// Output a percentage in [-1, 1].
    fn output(&mut self, output: T) -> Result<(), Self::Error>;
}

/// A 9-DOF IMU in its own frame (X right, Y forward, Z up).
pub trait ImuSensor {
    type Error;

    fn enable_feature(&mut self, report: Report) -> Result<(), Self::Error>;

    /// Rotation vector referenced to magnetic north as `[i, j, k, real]`.
    fn geomagnetic_quaternion(&mut self) -> Result<[f32; 4], Self::Error>;

    /// Angular velocity in rad/s.
    fn gyro(&mut self) -> Result<[f32; 3], Self::Error>;

    /// Acceleration with gravity removed, in m/s^2.
    fn linear_acceleration(&mut self) -> Result<[f32; 3], Self::Error>;
}

impl<T: ImuSensor + ?Sized> ImuSensor for &mut T {
    type Error = T::Error;

    fn enable_feature(&mut self, report: Report) -> Result<(), Self::Error> {
        (**self).enable_feature(report)
    }

    fn geomagnetic_quaternion(&mut self) -> Result<[f32; 4], Self::Error> {
        (**self).geomagnetic_quaternion()
    }

    fn gyro(&mut self) -> Result<[f32; 3], Self::Error> {
        (**self).gyro()
    }

    fn linear_acceleration(&mut self) -> Result<[f32; 3], Self::Error> {
        (**self).linear_acceleration()
    }
}
