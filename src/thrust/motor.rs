use nalgebra::{Vector3, Vector6};

/// 1/√3, the direction cosine of a thruster mounted along a cube diagonal.
pub const FRAC_1_SQRT_3: f64 = 0.577_350_269_189_625_8;

/// A thruster's contribution to each velocity axis per unit of effort.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Motor {
    /// Linear x, y, z contribution.
    pub thrust: Vector3<f64>,
    /// Angular x, y, z contribution.
    pub moment: Vector3<f64>,
}

impl Motor {
    pub fn new(thrust: Vector3<f64>, moment: Vector3<f64>) -> Self {
        Self { thrust, moment }
    }

    /// A vectored thruster whose axis lies along a cube diagonal: 45° off the bow in
    /// the horizontal plane and asin(1/√3) (about 35°) out of it.
    ///
    /// `signs` picks the diagonal and `moment` is given in units of 1/√3.
    pub fn vectored(signs: [i8; 3], moment: [i8; 3]) -> Self {
        let scale =
            |v: [i8; 3]| Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64) * FRAC_1_SQRT_3;
        Self::new(scale(signs), scale(moment))
    }

    /// Heading of the thrust axis in the horizontal plane, in degrees from the bow.
    pub fn heading_degrees(&self) -> f64 {
        self.thrust.y.atan2(self.thrust.x).to_degrees()
    }

    /// Angle of the thrust axis out of the horizontal plane, in degrees.
    pub fn elevation_degrees(&self) -> f64 {
        let horizontal = (self.thrust.x.powi(2) + self.thrust.y.powi(2)).sqrt();
        self.thrust.z.atan2(horizontal).to_degrees()
    }

    /// The motor's column of the configuration matrix.
    pub fn column(&self) -> Vector6<f64> {
        Vector6::new(
            self.thrust.x,
            self.thrust.y,
            self.thrust.z,
            self.moment.x,
            self.moment.y,
            self.moment.z,
        )
    }
}

/// Seahawk's thrusters, in motor index order.
///
/// Even motors are on the bottom, odd motors on top (thrust forward is up):
/// ```text
///  bottom     top
///  ^FRONT^   ^FRONT^
///  6/. .\0    7   1
///  4\^ ^/2    5   3
/// ```
pub fn seahawk_motors() -> [Motor; 8] {
    [
        Motor::vectored([1, -1, 1], [1, -2, -3]),
        Motor::vectored([1, 1, 1], [-1, -2, 3]),
        Motor::vectored([1, -1, -1], [-1, 2, -3]),
        Motor::vectored([1, 1, -1], [1, 2, 3]),
        Motor::vectored([-1, -1, 1], [1, 2, 3]),
        Motor::vectored([-1, 1, 1], [-1, 2, -3]),
        Motor::vectored([-1, -1, -1], [-1, -2, 3]),
        Motor::vectored([-1, 1, -1], [1, -2, -3]),
    ]
}
