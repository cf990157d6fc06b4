mod builder;

pub use builder::Builder;
use embedded_hal::PwmPin;
use num_traits::{clamp, Float, Num, NumCast, One};
use thiserror::Error;

use crate::hal::Actuator;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServoError {
    #[error("servo command is not finite")]
    InvalidOutput,

    #[error("servo duty does not fit the pin's duty type")]
    DutyOutOfRange,
}

/// Linearly map `value` from `in_min..in_max` onto `out_min..out_max`.
pub fn lerp<T: Float>(in_min: T, in_max: T, out_min: T, out_max: T, value: T) -> T {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

/// A PWM driven servo, positioned by a command in [-1, 1].
pub struct Servo<P: PwmPin> {
    min: P::Duty,
    max: P::Duty,
    pin: P,
}

impl<P> Servo<P>
where
    P: PwmPin,
    P::Duty: Copy,
{
    pub fn new(min: P::Duty, max: P::Duty, pin: P) -> Self {
        Self { min, max, pin }
    }

    pub fn builder() -> Builder<P::Duty>
    where
        P::Duty: Default,
    {
        Builder::default()
    }

    pub fn duty(&self) -> P::Duty {
        self.pin.get_duty()
    }

    pub fn range(&self) -> (P::Duty, P::Duty) {
        (self.min, self.max)
    }

    pub fn enable(&mut self) {
        self.pin.enable();
    }

    /// Drive the servo to the middle of its range.
    pub fn center(&mut self)
    where
        P::Duty: Num,
    {
        let two = <P::Duty as One>::one() + <P::Duty as One>::one();
        self.pin.set_duty(self.min + (self.max - self.min) / two);
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P, U> Actuator<U> for Servo<P>
where
    P: PwmPin,
    P::Duty: NumCast + Copy,
    U: Float,
{
    type Error = ServoError;

    /// Commands outside [-1, 1] are clamped to the ends of the range.
    fn output(&mut self, output: U) -> Result<(), ServoError> {
        if !output.is_finite() {
            return Err(ServoError::InvalidOutput);
        }

        let min: U = NumCast::from(self.min).ok_or(ServoError::DutyOutOfRange)?;
        let max: U = NumCast::from(self.max).ok_or(ServoError::DutyOutOfRange)?;

        let output = clamp(output, -U::one(), U::one());
        let duty = lerp(-U::one(), U::one(), min, max, output);
        let duty = <P::Duty as NumCast>::from(duty).ok_or(ServoError::DutyOutOfRange)?;
        self.pin.set_duty(duty);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use embedded_hal::PwmPin;

    use super::{lerp, Servo, ServoError};
    use crate::hal::Actuator;

    /// A pin that records the last duty, in microseconds of pulse width.
    #[derive(Debug, Default)]
    pub struct MockPin {
        pub duty: u16,
        pub enabled: bool,
    }

    impl PwmPin for MockPin {
        type Duty = u16;

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            u16::MAX
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    fn camera_servo() -> Servo<MockPin> {
        Servo::<MockPin>::builder()
            .min(0)
            .max(3000)
            .build(MockPin::default())
    }

    #[test]
    fn lerp_maps_ranges() {
        assert_eq!(lerp(-1., 1., 0., 3000., 0.), 1500.);
        assert_eq!(lerp(-1., 1., 0., 3000., -1.), 0.);
        assert_eq!(lerp(0., 10., 100., 200., 2.5), 125.);
    }

    #[test]
    fn center() {
        let mut servo = camera_servo();
        servo.center();
        assert_eq!(servo.duty(), 1500);
    }

    #[test]
    fn output_maps_onto_pulse_range() {
        let mut servo = camera_servo();

        servo.output(0.5f32).unwrap();
        assert_eq!(servo.duty(), 2250);

        servo.output(-1.0f32).unwrap();
        assert_eq!(servo.duty(), 0);

        servo.output(1.0f64).unwrap();
        assert_eq!(servo.duty(), 3000);
    }

    #[test]
    fn output_is_clamped() {
        let mut servo = camera_servo();

        servo.output(4.0f32).unwrap();
        assert_eq!(servo.duty(), 3000);

        servo.output(-2.5f32).unwrap();
        assert_eq!(servo.duty(), 0);
    }

    #[test]
    fn rejects_nan() {
        let mut servo = camera_servo();
        servo.center();
        assert_eq!(servo.output(f32::NAN), Err(ServoError::InvalidOutput));
        assert_eq!(servo.duty(), 1500);
    }

    #[test]
    fn builder_defaults_to_max_duty() {
        let servo = Servo::<MockPin>::builder().build(MockPin::default());
        assert_eq!(servo.range(), (0, u16::MAX));
    }
}
