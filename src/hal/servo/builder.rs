use embedded_hal::PwmPin;

use super::Servo;

pub struct Builder<T> {
    min: T,
    max: Option<T>,
}

impl<T: Default> Default for Builder<T> {
    fn default() -> Self {
        Self {
            min: T::default(),
            max: None,
        }
    }
}

impl<T> Builder<T> {
    /// Duty for a -1 command.
    pub fn min(mut self, min: T) -> Self {
        self.min = min;
        self
    }

    /// Duty for a +1 command, defaults to the pin's maximum duty.
    pub fn max(mut self, max: T) -> Self {
        self.max = Some(max);
        self
    }

    pub fn build<P>(self, pin: P) -> Servo<P>
    where
        P: PwmPin<Duty = T>,
    {
        Servo {
            min: self.min,
            max: self.max.unwrap_or_else(|| pin.get_max_duty()),
            pin,
        }
    }
}
