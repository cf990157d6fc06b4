use core::fmt::Debug;
use std::time::Duration;

use embedded_time::{duration::Microseconds, Clock};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::{wait_for_shutdown, NodeError};
use crate::bus::{Bus, Publisher};
use crate::config::ImuConfig;
use crate::hal::ImuSensor;
use crate::imu::Bno085;
use crate::msg::{Imu, Time};

/// Publishes IMU readings on `<hardware_location>/imu` at a fixed rate.
pub struct ImuNode<S, C> {
    imu: Bno085<S>,
    address: u8,
    clock: C,
    publisher: Publisher<Imu>,
    period: Duration,
}

impl<S, C> ImuNode<S, C>
where
    S: ImuSensor,
    S::Error: Debug,
    C: Clock<T = u32>,
{
    pub fn new(bus: &Bus, config: &ImuConfig, sensor: S, clock: C) -> Result<Self, NodeError> {
        let period = config
            .period()
            .ok_or(NodeError::InvalidRate(config.rate_hz))?;
        let imu = Bno085::new(sensor, config.frame_id.as_str())
            .map_err(|e| NodeError::Imu(e.to_string()))?;
        let publisher = bus.publisher(&config.topic())?;

        Ok(Self {
            imu,
            address: config.i2c_address,
            clock,
            publisher,
            period,
        })
    }

    pub fn topic(&self) -> &str {
        self.publisher.topic()
    }

    /// I2C address of the sensor.
    pub fn address(&self) -> u8 {
        self.address
    }

    fn now(&self) -> Result<Time, NodeError> {
        let instant = self.clock.try_now()?;
        let micros = Microseconds::<u32>::try_from(instant.duration_since_epoch())?;
        Ok(Time::from_micros(micros.0))
    }

    /// Read and publish one sample.
    ///
    /// Returns `None` if the sensor could not be read; publish failures are logged and
    /// the sample is still returned.
    pub fn tick(&mut self) -> Result<Option<Imu>, NodeError> {
        let stamp = self.now()?;
        let msg = match self.imu.read(stamp) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "IMU read failed");
                return Ok(None);
            }
        };

        if let Err(e) = self.publisher.publish(msg.clone()) {
            tracing::warn!(error = %e, "IMU failed to publish");
        }
        Ok(Some(msg))
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        tracing::info!(
            topic = self.topic(),
            address = format_args!("{:#x}", self.address),
            period = ?self.period,
            "IMU node started"
        );

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = interval.tick() => {
                    self.tick()?;
                }
            }
        }

        tracing::info!("IMU node stopped");
        Ok(())
    }
}
