use embedded_hal::PwmPin;
use num_traits::{Num, NumCast};
use tokio::sync::watch;

use super::{wait_for_shutdown, NodeError};
use crate::bus::{Bus, BusError, Subscriber};
use crate::config::ServoConfig;
use crate::hal::servo::ServoError;
use crate::hal::{Actuator, Servo};
use crate::msg::Float32;

/// Positions the camera servo from commands in [-1, 1].
pub struct ServoNode<P: PwmPin> {
    name: String,
    servo: Servo<P>,
    commands: Subscriber<Float32>,
}

impl<P> ServoNode<P>
where
    P: PwmPin,
    P::Duty: Num + NumCast + Copy,
{
    /// Enable the servo and center it before the first command arrives.
    pub fn new(bus: &Bus, config: &ServoConfig, mut servo: Servo<P>) -> Result<Self, NodeError> {
        let commands = bus.subscribe(&config.topic)?;
        servo.enable();
        servo.center();

        Ok(Self {
            name: config.node_name.clone(),
            servo,
            commands,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn servo(&self) -> &Servo<P> {
        &self.servo
    }

    pub fn handle_command(&mut self, command: Float32) -> Result<(), ServoError> {
        self.servo.output(command.data)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        tracing::info!(node = %self.name, topic = self.commands.topic(), "servo node started");

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                command = self.commands.recv() => match command {
                    Ok(command) => {
                        if let Err(e) = self.handle_command(command) {
                            tracing::warn!(error = %e, command = command.data, "ignored servo command");
                        }
                    }
                    Err(BusError::Lagged { topic, skipped }) => {
                        tracing::warn!(%topic, skipped, "servo subscriber lagged");
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        tracing::info!(node = %self.name, "servo node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ServoNode;
    use crate::bus::Bus;
    use crate::config::ServoConfig;
    use crate::hal::servo::tests::MockPin;
    use crate::hal::servo::ServoError;
    use crate::hal::Servo;
    use crate::msg::Float32;
    use crate::node::shutdown_signal;

    fn node(bus: &Bus) -> ServoNode<MockPin> {
        let config = ServoConfig::default();
        let servo = Servo::<MockPin>::builder()
            .min(config.min_pulse)
            .max(config.max_pulse)
            .build(MockPin::default());
        ServoNode::new(bus, &config, servo).unwrap()
    }

    #[test]
    fn centers_on_start() {
        let node = node(&Bus::default());
        assert_eq!(node.name(), "logic_tube_servo");
        assert_eq!(node.servo().duty(), 1500);
    }

    #[test]
    fn commands() {
        let mut node = node(&Bus::default());

        node.handle_command(Float32 { data: -0.5 }).unwrap();
        assert_eq!(node.servo().duty(), 750);

        assert_eq!(
            node.handle_command(Float32 { data: f32::INFINITY }),
            Err(ServoError::InvalidOutput)
        );
        assert_eq!(node.servo().duty(), 750);
    }

    #[tokio::test]
    async fn run_until_shutdown() {
        let bus = Bus::default();
        let node = node(&bus);
        let commands = bus.publisher::<Float32>("camera_control").unwrap();
        let (shutdown, signal) = shutdown_signal();
        let handle = tokio::spawn(node.run(signal));

        commands.publish(Float32 { data: 1. }).unwrap();
        commands.publish(Float32 { data: f32::NAN }).unwrap();
        tokio::task::yield_now().await;

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
