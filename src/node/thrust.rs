use tokio::sync::watch;

use super::{wait_for_shutdown, NodeError};
use crate::bus::{Bus, BusError, Publisher, ServiceServer, Subscriber};
use crate::config::ThrustConfig;
use crate::msg::{Float32MultiArray, Twist};
use crate::params::{self, Parameters, SetParameters, SetParametersResponse};
use crate::thrust::{MotorEffort, Saturation, ThrustAllocator};

/// Turns twists from the pilot into motor efforts.
pub struct ThrustNode {
    name: String,
    allocator: ThrustAllocator,
    saturation: Saturation,
    params: Parameters,
    twists: Subscriber<Twist>,
    motors: Publisher<Float32MultiArray>,
    param_requests: ServiceServer<SetParameters, SetParametersResponse>,
}

impl ThrustNode {
    pub fn new(
        bus: &Bus,
        config: &ThrustConfig,
        allocator: ThrustAllocator,
    ) -> Result<Self, NodeError> {
        let twists = bus.subscribe(&config.twist_topic)?;
        let motors = bus.publisher(&config.motors_topic)?;
        let param_requests = bus.advertise(&params::service_name(&config.node_name))?;

        let mut params = Parameters::default();
        params.declare("saturation", config.saturation.to_string());

        Ok(Self {
            name: config.node_name.clone(),
            allocator,
            saturation: config.saturation,
            params,
            twists,
            motors,
            param_requests,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn saturation(&self) -> Saturation {
        self.saturation
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Allocate `twist`, saturate it and publish the result on the motors topic.
    pub fn handle_twist(&self, twist: &Twist) -> Result<MotorEffort, NodeError> {
        let effort = self.allocator.allocate(twist)?;
        if !effort.is_within_range() {
            tracing::debug!(
                max = effort.max_magnitude(),
                saturation = %self.saturation,
                "motor effort out of range"
            );
        }

        let effort = effort.saturate(self.saturation);
        match self.motors.publish(effort.into()) {
            Ok(_) => {}
            Err(BusError::NoSubscribers { topic }) => {
                tracing::debug!(%topic, "no motor subscribers");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(effort)
    }

    pub fn handle_parameters(&mut self, request: SetParameters) -> SetParametersResponse {
        let results = request
            .parameters
            .iter()
            .map(|param| {
                let result = self.params.set(param, |param| match param.name.as_str() {
                    "saturation" => param
                        .value
                        .as_str()
                        .unwrap_or_default()
                        .parse::<Saturation>()
                        .map(drop)
                        .map_err(|e| e.to_string()),
                    _ => Ok(()),
                });

                if result.successful {
                    tracing::info!(node = %self.name, name = %param.name, value = %param.value, "parameter set");
                } else {
                    tracing::warn!(node = %self.name, name = %param.name, reason = %result.reason, "rejected parameter");
                }
                result
            })
            .collect();

        if let Some(saturation) = self
            .params
            .get("saturation")
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse().ok())
        {
            self.saturation = saturation;
        }

        SetParametersResponse { results }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        tracing::info!(
            node = %self.name,
            twist = self.twists.topic(),
            motors = self.motors.topic(),
            "thrust node started"
        );

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                twist = self.twists.recv() => match twist {
                    Ok(twist) => {
                        if let Err(e) = self.handle_twist(&twist) {
                            tracing::warn!(error = %e, "dropped twist");
                        }
                    }
                    Err(BusError::Lagged { topic, skipped }) => {
                        tracing::warn!(%topic, skipped, "twist subscriber lagged");
                    }
                    Err(e) => return Err(e.into()),
                },
                Some(request) = self.param_requests.recv() => {
                    let response = self.handle_parameters(request.request.clone());
                    request.respond(response);
                }
            }
        }

        tracing::info!(node = %self.name, "thrust node stopped");
        Ok(())
    }
}
