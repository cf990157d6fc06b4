//! Node parameters and the `set_parameters` service.
//!
//! A node declares its parameters in a [`Parameters`] store and answers
//! [`SetParameters`] requests on `/<node>/set_parameters`. Another node changes them
//! through [`RemoteParams`], which batches updates and sends them in one request.

use core::fmt;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::bus::{Bus, BusError, ServiceClient};

#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl ParameterValue {
    /// Parse a command line value as a bool, integer, double, or string, in that order.
    pub fn parse(s: &str) -> Self {
        if let Ok(value) = s.parse() {
            ParameterValue::Bool(value)
        } else if let Ok(value) = s.parse() {
            ParameterValue::Integer(value)
        } else if let Ok(value) = s.parse() {
            ParameterValue::Double(value)
        } else {
            ParameterValue::String(s.to_owned())
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Double(_) => "double",
            ParameterValue::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParameterValue::Double(value) => Some(value),
            ParameterValue::Integer(value) => Some(value as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(value) => write!(f, "{value}"),
            ParameterValue::Integer(value) => write!(f, "{value}"),
            ParameterValue::Double(value) => write!(f, "{value}"),
            ParameterValue::String(value) => f.write_str(value),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Double(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_owned())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::String(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// `rcl_interfaces/SetParameters` request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetParameters {
    pub parameters: Vec<Parameter>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetParametersResult {
    pub successful: bool,
    pub reason: String,
}

impl SetParametersResult {
    pub fn success() -> Self {
        Self {
            successful: true,
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            reason: reason.into(),
        }
    }
}

/// `rcl_interfaces/SetParameters` response, one result per requested parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetParametersResponse {
    pub results: Vec<SetParametersResult>,
}

impl SetParametersResponse {
    pub fn all_successful(&self) -> bool {
        self.results.iter().all(|result| result.successful)
    }
}

/// Name of the service that sets `node`'s parameters.
pub fn service_name(node: &str) -> String {
    format!("/{}/set_parameters", node.trim_start_matches('/'))
}

/// A node's declared parameters.
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    values: BTreeMap<String, ParameterValue>,
}

impl Parameters {
    pub fn declare(&mut self, name: impl Into<String>, default: impl Into<ParameterValue>) {
        self.values.insert(name.into(), default.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Set a declared parameter if it keeps its type and `validate` accepts it.
    pub fn set<F>(&mut self, param: &Parameter, validate: F) -> SetParametersResult
    where
        F: FnOnce(&Parameter) -> Result<(), String>,
    {
        let Some(current) = self.values.get_mut(&param.name) else {
            return SetParametersResult::failure(format!(
                "parameter `{}` is not declared",
                param.name
            ));
        };

        if current.type_name() != param.value.type_name() {
            return SetParametersResult::failure(format!(
                "parameter `{}` expects a {}, got a {}",
                param.name,
                current.type_name(),
                param.value.type_name()
            ));
        }

        if let Err(reason) = validate(param) {
            return SetParametersResult::failure(reason);
        }

        *current = param.value.clone();
        SetParametersResult::success()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Client for setting another node's parameters.
pub struct RemoteParams {
    client: ServiceClient<SetParameters, SetParametersResponse>,
    pending: Vec<Parameter>,
}

impl RemoteParams {
    /// Connect to `/<other_node>/set_parameters`, waiting `retry` between attempts
    /// until the service appears.
    pub async fn connect(bus: &Bus, other_node: &str, retry: Duration) -> Result<Self, BusError> {
        let srv_name = service_name(other_node);
        loop {
            match bus.client(&srv_name) {
                Ok(client) => {
                    tracing::debug!(service = %srv_name, "connected");
                    return Ok(Self {
                        client,
                        pending: Vec::new(),
                    });
                }
                Err(BusError::ServiceUnavailable { .. }) => {
                    tracing::info!("{srv_name} service not available, waiting again...");
                    tokio::time::sleep(retry).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn service_name(&self) -> &str {
        self.client.name()
    }

    /// Queue a parameter to be sent with the next [`send`](Self::send).
    pub fn update(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.pending.push(Parameter::new(name, value));
    }

    pub fn pending(&self) -> &[Parameter] {
        &self.pending
    }

    /// Send every queued parameter in one request. The queue is cleared even if the
    /// call fails.
    pub async fn send(&mut self) -> Result<SetParametersResponse, BusError> {
        let request = SetParameters {
            parameters: std::mem::take(&mut self.pending),
        };
        self.client.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        service_name, Parameter, ParameterValue, Parameters, RemoteParams, SetParameters,
        SetParametersResponse,
    };
    use crate::bus::{Bus, BusError};

    #[test]
    fn parse_values() {
        assert_eq!(ParameterValue::parse("true"), ParameterValue::Bool(true));
        assert_eq!(ParameterValue::parse("-3"), ParameterValue::Integer(-3));
        assert_eq!(ParameterValue::parse("0.25"), ParameterValue::Double(0.25));
        assert_eq!(
            ParameterValue::parse("clamp"),
            ParameterValue::String("clamp".into())
        );
    }

    #[test]
    fn service_names() {
        assert_eq!(service_name("thrust"), "/thrust/set_parameters");
        assert_eq!(service_name("/thrust"), "/thrust/set_parameters");
    }

    #[test]
    fn set_declared_parameters() {
        let mut params = Parameters::default();
        params.declare("saturation", "none");

        let result = params.set(&Parameter::new("saturation", "clamp"), |_| Ok(()));
        assert!(result.successful);
        assert_eq!(params.get("saturation"), Some(&ParameterValue::from("clamp")));

        let result = params.set(&Parameter::new("gain", 2.0), |_| Ok(()));
        assert!(!result.successful);
        assert!(result.reason.contains("not declared"));

        let result = params.set(&Parameter::new("saturation", true), |_| Ok(()));
        assert!(!result.successful);
        assert!(result.reason.contains("expects a string"));

        let result = params.set(&Parameter::new("saturation", "wild"), |_| {
            Err("unknown".to_owned())
        });
        assert_eq!(result.reason, "unknown");
        assert_eq!(params.get("saturation"), Some(&ParameterValue::from("clamp")));
    }

    #[tokio::test]
    async fn connect_waits_for_service() {
        let bus = Bus::default();

        let connecting = tokio::spawn({
            let bus = bus.clone();
            async move { RemoteParams::connect(&bus, "thrust", Duration::from_millis(5)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!connecting.is_finished());

        let mut server = bus
            .advertise::<SetParameters, SetParametersResponse>("/thrust/set_parameters")
            .unwrap();
        let mut remote = connecting.await.unwrap().unwrap();
        assert_eq!(remote.service_name(), "/thrust/set_parameters");

        remote.update("saturation", "clamp");
        remote.update("enabled", true);
        assert_eq!(remote.pending().len(), 2);

        let serve = tokio::spawn(async move {
            let request = server.recv().await.unwrap();
            let count = request.request.parameters.len();
            request.respond(SetParametersResponse {
                results: vec![super::SetParametersResult::success(); count],
            });
            count
        });

        let response = remote.send().await.unwrap();
        assert!(response.all_successful());
        assert_eq!(response.results.len(), 2);
        assert!(remote.pending().is_empty());
        assert_eq!(serve.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn send_clears_pending_on_failure() {
        let bus = Bus::default();
        let server = bus
            .advertise::<SetParameters, SetParametersResponse>("/servo/set_parameters")
            .unwrap();
        let mut remote = RemoteParams::connect(&bus, "servo", Duration::from_millis(5))
            .await
            .unwrap();
        drop(server);

        remote.update("center", 1500_i64);
        assert!(matches!(
            remote.send().await,
            Err(BusError::ServiceUnavailable { .. })
        ));
        assert!(remote.pending().is_empty());
    }
}
