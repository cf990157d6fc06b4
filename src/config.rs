//! TOML configuration for the seahawk nodes.
//!
//! Every section and field is optional; missing values fall back to the vehicle's
//! defaults. The motor geometry is fixed in code and is not configurable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::bus::DEFAULT_CAPACITY;
use crate::imu::{DEFAULT_ADDRESS, DEFAULT_FRAME_ID};
use crate::thrust::Saturation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log: LogConfig,
    pub bus: BusConfig,
    pub thrust: ThrustConfig,
    pub imu: ImuConfig,
    pub servo: ServoConfig,
    pub params: ParamsConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `seahawk=debug`.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Messages buffered per subscriber before it starts lagging.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThrustConfig {
    pub node_name: String,
    pub twist_topic: String,
    pub motors_topic: String,
    pub saturation: Saturation,
}

impl Default for ThrustConfig {
    fn default() -> Self {
        Self {
            node_name: "thrust".to_owned(),
            twist_topic: "drive/twist".to_owned(),
            motors_topic: "drive/motors".to_owned(),
            saturation: Saturation::None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ImuConfig {
    pub frame_id: String,
    /// Prefix of the published topic, `<hardware_location>/imu`.
    pub hardware_location: String,
    pub i2c_address: u8,
    pub rate_hz: f64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            frame_id: DEFAULT_FRAME_ID.to_owned(),
            hardware_location: "logic_tube".to_owned(),
            i2c_address: DEFAULT_ADDRESS,
            rate_hz: 50.,
        }
    }
}

impl ImuConfig {
    pub fn topic(&self) -> String {
        format!("{}/imu", self.hardware_location)
    }

    /// Time between samples, or `None` if `rate_hz` has no non-zero period.
    pub fn period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1. / self.rate_hz)
            .ok()
            .filter(|period| !period.is_zero())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServoConfig {
    pub node_name: String,
    pub topic: String,
    /// Channel on the 16 channel servo hat.
    pub channel: u8,
    /// Pulse width in microseconds for a -1 command.
    pub min_pulse: u16,
    /// Pulse width in microseconds for a +1 command.
    pub max_pulse: u16,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            node_name: "logic_tube_servo".to_owned(),
            topic: "camera_control".to_owned(),
            channel: 15,
            min_pulse: 0,
            max_pulse: 3000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ParamsConfig {
    /// Wait between attempts to reach another node's parameter service.
    pub retry_interval_ms: u64,
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
        }
    }
}

impl ParamsConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        text.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("thrust.node_name", &self.thrust.node_name),
            ("thrust.twist_topic", &self.thrust.twist_topic),
            ("thrust.motors_topic", &self.thrust.motors_topic),
            ("imu.frame_id", &self.imu.frame_id),
            ("imu.hardware_location", &self.imu.hardware_location),
            ("servo.node_name", &self.servo.node_name),
            ("servo.topic", &self.servo.topic),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }

        if self.bus.capacity == 0 {
            return Err(ConfigError::Invalid("bus.capacity must be positive".into()));
        }
        if !self.imu.rate_hz.is_finite() || self.imu.period().is_none() {
            return Err(ConfigError::Invalid(format!(
                "imu.rate_hz must give a positive sample period, got {}",
                self.imu.rate_hz
            )));
        }
        if self.imu.i2c_address > 0x7f {
            return Err(ConfigError::Invalid(format!(
                "imu.i2c_address {:#x} is not a 7-bit address",
                self.imu.i2c_address
            )));
        }
        if self.servo.channel >= 16 {
            return Err(ConfigError::Invalid(format!(
                "servo.channel {} is out of range 0-15",
                self.servo.channel
            )));
        }
        if self.servo.min_pulse >= self.servo.max_pulse {
            return Err(ConfigError::Invalid(format!(
                "servo.min_pulse {} must be below servo.max_pulse {}",
                self.servo.min_pulse, self.servo.max_pulse
            )));
        }
        if self.params.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "params.retry_interval_ms must be positive".into(),
            ));
        }

        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    /// Parse and validate a TOML document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
