//! Long running nodes that connect the vehicle's hardware to the [`Bus`](crate::bus::Bus).
//!
//! Each node is built from its config section, then driven by `run` until the
//! shutdown signal flips to `true` (or its sender is dropped).

use embedded_time::{clock, ConversionError};
use thiserror::Error;
use tokio::sync::watch;

use crate::bus::BusError;
use crate::thrust::AllocationError;

mod imu;
pub use imu::ImuNode;

mod servo;
pub use servo::ServoNode;

mod thrust;
pub use thrust::ThrustNode;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("failed to start IMU: {0}")]
    Imu(String),

    #[error("IMU rate {0} Hz has no usable sample period")]
    InvalidRate(f64),

    #[error("clock error: {0:?}")]
    Clock(clock::Error),

    #[error("time conversion error: {0:?}")]
    Time(ConversionError),
}

impl From<clock::Error> for NodeError {
    fn from(clock_error: clock::Error) -> Self {
        NodeError::Clock(clock_error)
    }
}

impl From<ConversionError> for NodeError {
    fn from(time_error: ConversionError) -> Self {
        NodeError::Time(time_error)
    }
}

/// Create a shutdown signal shared by every node.
pub fn shutdown_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Wait until shutdown is requested or the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
