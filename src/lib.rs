//! # seahawk
//! Thruster allocation and control nodes for the Seahawk ROV.
//!
//! # Thrust
//! [`ThrustAllocator`] maps a desired body [`Twist`](msg::Twist) onto the efforts of
//! the eight vectored thrusters through the pseudo-inverse of the motor configuration
//! matrix.
//!
//! ```
//! use seahawk::{msg::Twist, ThrustAllocator};
//!
//! let allocator = ThrustAllocator::new()?;
//! let effort = allocator.allocate(&Twist::from([1., 0., 0., 0., 0., 0.]))?;
//!
//! // Surge pushes the right side motors forward and the left side back.
//! assert!(effort.iter().take(4).all(|&e| e > 0.));
//! assert!(effort.iter().skip(4).all(|&e| e < 0.));
//! # Ok::<(), seahawk::thrust::AllocationError>(())
//! ```
//!
//! # Nodes
//! [`node`] contains the thrust, IMU and camera servo nodes, which talk to each other
//! over a [`Bus`] of named topics and services.
//!
//! [`hal`] contains the hardware abstraction layer the nodes drive.

pub mod bus;
pub use bus::Bus;

pub mod config;
pub use config::Config;

pub mod hal;

pub mod imu;

pub mod msg;

pub mod node;

pub mod params;

pub mod thrust;
pub use thrust::{MotorEffort, Saturation, ThrustAllocator};
