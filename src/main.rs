//! # seahawk
//!
//! Command line front end for the thruster allocator and the ROV nodes.
//!
//! # Usage
//!
//! ```bash
//! # Motor efforts for a twist (vx vy vz wx wy wz)
//! seahawk allocate 0.5 0 0 0 0 0.2 --saturation scale
//!
//! # Print the motor configuration and allocation matrices
//! seahawk matrix
//!
//! # Run the thrust and camera servo nodes, driven from stdin
//! seahawk -v run --config config/seahawk.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use embedded_hal::PwmPin;
use seahawk::bus::{BusError, Publisher};
use seahawk::config::Config;
use seahawk::msg::{Float32, Float32MultiArray, Twist};
use seahawk::node::{shutdown_signal, ServoNode, ThrustNode};
use seahawk::params::{ParameterValue, RemoteParams};
use seahawk::thrust::{singular_values, MOTOR_COUNT};
use seahawk::{Bus, Saturation, ThrustAllocator};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Seahawk ROV thruster allocation and control nodes
#[derive(Parser, Debug)]
#[command(name = "seahawk")]
#[command(version)]
#[command(about = "Thruster allocation and control nodes for the Seahawk ROV")]
#[command(long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the motor efforts for a twist
    Allocate {
        /// Linear x, y, z then angular x, y, z
        #[arg(
            num_args = 6,
            allow_negative_numbers = true,
            value_names = ["VX", "VY", "VZ", "WX", "WY", "WZ"]
        )]
        twist: Vec<f64>,

        /// How efforts outside -1 ~ +1 are handled (none, clamp or scale)
        #[arg(short, long, default_value_t = Saturation::None)]
        saturation: Saturation,
    },

    /// Print the motor configuration matrix and its pseudo-inverse
    Matrix,

    /// Run the thrust and camera servo nodes, reading commands from stdin
    Run {
        /// Path to the node configuration (defaults are used if omitted)
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn main() {
    let args = Args::parse();

    let config = match &args.command {
        Command::Run {
            config: Some(path),
        } => Config::load(path),
        _ => Ok(Config::default()),
    };
    let log = config
        .as_ref()
        .map(|config| config.log.clone())
        .unwrap_or_default();
    setup_tracing(&args, &log);

    let result = config
        .map_err(Box::<dyn std::error::Error>::from)
        .and_then(|config| run(args.command, config));
    if let Err(e) = result {
        error!("seahawk failed: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Allocate { twist, saturation } => {
            let mut values = [0.; 6];
            values.copy_from_slice(&twist);
            allocate(Twist::from(values), saturation)
        }
        Command::Matrix => matrix(),
        Command::Run { .. } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_nodes(config))
        }
    }
}

fn allocate(twist: Twist, saturation: Saturation) -> Result<(), Box<dyn std::error::Error>> {
    let allocator = ThrustAllocator::new()?;
    let effort = allocator.allocate(&twist)?;
    if !effort.is_within_range() {
        warn!(
            "effort out of range (max {:.3}), saturation: {}",
            effort.max_magnitude(),
            saturation
        );
    }

    let effort = effort.saturate(saturation);
    for (motor, effort) in effort.iter().enumerate() {
        println!("motor {motor}: {effort:+.6}");
    }

    let achieved = allocator.achieved(&effort);
    println!(
        "achieved: linear [{:.6}, {:.6}, {:.6}] angular [{:.6}, {:.6}, {:.6}]",
        achieved.linear.x,
        achieved.linear.y,
        achieved.linear.z,
        achieved.angular.x,
        achieved.angular.y,
        achieved.angular.z
    );
    Ok(())
}

fn matrix() -> Result<(), Box<dyn std::error::Error>> {
    let allocator = ThrustAllocator::new()?;
    println!("motor configuration (6x{MOTOR_COUNT}):{}", allocator.config());
    println!("allocation ({MOTOR_COUNT}x6):{}", allocator.allocation());
    println!("singular values:{}", singular_values(allocator.config()).transpose());
    Ok(())
}

/// A line read from stdin while the nodes run.
#[derive(Debug, PartialEq)]
enum Input {
    Twist(Twist),
    Camera(f32),
    Param(String, ParameterValue),
    Quit,
}

#[derive(Debug, Error, PartialEq)]
enum InputError {
    #[error("unknown command `{0}` (expected twist, camera, param or quit)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("`{0}` is not a number")]
    NotANumber(String),
}

impl Input {
    fn parse(line: &str) -> Result<Option<Self>, InputError> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let args: Vec<_> = words.collect();

        let number = |word: &str| {
            word.parse::<f64>()
                .map_err(|_| InputError::NotANumber(word.to_owned()))
        };

        let input = match command {
            "twist" => {
                if args.len() != 6 {
                    return Err(InputError::Usage("twist VX VY VZ WX WY WZ"));
                }
                let mut values = [0.; 6];
                for (value, word) in values.iter_mut().zip(&args) {
                    *value = number(*word)?;
                }
                Input::Twist(Twist::from(values))
            }
            "camera" => match args.as_slice() {
                [value] => Input::Camera(number(*value)? as f32),
                _ => return Err(InputError::Usage("camera POSITION")),
            },
            "param" => match args.as_slice() {
                [name, value] => Input::Param((*name).to_owned(), ParameterValue::parse(value)),
                _ => return Err(InputError::Usage("param NAME VALUE")),
            },
            "quit" | "exit" => Input::Quit,
            other => return Err(InputError::Unknown(other.to_owned())),
        };
        Ok(Some(input))
    }
}

/// Publishers for the commands typed on stdin.
struct Console {
    twists: Publisher<Twist>,
    camera: Publisher<Float32>,
}

impl Console {
    fn publish(&self, input: &Input) -> Result<(), BusError> {
        match *input {
            Input::Twist(twist) => self.twists.publish(twist).map(drop),
            Input::Camera(data) => self.camera.publish(Float32 { data }).map(drop),
            _ => Ok(()),
        }
    }
}

/// Logs the duty written to a servo hat channel.
struct LoggingPin {
    channel: u8,
    duty: u16,
    enabled: bool,
}

impl LoggingPin {
    fn new(channel: u8) -> Self {
        Self {
            channel,
            duty: 0,
            enabled: false,
        }
    }
}

impl PwmPin for LoggingPin {
    type Duty = u16;

    fn disable(&mut self) {
        self.enabled = false;
        info!(channel = self.channel, "servo disabled");
    }

    fn enable(&mut self) {
        self.enabled = true;
        info!(channel = self.channel, "servo enabled");
    }

    fn get_duty(&self) -> u16 {
        self.duty
    }

    fn get_max_duty(&self) -> u16 {
        u16::MAX
    }

    fn set_duty(&mut self, duty: u16) {
        self.duty = duty;
        info!(channel = self.channel, enabled = self.enabled, pulse_us = duty, "servo pulse");
    }
}

async fn run_nodes(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("seahawk v{} starting...", env!("CARGO_PKG_VERSION"));

    let bus = Bus::new(config.bus.capacity);
    let (shutdown, signal) = shutdown_signal();

    let thrust = ThrustNode::new(&bus, &config.thrust, ThrustAllocator::new()?)?;
    let thrust = tokio::spawn(thrust.run(signal.clone()));

    let servo = seahawk::hal::Servo::<LoggingPin>::builder()
        .min(config.servo.min_pulse)
        .max(config.servo.max_pulse)
        .build(LoggingPin::new(config.servo.channel));
    let servo = ServoNode::new(&bus, &config.servo, servo)?;
    let servo = tokio::spawn(servo.run(signal));

    let console = Console {
        twists: bus.publisher(&config.thrust.twist_topic)?,
        camera: bus.publisher(&config.servo.topic)?,
    };
    let mut motors = bus.subscribe::<Float32MultiArray>(&config.thrust.motors_topic)?;
    let mut remote: Option<RemoteParams> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            msg = motors.recv() => match msg {
                Ok(msg) => {
                    let efforts: Vec<_> = msg.data.iter().map(|e| format!("{e:+.4}")).collect();
                    println!("motors: [{}]", efforts.join(", "));
                }
                Err(e) => warn!("{}", e),
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };

                match Input::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(input @ (Input::Twist(_) | Input::Camera(_)))) => {
                        if let Err(e) = console.publish(&input) {
                            error!("node stopped listening: {}", e);
                            break;
                        }
                    }
                    Ok(Some(Input::Param(name, value))) => {
                        if remote.is_none() {
                            match RemoteParams::connect(
                                &bus,
                                &config.thrust.node_name,
                                config.params.retry_interval(),
                            )
                            .await
                            {
                                Ok(connected) => remote = Some(connected),
                                Err(e) => warn!("{}", e),
                            }
                        }
                        if let Some(remote) = remote.as_mut() {
                            remote.update(name, value);
                            match remote.send().await {
                                Ok(response) => {
                                    for result in response.results {
                                        if result.successful {
                                            println!("param set");
                                        } else {
                                            println!("param rejected: {}", result.reason);
                                        }
                                    }
                                }
                                Err(e) => warn!("{}", e),
                            }
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    if shutdown.send(true).is_err() {
        warn!("nodes already stopped");
    }
    thrust.await??;
    servo.await??;
    info!("seahawk stopped");
    Ok(())
}

fn setup_tracing(args: &Args, log: &seahawk::config::LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let filter = if args.verbose {
        filter.add_directive(Level::DEBUG.into())
    } else {
        filter
    };

    if args.json || log.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
