//! Control core for a networked power monitoring node. The node samples an
//! AC energy meter on a fixed interval, publishes each valid sample as JSON
//! to an MQTT broker, and drives a single relay output from commands
//! received on a subscribed topic.
//!
//! The crate is organized around a handful of owned components, all driven
//! from one cooperative loop ([`SamplingLoop`]):
//!
//! 1. [`ConnectionSupervisor`] keeps the two stacked connection layers up:
//! the network link ([`link::NetworkLink`], implemented over NetworkManager
//! by [`NmcliLink`]) and the broker session on top of it
//! ([`session::BrokerSession`], implemented with rumqttc by [`MqttSession`]).
//! Reconnection is an explicit state machine advanced by
//! [`ConnectionSupervisor::tick`]
//! 2. [`CommandInterpreter`] turns inbound command messages into
//! [`Directive`]s, which [`ActuatorController`] applies to a GPIO output
//! 3. The sensor side lives in the `pwrmon-sensor` crate: any
//! [`pwrmon_sensor::Sensor`] can be sampled, and samples are gated and
//! encoded with [`pwrmon_sensor::codec`] before publishing
//!
//! Configuration is fixed at build time, see [`config`].
//!
//! Commands are only drained once per iteration, so the worst case latency
//! between a command arriving and the relay switching is one sample interval.

pub mod actuator;
pub mod command;
pub mod config;
pub mod link;
pub mod sampler;
pub mod serial;
pub mod session;
pub mod supervisor;

pub use actuator::{ActuatorController, ActuatorState};
pub use command::{CommandInterpreter, Directive};
pub use config::NodeSettings;
pub use link::NmcliLink;
pub use sampler::{Cycle, SamplingLoop};
pub use serial::SensorPort;
pub use session::MqttSession;
pub use supervisor::{ConnectionSupervisor, LinkState, Readiness, SessionState};

use thiserror::Error;

/// Startup errors. Once the loop is running nothing is fatal
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Serial port Error")]
    Serial(#[from] serialport::Error),
    #[error("GPIO Error {0}")]
    Gpio(String),
}
