//! Fake providers standing in for the network, broker, meter, GPIO and
//! clock so the control core can run without hardware
#![allow(dead_code)]

use core::convert::Infallible;
use std::collections::VecDeque;

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, OutputPin},
};
use pwrmon_node::{
    config::{BrokerSettings, ConnectionSettings, NodeSettings, SensorSettings},
    link::{Credentials, LinkError, LinkStatus, NetworkLink},
    session::{BrokerSession, InboundMessage, SessionError},
};
use pwrmon_sensor::{MetricSample, Sensor};

pub const TELEMETRY_TOPIC: &str = "pwrmon/telemetry";
pub const COMMAND_TOPIC: &str = "pwrmon/relay";
pub const LINK_POLL_MS: u32 = 500;
pub const SESSION_BACKOFF_MS: u32 = 5000;
pub const SAMPLE_INTERVAL_MS: u32 = 3000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn settings() -> NodeSettings {
    NodeSettings {
        connection: ConnectionSettings {
            credentials: Credentials {
                ssid: "shed".to_string(),
                password: "hunter2".to_string(),
            },
            client_id: "pwrmon-test".to_string(),
            command_topic: COMMAND_TOPIC.to_string(),
            link_poll_ms: LINK_POLL_MS,
            session_backoff_ms: SESSION_BACKOFF_MS,
        },
        broker: BrokerSettings {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 15,
        },
        sensor: SensorSettings {
            port: "/dev/null".to_string(),
            baud: 9600,
            address: 0xf8,
            timeout_ms: 100,
        },
        wifi_interface: "wlan0".to_string(),
        relay_gpio: 4,
        telemetry_topic: TELEMETRY_TOPIC.to_string(),
        sample_interval_ms: SAMPLE_INTERVAL_MS,
    }
}

/// Reports scripted statuses, then `Up` once the script runs out
#[derive(Default)]
pub struct FakeLink {
    pub statuses: VecDeque<LinkStatus>,
    pub begins: usize,
}

impl FakeLink {
    pub fn scripted(statuses: &[LinkStatus]) -> Self {
        Self {
            statuses: statuses.iter().copied().collect(),
            begins: 0,
        }
    }
}

impl NetworkLink for FakeLink {
    fn begin(&mut self, _credentials: &Credentials) -> Result<(), LinkError> {
        self.begins += 1;
        Ok(())
    }

    fn status(&mut self) -> Result<LinkStatus, LinkError> {
        Ok(self.statuses.pop_front().unwrap_or(LinkStatus::Up))
    }
}

/// In-memory broker session. Connect attempts follow `connect_results`
/// (succeeding once it is empty)
#[derive(Default)]
pub struct FakeSession {
    pub connect_results: VecDeque<bool>,
    pub connects: usize,
    pub connected: bool,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, String)>,
    pub inbox: VecDeque<InboundMessage>,
}

impl FakeSession {
    pub fn deliver(&mut self, topic: &str, payload: &str) {
        self.inbox.push_back(InboundMessage::new(topic, payload));
    }

    /// Simulate the broker going away underneath the client
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }
}

impl BrokerSession for FakeSession {
    fn connect(&mut self, _client_id: &str) -> Result<(), SessionError> {
        self.connects += 1;
        if self.connect_results.pop_front().unwrap_or(true) {
            self.connected = true;
            Ok(())
        } else {
            Err(SessionError::Rejected("ServiceUnavailable".to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.published.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    fn poll(&mut self, inbox: &mut Vec<InboundMessage>) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        inbox.extend(self.inbox.drain(..));
        Ok(())
    }
}

/// Returns queued samples in order, repeating the last one
pub struct ScriptedSensor {
    samples: VecDeque<MetricSample>,
    last: MetricSample,
    pub reads: usize,
}

impl ScriptedSensor {
    pub fn new(samples: &[MetricSample]) -> Self {
        Self {
            samples: samples.iter().copied().collect(),
            last: MetricSample::unavailable(),
            reads: 0,
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        self.samples.push_back(sample);
    }
}

impl Sensor for ScriptedSensor {
    fn read_all(&mut self) -> MetricSample {
        self.reads += 1;
        if let Some(next) = self.samples.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// Records every level written, `true` for high
#[derive(Default)]
pub struct RecordingPin {
    pub writes: Vec<bool>,
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.writes.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.writes.push(true);
        Ok(())
    }
}

/// Never sleeps, only records requested millisecond delays
#[derive(Default)]
pub struct RecordingDelay {
    pub sleeps_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.sleeps_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.sleeps_ms.push(ms);
    }
}

pub fn reference_sample() -> MetricSample {
    MetricSample::new(230.1, 2.5, 575.25, 1024.3, 0.98)
}
