//! Static node configuration. Values come from `cfg.toml` (section
//! `[pwrmon-node]`) at compile time via `toml-cfg`, and are copied into an
//! owned [`NodeSettings`] at startup so nothing else reads [`CONFIG`]

use crate::link::Credentials;

#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    wifi_ssid: &'static str,
    #[default("")]
    wifi_password: &'static str,
    #[default("wlan0")]
    wifi_interface: &'static str,
    #[default("localhost")]
    mqtt_host: &'static str,
    #[default(1883)]
    mqtt_port: u16,
    #[default(15)]
    mqtt_keep_alive_secs: u64,
    #[default("pwrmon-node")]
    client_id: &'static str,
    #[default("pwrmon/telemetry")]
    telemetry_topic: &'static str,
    #[default("pwrmon/relay")]
    command_topic: &'static str,
    #[default(4)]
    relay_gpio: u64,
    #[default("/dev/ttyS0")]
    sensor_port: &'static str,
    #[default(9600)]
    sensor_baud: u32,
    #[default(248)]
    sensor_address: u8,
    #[default(1000)]
    sensor_timeout_ms: u64,
    #[default(3000)]
    sample_interval_ms: u32,
    #[default(5000)]
    session_backoff_ms: u32,
    #[default(500)]
    link_poll_ms: u32,
}

/// Everything the [`ConnectionSupervisor`](crate::ConnectionSupervisor) needs
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub credentials: Credentials,
    /// Fixed client identity presented to the broker
    pub client_id: String,
    pub command_topic: String,
    /// Sleep between link status polls while associating
    pub link_poll_ms: u32,
    /// Sleep after a failed session attempt
    pub session_backoff_ms: u32,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub port: String,
    pub baud: u32,
    pub address: u8,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub connection: ConnectionSettings,
    pub broker: BrokerSettings,
    pub sensor: SensorSettings,
    pub wifi_interface: String,
    pub relay_gpio: u64,
    pub telemetry_topic: String,
    pub sample_interval_ms: u32,
}

impl NodeSettings {
    pub fn from_config() -> Self {
        Self::from(&CONFIG)
    }
}

impl From<&Config> for NodeSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            connection: ConnectionSettings {
                credentials: Credentials {
                    ssid: cfg.wifi_ssid.to_string(),
                    password: cfg.wifi_password.to_string(),
                },
                client_id: cfg.client_id.to_string(),
                command_topic: cfg.command_topic.to_string(),
                link_poll_ms: cfg.link_poll_ms,
                session_backoff_ms: cfg.session_backoff_ms,
            },
            broker: BrokerSettings {
                host: cfg.mqtt_host.to_string(),
                port: cfg.mqtt_port,
                keep_alive_secs: cfg.mqtt_keep_alive_secs,
            },
            sensor: SensorSettings {
                port: cfg.sensor_port.to_string(),
                baud: cfg.sensor_baud,
                address: cfg.sensor_address,
                timeout_ms: cfg.sensor_timeout_ms,
            },
            wifi_interface: cfg.wifi_interface.to_string(),
            relay_gpio: cfg.relay_gpio,
            telemetry_topic: cfg.telemetry_topic.to_string(),
            sample_interval_ms: cfg.sample_interval_ms,
        }
    }
}
