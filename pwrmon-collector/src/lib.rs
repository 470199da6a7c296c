//! Host side collector for pwrmon nodes. Subscribes to the telemetry topic,
//! decodes each sample with [`pwrmon_sensor::codec`], and keeps running
//! electricity cost estimates per minute, hour, day and (30 day) month in a
//! [`CostAggregator`]. Whenever a period rolls over, the closed bucket's
//! cost is logged. Nothing is persisted; a restart starts from empty buckets.

pub mod cost;

use chrono::NaiveDateTime;
use pwrmon_sensor::{codec, codec::CodecError, MetricSample};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::time::Duration;

pub use cost::{CostAggregator, CostEstimate, Period};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 10;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("MQTT client Error")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT connection Error")]
    Connection(#[from] rumqttc::ConnectionError),
}

#[toml_cfg::toml_config]
pub struct Config {
    #[default("localhost")]
    mqtt_host: &'static str,
    #[default(1883)]
    mqtt_port: u16,
    #[default(60)]
    mqtt_keep_alive_secs: u64,
    #[default("pwrmon-collector")]
    client_id: &'static str,
    #[default("pwrmon/telemetry")]
    telemetry_topic: &'static str,
    #[default(1500)]
    tariff_per_kwh: u32,
    #[default("")]
    log_dir: &'static str,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub client_id: String,
    pub telemetry_topic: String,
    pub tariff_per_kwh: f64,
    /// Daily rolling log files go here; stdout when `None`
    pub log_dir: Option<String>,
}

impl CollectorSettings {
    pub fn from_config() -> Self {
        Self::from(&CONFIG)
    }
}

impl From<&Config> for CollectorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            host: cfg.mqtt_host.to_string(),
            port: cfg.mqtt_port,
            keep_alive_secs: cfg.mqtt_keep_alive_secs,
            client_id: cfg.client_id.to_string(),
            telemetry_topic: cfg.telemetry_topic.to_string(),
            tariff_per_kwh: cfg.tariff_per_kwh as f64,
            log_dir: (!cfg.log_dir.is_empty()).then(|| cfg.log_dir.to_string()),
        }
    }
}

/// Everything the collector knows, fed one payload at a time
pub struct TelemetryCollector {
    costs: CostAggregator,
    received: u64,
    rejected: u64,
    last: Option<MetricSample>,
}

impl TelemetryCollector {
    pub fn new(tariff_per_kwh: f64) -> Self {
        Self {
            costs: CostAggregator::new(tariff_per_kwh),
            received: 0,
            rejected: 0,
            last: None,
        }
    }

    /// Decode one telemetry payload received at `at` and account for it.
    /// Returns the cost buckets the sample closed
    pub fn ingest(
        &mut self,
        at: NaiveDateTime,
        payload: &[u8],
    ) -> Result<Vec<CostEstimate>, CodecError> {
        let sample = codec::decode(payload).map_err(|e| {
            self.rejected += 1;
            log::warn!("Dropping telemetry payload {e:}");
            e
        })?;
        self.received += 1;

        log::info!(
            "Sample at {at}: {:.2} V, {:.2} A, {:.2} W, {:.2} Wh, {:.2} Hz, pf {:.2}",
            sample.voltage,
            sample.current,
            sample.power,
            sample.energy,
            sample.frequency,
            sample.power_factor
        );
        self.last = Some(sample);

        let closed = self.costs.record(at, sample.power);
        closed.iter().for_each(|c| {
            log::info!(
                "{} from {}: {:.2} over {} samples (mean {:.2} W)",
                c.period,
                c.start,
                c.cost,
                c.samples,
                c.mean_power
            );
        });
        Ok(closed)
    }

    pub fn costs(&self) -> &CostAggregator {
        &self.costs
    }

    pub fn last_sample(&self) -> Option<&MetricSample> {
        self.last.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Connect to the broker and collect until the process is stopped.
/// Connection errors are retried; the subscription is renewed on every
/// connect since the broker may not have kept it
pub async fn run(settings: &CollectorSettings) -> Result<(), CollectorError> {
    let mut options = MqttOptions::new(
        settings.client_id.as_str(),
        settings.host.as_str(),
        settings.port,
    );
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));

    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let mut collector = TelemetryCollector::new(settings.tariff_per_kwh);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                log::info!("Connected to {}:{}", settings.host, settings.port);
                client
                    .subscribe(settings.telemetry_topic.as_str(), QoS::AtMostOnce)
                    .await
                    .map_err(|e| {
                        log::error!("Unable to subscribe to {}: {e:}", settings.telemetry_topic);
                        e
                    })?;
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if p.topic == settings.telemetry_topic {
                    let now = chrono::Local::now().naive_local();
                    // undecodable payloads are already logged
                    collector.ingest(now, &p.payload).ok();
                } else {
                    log::debug!("Ignoring message on {}", p.topic);
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("MQTT connection error {e:}, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
