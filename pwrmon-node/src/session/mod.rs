/// Mod for the publish/subscribe session layered on top of the link.
/// Currently only MQTT (via rumqttc) is implemented
mod mqtt;
pub use mqtt::MqttSession;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Broker rejected connection, rc={0}")]
    Rejected(String),
    #[error("Timed out waiting on broker")]
    Timeout,
    #[error("Session is not connected")]
    NotConnected,
    #[error("MQTT client Error")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT connection Error")]
    Connection(#[from] rumqttc::ConnectionError),
}

/// A message delivered by the transport; only lives for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Trait to allow different message transport clients beneath the
/// [`ConnectionSupervisor`](crate::ConnectionSupervisor)
pub trait BrokerSession {
    /// Establish a session with the given client identity. Blocking, but
    /// bounded by the transport's own connect timeout
    fn connect(&mut self, client_id: &str) -> Result<(), SessionError>;
    fn is_connected(&self) -> bool;
    /// Tear down whatever is left of the session, if anything
    fn disconnect(&mut self);
    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;
    /// Move every message delivered since the last call into `inbox`
    fn poll(&mut self, inbox: &mut Vec<InboundMessage>) -> Result<(), SessionError>;
}
