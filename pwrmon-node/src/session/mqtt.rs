use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet,
    QoS,
};
use std::time::{Duration, Instant};

use crate::{
    config::BrokerSettings,
    session::{BrokerSession, InboundMessage, SessionError},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
// How long to keep driving the connection for an outgoing request to be written
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);
// How long one poll waits on the socket before calling the queue drained
const POLL_WINDOW: Duration = Duration::from_millis(20);
const REQUEST_CAPACITY: usize = 10;

/// [`BrokerSession`] backed by the rumqttc synchronous client. The
/// connection is only driven from inside these calls, which keeps the whole
/// node on the one control loop thread
pub struct MqttSession {
    host: String,
    port: u16,
    keep_alive: Duration,
    handle: Option<(Client, Connection)>,
    /// Publishes that showed up while flushing an outgoing request
    pending: Vec<InboundMessage>,
}

impl MqttSession {
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            keep_alive: Duration::from_secs(settings.keep_alive_secs),
            handle: None,
            pending: vec![],
        }
    }

    fn collect(inbox: &mut Vec<InboundMessage>, event: Event) {
        match event {
            Event::Incoming(Packet::Publish(p)) => {
                inbox.push(InboundMessage::new(p.topic.clone(), p.payload.to_vec()));
            }
            other => log::trace!("MQTT event {other:?}"),
        }
    }

    /// Drive the connection until `done` matches an outgoing packet
    fn flush(&mut self, done: impl Fn(&Outgoing) -> bool) -> Result<(), SessionError> {
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        loop {
            let Some((_, connection)) = self.handle.as_mut() else {
                return Err(SessionError::NotConnected);
            };

            match connection.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Ok(Event::Outgoing(out))) if done(&out) => return Ok(()),
                Ok(Ok(event)) => Self::collect(&mut self.pending, event),
                Ok(Err(e)) => {
                    self.handle = None;
                    return Err(SessionError::from(e));
                }
                Err(_) => return Err(SessionError::Timeout),
            }
        }
    }
}

impl BrokerSession for MqttSession {
    fn connect(&mut self, client_id: &str) -> Result<(), SessionError> {
        self.disconnect();

        let mut options = MqttOptions::new(client_id, self.host.as_str(), self.port);
        options.set_keep_alive(self.keep_alive);

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let deadline = Instant::now() + CONNECT_TIMEOUT;

        loop {
            match connection.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(SessionError::Rejected(format!("{:?}", ack.code)));
                    }
                    log::debug!("ConnAck from {}:{}", self.host, self.port);
                    self.handle = Some((client, connection));
                    return Ok(());
                }
                Ok(Ok(event)) => log::trace!("MQTT event while connecting {event:?}"),
                Ok(Err(ConnectionError::ConnectionRefused(code))) => {
                    return Err(SessionError::Rejected(format!("{code:?}")));
                }
                Ok(Err(e)) => return Err(SessionError::from(e)),
                Err(_) => return Err(SessionError::Timeout),
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    fn disconnect(&mut self) {
        if let Some((client, _connection)) = self.handle.take() {
            client.try_disconnect().ok();
        }
        self.pending.clear();
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        let Some((client, _)) = self.handle.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        client.subscribe(topic, QoS::AtMostOnce)?;
        self.flush(|out| matches!(out, Outgoing::Subscribe(_)))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        let Some((client, _)) = self.handle.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        client.publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        self.flush(|out| matches!(out, Outgoing::Publish(_)))
    }

    fn poll(&mut self, inbox: &mut Vec<InboundMessage>) -> Result<(), SessionError> {
        inbox.append(&mut self.pending);
        loop {
            let Some((_, connection)) = self.handle.as_mut() else {
                return Err(SessionError::NotConnected);
            };

            match connection.recv_timeout(POLL_WINDOW) {
                Ok(Ok(event)) => Self::collect(inbox, event),
                Ok(Err(e)) => {
                    self.handle = None;
                    return Err(SessionError::from(e));
                }
                // nothing more queued
                Err(_) => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_NOT_AUTHORIZED: [u8; 4] = [0x20, 0x02, 0x00, 0x05];

    /// Read one MQTT control packet, returning its first header byte
    fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte)?;
        let header = byte[0];

        let (mut len, mut shift) = (0usize, 0);
        loop {
            stream.read_exact(&mut byte)?;
            len |= usize::from(byte[0] & 0x7f) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        Ok((header, body))
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = (topic.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload);
        let mut packet = vec![0x30, body.len() as u8];
        packet.extend(body);
        packet
    }

    /// Single connection broker on a loopback port. `script` gets the
    /// accepted stream after the client's CONNECT was read
    fn broker<F, T>(script: F) -> (BrokerSettings, JoinHandle<T>)
    where
        F: FnOnce(TcpStream) -> T + Send + 'static,
        T: Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let (connect, _) = read_packet(&mut stream).unwrap();
            assert_eq!(connect, 0x10);
            script(stream)
        });
        let settings = BrokerSettings {
            host: "127.0.0.1".to_string(),
            port,
            keep_alive_secs: 30,
        };
        (settings, handle)
    }

    /// Record the header byte of every packet until the client hangs up
    fn drain(stream: &mut TcpStream) -> Vec<u8> {
        let mut seen = vec![];
        while let Ok((header, _)) = read_packet(stream) {
            seen.push(header);
        }
        seen
    }

    #[test]
    fn publish_received_while_flushing_is_polled() {
        let (settings, broker) = broker(|mut stream| {
            stream.write_all(&CONNACK_OK).unwrap();
            // queued ahead of anything the client sends next
            stream
                .write_all(&publish_packet("pwrmon/relay", b"OFF"))
                .unwrap();
            drain(&mut stream)
        });

        let mut session = MqttSession::new(&settings);
        session.connect("pwrmon-test").unwrap();
        assert!(session.is_connected());
        session.subscribe("pwrmon/relay").unwrap();
        session.publish("pwrmon/telemetry", b"{}").unwrap();

        let mut inbox = vec![];
        session.poll(&mut inbox).unwrap();
        assert_eq!(inbox, vec![InboundMessage::new("pwrmon/relay", "OFF")]);

        // nothing else is queued, the drain ends cleanly
        inbox.clear();
        session.poll(&mut inbox).unwrap();
        assert!(inbox.is_empty());

        drop(session);
        let seen = broker.join().unwrap();
        assert!(seen.contains(&0x82), "subscribe sent: {seen:02x?}");
        assert!(seen.contains(&0x30), "publish sent: {seen:02x?}");
    }

    #[test]
    fn refused_connack_is_rejected() {
        let (settings, broker) = broker(|mut stream| {
            stream.write_all(&CONNACK_NOT_AUTHORIZED).unwrap();
            drain(&mut stream)
        });

        let mut session = MqttSession::new(&settings);
        assert!(matches!(
            session.connect("pwrmon-test"),
            Err(SessionError::Rejected(_))
        ));
        assert!(!session.is_connected());
        assert!(matches!(
            session.publish("pwrmon/telemetry", b"{}"),
            Err(SessionError::NotConnected)
        ));

        drop(session);
        broker.join().unwrap();
    }

    #[test]
    fn broker_hangup_tears_down_session() {
        let (settings, broker) = broker(|mut stream| {
            stream.write_all(&CONNACK_OK).unwrap();
        });

        let mut session = MqttSession::new(&settings);
        session.connect("pwrmon-test").unwrap();
        broker.join().unwrap();

        let mut inbox = vec![];
        let mut failed = false;
        for _ in 0..100 {
            if session.poll(&mut inbox).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(!session.is_connected());
        assert!(matches!(
            session.poll(&mut inbox),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn nothing_listening_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut session = MqttSession::new(&BrokerSettings {
            host: "127.0.0.1".to_string(),
            port,
            keep_alive_secs: 30,
        });
        assert!(session.connect("pwrmon-test").is_err());
        assert!(!session.is_connected());
    }
}
