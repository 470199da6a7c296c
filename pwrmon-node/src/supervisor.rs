use embedded_hal::delay::DelayNs;

use crate::{
    config::ConnectionSettings,
    link::{LinkStatus, NetworkLink},
    session::{BrokerSession, InboundMessage, SessionError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Only meaningful while the link is [`LinkState::Connected`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of one [`ConnectionSupervisor::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    LinkPending,
    SessionPending,
}

/// [`ConnectionSupervisor`] owns the two stacked connection layers: the
/// network link and the broker session on top of it. Both are checked
/// lazily at the top of every tick; nothing here is interrupt driven.
///
/// Recovery policy:
/// 1. Link: issue a link-establish request, then poll in `link_poll_ms`
///    increments until the link is up. There is no retry bound; a failed
///    association re-issues the request
/// 2. Session: connect with the fixed client identity and subscribe to the
///    command topic. On failure sleep `session_backoff_ms` and try again.
///    The subscription is not tracked, every reconnect re-subscribes
///
/// A session can never be connected while the link is not; losing the link
/// drops both layers to disconnected.
pub struct ConnectionSupervisor<L, S> {
    link: L,
    session: S,
    settings: ConnectionSettings,
    link_state: LinkState,
    session_state: SessionState,
}

impl<L, S> ConnectionSupervisor<L, S>
where
    L: NetworkLink,
    S: BrokerSession,
{
    pub fn new(link: L, session: S, settings: ConnectionSettings) -> Self {
        Self {
            link,
            session,
            settings,
            link_state: LinkState::Disconnected,
            session_state: SessionState::Disconnected,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn is_ready(&self) -> bool {
        self.session_state == SessionState::Connected
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Block until both layers are connected. Publish and subscribe are
    /// valid after this returns, until the next detected disconnect
    pub fn ensure_ready<D: DelayNs>(&mut self, delay: &mut D) {
        while self.tick(delay) != Readiness::Ready {}
    }

    /// Advance the state machine by one step, sleeping at most one poll or
    /// backoff interval
    pub fn tick<D: DelayNs>(&mut self, delay: &mut D) -> Readiness {
        self.check_link();

        if self.link_state != LinkState::Connected {
            self.advance_link(delay);
            if self.link_state != LinkState::Connected {
                return Readiness::LinkPending;
            }
        }

        self.check_session();

        if self.session_state != SessionState::Connected {
            self.advance_session(delay);
            if self.session_state != SessionState::Connected {
                return Readiness::SessionPending;
            }
        }

        Readiness::Ready
    }

    /// Drain whatever the transport has delivered, handing each message to
    /// `handler`. Returns the number of messages delivered
    pub fn pump_inbound<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(&InboundMessage),
    {
        if self.session_state != SessionState::Connected {
            return 0;
        }

        let mut inbox = vec![];
        if let Err(e) = self.session.poll(&mut inbox) {
            log::error!("Error polling broker session {e:}");
            self.drop_session();
        }

        inbox.iter().for_each(|msg| {
            log::info!(
                "Message received [{}]: {}",
                msg.topic,
                String::from_utf8_lossy(&msg.payload)
            );
            handler(msg);
        });
        inbox.len()
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if self.session_state != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }

        match self.session.publish(topic, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Error publishing to {topic}: {e:}");
                self.drop_session();
                Err(e)
            }
        }
    }

    fn link_status(&mut self) -> LinkStatus {
        self.link.status().unwrap_or_else(|e| {
            log::error!("Unable to get link status {e:}");
            LinkStatus::Down
        })
    }

    fn check_link(&mut self) {
        if self.link_state == LinkState::Connected && self.link_status() != LinkStatus::Up {
            log::warn!("Link lost, dropping broker session");
            self.session.disconnect();
            self.transition(LinkState::Disconnected, SessionState::Disconnected);
        }
    }

    fn advance_link<D: DelayNs>(&mut self, delay: &mut D) {
        if self.link_state == LinkState::Disconnected {
            log::info!(
                "Connecting to network '{}'",
                self.settings.credentials.ssid
            );
            if let Err(e) = self.link.begin(&self.settings.credentials) {
                log::error!("Error starting link {e:}, retrying");
                delay.delay_ms(self.settings.link_poll_ms);
                return;
            }
            self.transition(LinkState::Connecting, SessionState::Disconnected);
        }

        match self.link_status() {
            LinkStatus::Up => {
                log::info!("Link connected");
                self.transition(LinkState::Connected, SessionState::Disconnected);
            }
            LinkStatus::Pending => {
                log::trace!(".");
                delay.delay_ms(self.settings.link_poll_ms);
            }
            LinkStatus::Down => {
                log::warn!("Link association failed, retrying");
                self.transition(LinkState::Disconnected, SessionState::Disconnected);
                delay.delay_ms(self.settings.link_poll_ms);
            }
        }
    }

    fn check_session(&mut self) {
        if self.session_state == SessionState::Connected && !self.session.is_connected() {
            log::warn!("Broker session lost");
            self.transition(self.link_state, SessionState::Disconnected);
        }
    }

    fn advance_session<D: DelayNs>(&mut self, delay: &mut D) {
        self.transition(LinkState::Connected, SessionState::Connecting);
        log::info!("Connecting to broker as '{}'", self.settings.client_id);

        let attempt = self
            .session
            .connect(&self.settings.client_id)
            .and_then(|()| self.session.subscribe(&self.settings.command_topic));

        match attempt {
            Ok(()) => {
                log::info!(
                    "Broker session up, subscribed to {}",
                    self.settings.command_topic
                );
                self.transition(LinkState::Connected, SessionState::Connected);
            }
            Err(e) => {
                log::error!(
                    "Failed, rc={e:}, trying again in {} ms",
                    self.settings.session_backoff_ms
                );
                self.session.disconnect();
                self.transition(LinkState::Connected, SessionState::Disconnected);
                delay.delay_ms(self.settings.session_backoff_ms);
            }
        }
    }

    fn drop_session(&mut self) {
        self.session.disconnect();
        self.transition(self.link_state, SessionState::Disconnected);
    }

    /// Single place both states change. A connected session on a link that
    /// is not connected is never stored
    fn transition(&mut self, link: LinkState, session: SessionState) {
        let session = if link == LinkState::Connected {
            session
        } else {
            if session != SessionState::Disconnected {
                log::error!("Refusing session {session:?} while link is {link:?}");
            }
            SessionState::Disconnected
        };

        if (link, session) != (self.link_state, self.session_state) {
            log::debug!(
                "link {:?} -> {:?}, session {:?} -> {:?}",
                self.link_state,
                link,
                self.session_state,
                session
            );
        }

        self.link_state = link;
        self.session_state = session;
    }
}
