use crate::session::InboundMessage;

/// What a remote command asks of the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Energize,
    DeEnergize,
    Ignore,
}

/// Maps messages on the command topic to [`Directive`]s.
///
/// The mapping is inverted on purpose: the relay is wired normally closed,
/// so driving the coil (`Energize`) cuts power to the load. `OFF` therefore
/// energizes and `ON` de-energizes. Matching is exact and case sensitive,
/// anything else is ignored.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    topic: String,
}

impl CommandInterpreter {
    pub const LOAD_OFF: &'static str = "OFF";
    pub const LOAD_ON: &'static str = "ON";

    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn interpret(&self, msg: &InboundMessage) -> Directive {
        if msg.topic != self.topic {
            log::debug!("Ignoring message on {}", msg.topic);
            return Directive::Ignore;
        }

        match std::str::from_utf8(&msg.payload) {
            Ok(Self::LOAD_OFF) => Directive::Energize,
            Ok(Self::LOAD_ON) => Directive::DeEnergize,
            Ok(other) => {
                log::warn!("Unknown command '{other}'");
                Directive::Ignore
            }
            Err(e) => {
                log::warn!("Command payload is not utf8 {e:}");
                Directive::Ignore
            }
        }
    }
}
