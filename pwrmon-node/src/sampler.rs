use embedded_hal::{delay::DelayNs, digital::OutputPin};
use pwrmon_sensor::{codec, SampleError, Sensor};

use crate::{
    actuator::ActuatorController,
    command::CommandInterpreter,
    config::NodeSettings,
    link::NetworkLink,
    session::BrokerSession,
    supervisor::ConnectionSupervisor,
};

/// How one pass of [`SamplingLoop::iterate`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Published,
    /// Nothing was published, the named field was undefined
    InvalidSample(SampleError),
    PublishFailed,
}

/// The node's top level control loop. Owns every other component; nothing
/// is shared, so everything runs on the calling thread
pub struct SamplingLoop<L, S, M, P, D> {
    supervisor: ConnectionSupervisor<L, S>,
    actuator: ActuatorController<P>,
    interpreter: CommandInterpreter,
    sensor: M,
    delay: D,
    telemetry_topic: String,
    interval_ms: u32,
}

impl<L, S, M, P, D> SamplingLoop<L, S, M, P, D>
where
    L: NetworkLink,
    S: BrokerSession,
    M: Sensor,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(
        supervisor: ConnectionSupervisor<L, S>,
        actuator: ActuatorController<P>,
        sensor: M,
        delay: D,
        settings: &NodeSettings,
    ) -> Self {
        Self {
            supervisor,
            actuator,
            interpreter: CommandInterpreter::new(&settings.connection.command_topic),
            sensor,
            delay,
            telemetry_topic: settings.telemetry_topic.clone(),
            interval_ms: settings.sample_interval_ms,
        }
    }

    pub fn run(&mut self) -> ! {
        log::info!(
            "Sampling every {} ms, publishing to {}",
            self.interval_ms,
            self.telemetry_topic
        );
        loop {
            let cycle = self.iterate();
            log::trace!("Cycle {cycle:?}");
        }
    }

    /// One full pass: connect if needed, act on commands, then sample and
    /// publish. Always ends with the sample interval sleep
    pub fn iterate(&mut self) -> Cycle {
        let cycle = self.step();
        self.delay.delay_ms(self.interval_ms);
        cycle
    }

    fn step(&mut self) -> Cycle {
        self.supervisor.ensure_ready(&mut self.delay);

        let interpreter = &self.interpreter;
        let actuator = &mut self.actuator;
        self.supervisor.pump_inbound(|msg| {
            let directive = interpreter.interpret(msg);
            if let Err(e) = actuator.apply(directive) {
                log::error!("Failed to drive relay output {e:?}");
            }
        });

        let sample = self.sensor.read_all();
        if let Err(e) = sample.validate() {
            log::warn!("Failed to read from sensor: {e:}");
            return Cycle::InvalidSample(e);
        }

        let payload = match codec::encode(&sample) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Unable to encode sample {e:}");
                return Cycle::PublishFailed;
            }
        };

        match self.supervisor.publish(&self.telemetry_topic, &payload) {
            Ok(()) => {
                log::debug!("Published {}", String::from_utf8_lossy(&payload));
                Cycle::Published
            }
            Err(_) => Cycle::PublishFailed,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<L, S> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut ConnectionSupervisor<L, S> {
        &mut self.supervisor
    }

    pub fn actuator(&self) -> &ActuatorController<P> {
        &self.actuator
    }

    pub fn sensor_mut(&mut self) -> &mut M {
        &mut self.sensor
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}
