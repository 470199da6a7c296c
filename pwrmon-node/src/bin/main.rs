use embedded_hal::digital::PinState;
use env_logger::Env;
use linux_embedded_hal::{Delay, SysfsPin};

use pwrmon_node::{
    ActuatorController, ConnectionSupervisor, MqttSession, NmcliLink, NodeError, NodeSettings,
    SamplingLoop, SensorPort,
};
use pwrmon_sensor::Pzem004t;

fn main() -> Result<(), NodeError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = NodeSettings::from_config();
    log::info!("Starting pwrmon node '{}'", settings.connection.client_id);

    let port = SensorPort::open(&settings.sensor).map_err(|e| {
        log::error!("Unable to open sensor port {}: {e:}", settings.sensor.port);
        e
    })?;
    let sensor = Pzem004t::new(port, settings.sensor.address);

    let pin = SysfsPin::new(settings.relay_gpio);
    pin.export()
        .map_err(|e| NodeError::Gpio(format!("export gpio{}: {e:?}", settings.relay_gpio)))?;
    let pin = pin
        .into_output_pin(PinState::Low)
        .map_err(|e| NodeError::Gpio(format!("gpio{} direction: {e:?}", settings.relay_gpio)))?;
    let actuator =
        ActuatorController::new(pin).map_err(|e| NodeError::Gpio(format!("{e:?}")))?;

    let supervisor = ConnectionSupervisor::new(
        NmcliLink::new(&settings.wifi_interface),
        MqttSession::new(&settings.broker),
        settings.connection.clone(),
    );

    let mut node = SamplingLoop::new(supervisor, actuator, sensor, Delay, &settings);
    node.run()
}
