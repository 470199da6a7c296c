use embedded_hal::digital::OutputPin;

use crate::command::Directive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    /// Output driven high
    Energized,
    /// Output driven low, the power-on state
    DeEnergized,
}

/// Single digital output driving the relay coil
pub struct ActuatorController<P> {
    pin: P,
    state: ActuatorState,
}

impl<P: OutputPin> ActuatorController<P> {
    /// Takes the pin and drives it low before anything else can run
    pub fn new(mut pin: P) -> Result<Self, P::Error> {
        pin.set_low()?;
        Ok(Self {
            pin,
            state: ActuatorState::DeEnergized,
        })
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Drive the output for `directive`. Repeating the current state still
    /// writes the pin
    pub fn apply(&mut self, directive: Directive) -> Result<(), P::Error> {
        match directive {
            Directive::Energize => {
                self.pin.set_high()?;
                self.state = ActuatorState::Energized;
                log::info!("Relay energized, load off");
            }
            Directive::DeEnergize => {
                self.pin.set_low()?;
                self.state = ActuatorState::DeEnergized;
                log::info!("Relay de-energized, load on");
            }
            Directive::Ignore => {}
        }
        Ok(())
    }
}
