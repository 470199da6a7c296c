//! Sensor lib defining the metric sample model and base read
//! operations for the energy meter used in pwrmon node builds.
//!
//! Currently only supports the PZEM-004T v3.0 as the metering device,
//! read over a Modbus-RTU serial link (see [`Pzem004t`]).
//!
//! The crate is split into:
//!
//! 1. [`MetricSample`], one full reading of every electrical quantity the
//! node reports, together with the validity gate the sampling loop applies
//! before anything gets published
//! 2. The [`Sensor`] trait, the single "read all metrics" operation the node
//! control loop depends on. Fields the device failed to report come back
//! as NaN rather than as an error, so a sample is judged as a whole
//! 3. [`codec`], the fixed-schema JSON payload published on the telemetry
//! topic (and decoded again by the collector)

pub mod codec;
mod pzem;

use thiserror::Error;

pub use pzem::{crc16, Measurements, Pzem004t, PzemError, DEFAULT_ADDRESS};

/// The meter cannot measure line frequency reliably, so every sample
/// reports the nominal grid value
pub const NOMINAL_FREQUENCY_HZ: f32 = 50.0;

/// The four quantities that gate sample validity. Energy is a monotonic
/// accumulator and is reported even when undefined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Voltage,
    Current,
    Power,
    PowerFactor,
}

impl core::fmt::Display for Metric {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Metric::Voltage => "voltage",
            Metric::Current => "current",
            Metric::Power => "power",
            Metric::PowerFactor => "power factor",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    #[error("{0} reading is undefined")]
    Undefined(Metric),
}

/// One reading of all measured quantities at one instant. Produced fresh
/// each cycle and never mutated afterwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// Volts
    pub voltage: f32,
    /// Amperes
    pub current: f32,
    /// Watts
    pub power: f32,
    /// Watt-hours accumulated by the meter
    pub energy: f32,
    /// Hertz, always [`NOMINAL_FREQUENCY_HZ`] for locally produced samples
    pub frequency: f32,
    pub power_factor: f32,
}

impl MetricSample {
    pub fn new(voltage: f32, current: f32, power: f32, energy: f32, power_factor: f32) -> Self {
        Self {
            voltage,
            current,
            power,
            energy,
            frequency: NOMINAL_FREQUENCY_HZ,
            power_factor,
        }
    }

    /// Sample returned when the device did not answer at all
    pub fn unavailable() -> Self {
        Self::new(f32::NAN, f32::NAN, f32::NAN, f32::NAN, f32::NAN)
    }

    /// A sample is only usable if voltage, current, power and power factor
    /// are all finite. NaN and infinities both count as undefined
    pub fn validate(&self) -> Result<(), SampleError> {
        [
            (Metric::Voltage, self.voltage),
            (Metric::Current, self.current),
            (Metric::Power, self.power),
            (Metric::PowerFactor, self.power_factor),
        ]
        .iter()
        .find(|(_, value)| !value.is_finite())
        .map_or(Ok(()), |(metric, _)| Err(SampleError::Undefined(*metric)))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Base read operation for the metering device
pub trait Sensor {
    /// Read every metric in one go. Never fails: quantities the device did
    /// not report in time are NaN
    fn read_all(&mut self) -> MetricSample;
}

impl<S: Sensor + ?Sized> Sensor for Box<S> {
    fn read_all(&mut self) -> MetricSample {
        (**self).read_all()
    }
}
