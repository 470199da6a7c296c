use std::time::Duration;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use embedded_io_adapters::std::FromStd;
use serialport::SerialPort;

use crate::config::SensorSettings;

/// Meter serial line. Reads and writes go through the `std::io` adapter;
/// readiness comes from the driver's receive queue count so the meter driver
/// can drop stale bytes without blocking
pub struct SensorPort {
    inner: FromStd<Box<dyn SerialPort>>,
}

impl SensorPort {
    pub fn open(settings: &SensorSettings) -> Result<Self, serialport::Error> {
        let port = serialport::new(&settings.port, settings.baud)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()?;
        Ok(Self::from_port(port))
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self {
            inner: FromStd::new(port),
        }
    }
}

impl ErrorType for SensorPort {
    type Error = std::io::Error;
}

impl Read for SensorPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.inner.read(buf)
    }
}

impl ReadReady for SensorPort {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.inner.inner().bytes_to_read()? > 0)
    }
}

impl Write for SensorPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush()
    }
}
