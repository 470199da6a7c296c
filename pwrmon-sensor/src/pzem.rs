/// [PZEM-004T v3.0](https://innovatorsguru.com/pzem-004t-v3/) AC energy meter.
/// Talks Modbus-RTU at 9600 8N1; all live measurements sit in ten
/// consecutive input registers starting at 0x0000
use embedded_io::{Read, ReadExactError, ReadReady, Write};
use thiserror::Error;

use crate::{MetricSample, Sensor};

/// General (broadcast) slave address, answered by any single meter on the bus
pub const DEFAULT_ADDRESS: u8 = 0xf8;

const READ_INPUT_REGISTERS: u8 = 0x04;
const EXCEPTION_FLAG: u8 = 0x80;
const REGISTER_COUNT: u16 = 10;
// addr + function + byte count + registers + crc
const RESPONSE_LEN: usize = 3 + 2 * REGISTER_COUNT as usize + 2;
// Most stale bytes dropped in one resync, so a babbling line cannot stall a read
const MAX_DISCARD: usize = 256;

#[derive(Error, Debug)]
pub enum PzemError {
    #[error("Serial I/O Error {0}")]
    Io(String),
    #[error("Response frame truncated")]
    ShortFrame,
    #[error("CRC mismatch, computed {computed:#06x} received {received:#06x}")]
    Crc { computed: u16, received: u16 },
    #[error("Unexpected response header {0:02x?}")]
    Header([u8; 3]),
    #[error("Device exception code {0:#04x}")]
    Exception(u8),
}

/// Raw measurements as scaled from the register block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub energy: f32,
    pub frequency: f32,
    pub power_factor: f32,
    pub alarm: bool,
}

pub struct Pzem004t<P> {
    port: P,
    address: u8,
}

impl<P> Pzem004t<P>
where
    P: Read + Write + ReadReady,
{
    pub fn new(port: P, address: u8) -> Self {
        Self { port, address }
    }

    pub fn release(self) -> P {
        self.port
    }

    /// One request/response exchange. Anything already waiting on the line
    /// is dropped before the request goes out, and a frame that fails its
    /// CRC or header check flushes whatever follows it, so one corrupted
    /// reply cannot shift every later frame
    pub fn measurements(&mut self) -> Result<Measurements, PzemError> {
        self.discard_input()?;

        let result = self.exchange();
        if let Err(PzemError::Crc { .. } | PzemError::Header(_)) = result {
            if let Err(e) = self.discard_input() {
                log::warn!("Unable to resync PZEM-004T line {e:}");
            }
        }
        result
    }

    /// Drop whatever is buffered on the receive side, returning the count
    fn discard_input(&mut self) -> Result<usize, PzemError> {
        let mut scratch = [0u8; 32];
        let mut dropped = 0;
        while dropped < MAX_DISCARD && self.port.read_ready().map_err(io_err)? {
            let n = self.port.read(&mut scratch).map_err(io_err)?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            log::debug!("Discarded {dropped} stale bytes from the PZEM-004T line");
        }
        Ok(dropped)
    }

    fn exchange(&mut self) -> Result<Measurements, PzemError> {
        let request = read_request(self.address);
        self.port
            .write_all(&request)
            .map_err(io_err)?;
        self.port.flush().map_err(io_err)?;

        let mut frame = [0u8; RESPONSE_LEN];
        self.port
            .read_exact(&mut frame[..3])
            .map_err(read_exact_err)?;

        if frame[1] & EXCEPTION_FLAG != 0 {
            // exception responses are addr, function | 0x80, code, crc
            self.port
                .read_exact(&mut frame[3..5])
                .map_err(read_exact_err)?;
            check_crc(&frame[..5])?;
            return Err(PzemError::Exception(frame[2]));
        }

        self.port
            .read_exact(&mut frame[3..])
            .map_err(read_exact_err)?;
        log::trace!("PZEM response {:02x?}", frame);

        parse_response(self.address, &frame)
    }
}

impl<P> Sensor for Pzem004t<P>
where
    P: Read + Write + ReadReady,
{
    fn read_all(&mut self) -> MetricSample {
        match self.measurements() {
            Ok(m) => {
                if m.alarm {
                    log::warn!("PZEM-004T power alarm is set");
                }
                MetricSample::new(m.voltage, m.current, m.power, m.energy, m.power_factor)
            }
            Err(e) => {
                log::error!("Error reading PZEM-004T {e:}");
                MetricSample::unavailable()
            }
        }
    }
}

fn io_err<E: core::fmt::Debug>(e: E) -> PzemError {
    PzemError::Io(format!("{e:?}"))
}

fn read_exact_err<E: core::fmt::Debug>(e: ReadExactError<E>) -> PzemError {
    match e {
        ReadExactError::UnexpectedEof => PzemError::ShortFrame,
        ReadExactError::Other(e) => io_err(e),
    }
}

/// Modbus CRC-16 (poly 0xA001 reflected, init 0xFFFF). Sent low byte first
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xffff_u16, |crc, &byte| {
        (0..8).fold(crc ^ u16::from(byte), |crc, _| {
            if crc & 1 != 0 {
                (crc >> 1) ^ 0xa001
            } else {
                crc >> 1
            }
        })
    })
}

fn check_crc(frame: &[u8]) -> Result<(), PzemError> {
    let (body, tail) = frame.split_at(frame.len() - 2);
    let computed = crc16(body);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    if computed != received {
        return Err(PzemError::Crc { computed, received });
    }
    Ok(())
}

fn read_request(address: u8) -> [u8; 8] {
    let mut request = [0u8; 8];
    request[0] = address;
    request[1] = READ_INPUT_REGISTERS;
    request[2..4].copy_from_slice(&0u16.to_be_bytes());
    request[4..6].copy_from_slice(&REGISTER_COUNT.to_be_bytes());
    let crc = crc16(&request[..6]);
    request[6..].copy_from_slice(&crc.to_le_bytes());
    request
}

fn parse_response(address: u8, frame: &[u8; RESPONSE_LEN]) -> Result<Measurements, PzemError> {
    check_crc(frame)?;

    // A meter polled on the general address answers with its own address
    let address_ok = address == DEFAULT_ADDRESS || frame[0] == address;
    if !address_ok
        || frame[1] != READ_INPUT_REGISTERS
        || usize::from(frame[2]) != 2 * REGISTER_COUNT as usize
    {
        return Err(PzemError::Header([frame[0], frame[1], frame[2]]));
    }

    let data = &frame[3..RESPONSE_LEN - 2];
    let reg = |i: usize| u16::from_be_bytes([data[2 * i], data[2 * i + 1]]);
    // 32 bit values are sent low word first
    let wide = |i: usize| u32::from(reg(i)) | (u32::from(reg(i + 1)) << 16);

    Ok(Measurements {
        voltage: f32::from(reg(0)) / 10.0,
        current: wide(1) as f32 / 1000.0,
        power: wide(3) as f32 / 10.0,
        energy: wide(5) as f32,
        frequency: f32::from(reg(7)) / 10.0,
        power_factor: f32::from(reg(8)) / 100.0,
        alarm: reg(9) != 0,
    })
}
