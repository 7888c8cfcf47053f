//! DS18B20 scratchpad acquisition and decoding.
//!
//! The bus sequence is search, Convert T, wait for the device to release the
//! bus, presence check, Read Scratchpad. Decoding turns the first two
//! scratchpad bytes into hundredths of a degree Celsius with the integer
//! `6.25` scaling the device family expects.

use embedded_hal_02::blocking::delay::DelayUs;
use embedded_hal_02::digital::v2::{InputPin, OutputPin};
use one_wire_bus::{Address, OneWire, OneWireError};

use crate::fmt::{debug, warn};
use crate::{CONVERSION_POLL_MS, CONVERSION_TIMEOUT_MS};

pub mod commands {
    pub const CONVERT_TEMP: u8 = 0x44;
    pub const READ_SCRATCHPAD: u8 = 0xBE;
}

pub const SCRATCHPAD_LEN: usize = 9;

pub type Scratchpad = [u8; SCRATCHPAD_LEN];

const _: () = assert!(CONVERSION_POLL_MS * 1000 <= u16::MAX as u32);
const POLL_DELAY_US: u16 = (CONVERSION_POLL_MS * 1000) as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Nothing answered the search, or the presence pulse after conversion was missing.
    NoDevice,
    /// Pin or timing failure on the one-wire bus.
    Bus,
}

/// One decoded scratchpad.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub scratchpad: Scratchpad,
    /// Temperature in 1/100 °C.
    pub hundredths: i32,
}

impl Reading {
    pub fn from_scratchpad(scratchpad: Scratchpad) -> Self {
        Self {
            scratchpad,
            hundredths: decode_scratchpad(&scratchpad),
        }
    }

    /// Temperature in °C, assembled from the whole and fractional hundredths.
    pub fn celsius(&self) -> f32 {
        let magnitude = self.hundredths.unsigned_abs();
        let whole = (magnitude / 100) as f32;
        let fract = (magnitude % 100) as f32 / 100.0;
        let value = whole + fract;
        if self.hundredths < 0 {
            -value
        } else {
            value
        }
    }
}

/// Converts the raw temperature register (bytes 0 and 1) to hundredths of a degree.
pub fn decode_scratchpad(scratchpad: &Scratchpad) -> i32 {
    let raw = u16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    let negative = raw & 0x8000 != 0;
    let magnitude = if negative {
        (!raw).wrapping_add(1)
    } else {
        raw
    } as i32;

    // 6.25 per LSB
    let tc_100 = magnitude * 6 + magnitude / 4;

    if negative {
        -tc_100
    } else {
        tc_100
    }
}

/// Dallas/Maxim CRC-8. Running it over a block that ends with its own CRC yields 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for b in data {
        let mut data_byte = *b;
        for _ in 0..8 {
            let mix = (crc ^ data_byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            data_byte >>= 1;
        }
    }
    crc
}

/// The bus transactions the decoder needs from a one-wire master.
pub trait ScratchpadBus {
    type Error;

    /// First device found by a ROM search, `None` if nothing answered.
    fn search(&mut self) -> Result<Option<Address>, Self::Error>;

    fn start_conversion(&mut self, address: &Address) -> Result<(), Self::Error>;

    /// Blocks until the conversion has finished (or timed out), then resets
    /// the bus. Returns whether a device answered the reset with a presence pulse.
    fn wait_conversion(&mut self) -> Result<bool, Self::Error>;

    fn read_scratchpad(&mut self, address: &Address) -> Result<Scratchpad, Self::Error>;
}

/// [`ScratchpadBus`] over a bit-banged open-drain pin.
pub struct OneWireBus<P, D> {
    wire: OneWire<P>,
    delay: D,
}

impl<P, D, E> OneWireBus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    pub fn new(pin: P, delay: D) -> Result<Self, OneWireError<E>> {
        Ok(Self {
            wire: OneWire::new(pin)?,
            delay,
        })
    }
}

impl<P, D, E> ScratchpadBus for OneWireBus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    type Error = OneWireError<E>;

    fn search(&mut self) -> Result<Option<Address>, Self::Error> {
        let found = self.wire.device_search(None, false, &mut self.delay)?;
        Ok(found.map(|(address, _state)| address))
    }

    fn start_conversion(&mut self, address: &Address) -> Result<(), Self::Error> {
        self.wire
            .send_command(commands::CONVERT_TEMP, Some(address), &mut self.delay)
    }

    fn wait_conversion(&mut self) -> Result<bool, Self::Error> {
        // The device holds the read slot low until the conversion is done
        let mut waited = 0;
        while !self.wire.read_bit(&mut self.delay)? {
            if waited >= CONVERSION_TIMEOUT_MS {
                warn!("conversion still running after {} ms", waited);
                break;
            }
            self.delay.delay_us(POLL_DELAY_US);
            waited += CONVERSION_POLL_MS;
        }
        self.wire.reset(&mut self.delay)
    }

    fn read_scratchpad(&mut self, address: &Address) -> Result<Scratchpad, Self::Error> {
        self.wire
            .send_command(commands::READ_SCRATCHPAD, Some(address), &mut self.delay)?;
        let mut data = [0; SCRATCHPAD_LEN];
        self.wire.read_bytes(&mut data, &mut self.delay)?;
        Ok(data)
    }
}

/// Temperature sensor on a [`ScratchpadBus`].
pub struct Sensor<B> {
    bus: B,
}

impl<B: ScratchpadBus> Sensor<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Runs one full acquisition. On `Err` nothing about the previous reading changes.
    pub fn decode(&mut self) -> Result<Reading, SensorError> {
        let address = self
            .bus
            .search()
            .map_err(|_| SensorError::Bus)?
            .ok_or(SensorError::NoDevice)?;

        self.bus
            .start_conversion(&address)
            .map_err(|_| SensorError::Bus)?;

        let present = self.bus.wait_conversion().map_err(|_| SensorError::Bus)?;
        if !present {
            return Err(SensorError::NoDevice);
        }

        let scratchpad = self
            .bus
            .read_scratchpad(&address)
            .map_err(|_| SensorError::Bus)?;

        if crc8(&scratchpad) != 0 {
            warn!("scratchpad CRC mismatch: {:x}", scratchpad);
        }

        let reading = Reading::from_scratchpad(scratchpad);
        debug!("sensor {=u64:x}: {} /100 C", address.0, reading.hundredths);
        Ok(reading)
    }

    pub fn bus(&mut self) -> &mut B {
        &mut self.bus
    }
}
