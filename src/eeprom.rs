use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::fmt::trace;
use crate::settings::{CellStorage, StorageError};

pub const EEPROM_I2C_ADDR_7BIT: u8 = 0x50;

/// 24C02-class (2 Kbit) I2C EEPROM with 8-bit word addresses.
///
/// - One byte per cell, so writes never cross a page boundary.
/// - After a write the part NAKs its address until the internal cycle ends;
///   we poll for the ACK instead of sleeping a fixed tWR.
pub struct Eeprom24<I2C, D> {
    i2c: I2C,
    delay: D,
    addr_7bit: u8,
}

impl<I2C: I2c, D: DelayNs> Eeprom24<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, EEPROM_I2C_ADDR_7BIT)
    }

    pub fn with_address(i2c: I2C, delay: D, addr_7bit: u8) -> Self {
        Self {
            i2c,
            delay,
            addr_7bit,
        }
    }

    pub fn read(&mut self, addr: u8, out: &mut [u8]) -> Result<(), StorageError> {
        self.i2c
            .write_read(self.addr_7bit, &[addr], out)
            .map_err(|_| StorageError::Bus)
    }

    pub fn write_byte(&mut self, addr: u8, value: u8) -> Result<(), StorageError> {
        self.i2c
            .write(self.addr_7bit, &[addr, value])
            .map_err(|_| StorageError::Bus)?;
        self.wait_ready(addr)
    }

    fn wait_ready(&mut self, probe_addr: u8) -> Result<(), StorageError> {
        // Typical tWR is 5 ms; keep a generous timeout.
        const POLL_TIMEOUT_MS: u32 = 20;
        for waited in 0..POLL_TIMEOUT_MS {
            if self.i2c.write(self.addr_7bit, &[probe_addr]).is_ok() {
                trace!("eeprom ready after {} ms", waited);
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(StorageError::Timeout)
    }
}

impl<I2C: I2c, D: DelayNs> CellStorage for Eeprom24<I2C, D> {
    fn read_cell(&mut self, offset: u8) -> Result<u8, StorageError> {
        let mut buf = [0u8; 1];
        self.read(offset, &mut buf)?;
        Ok(buf[0])
    }

    fn write_cell(&mut self, offset: u8, value: u8) -> Result<(), StorageError> {
        self.write_byte(offset, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Simulated part: NAKs for `cycle` transactions after every write.
    struct FakePart {
        memory: [u8; 256],
        pointer: u8,
        busy: u32,
        cycle: u32,
    }

    impl FakePart {
        fn new(cycle: u32) -> Self {
            Self {
                memory: [0; 256],
                pointer: 0,
                busy: 0,
                cycle,
            }
        }
    }

    impl ErrorType for FakePart {
        type Error = ErrorKind;
    }

    impl I2c for FakePart {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != EEPROM_I2C_ADDR_7BIT || self.busy > 0 {
                self.busy = self.busy.saturating_sub(1);
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if let Some((first, data)) = bytes.split_first() {
                            self.pointer = *first;
                            for b in data {
                                self.memory[self.pointer as usize] = *b;
                                self.pointer = self.pointer.wrapping_add(1);
                            }
                            if !data.is_empty() {
                                self.busy = self.cycle;
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        for b in buf.iter_mut() {
                            *b = self.memory[self.pointer as usize];
                            self.pointer = self.pointer.wrapping_add(1);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn cells_survive_write_cycle() {
        let mut eeprom = Eeprom24::new(FakePart::new(3), NoDelay);
        eeprom.write_cell(0, 21).unwrap();
        eeprom.write_cell(1, 1).unwrap();
        assert_eq!(eeprom.read_cell(0), Ok(21));
        assert_eq!(eeprom.read_cell(1), Ok(1));
        assert_eq!(eeprom.read_cell(2), Ok(0));
    }

    #[test]
    fn stuck_part_times_out() {
        let mut eeprom = Eeprom24::new(FakePart::new(u32::MAX), NoDelay);
        assert_eq!(eeprom.write_cell(0, 5), Err(StorageError::Timeout));
    }

    #[test]
    fn wrong_address_is_bus_error() {
        let mut eeprom = Eeprom24::with_address(FakePart::new(0), NoDelay, 0x51);
        assert_eq!(eeprom.read_cell(0), Err(StorageError::Bus));
    }
}
