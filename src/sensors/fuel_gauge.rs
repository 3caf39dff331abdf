//! MAX17048 battery fuel gauge driver.
//!
//! Register-level driver over any [`embedded_hal::i2c::I2c`] bus.  The gauge
//! runs its ModelGauge algorithm autonomously; the driver only reads VCELL
//! and SOC and can issue a quick-start to re-seed the model after a battery
//! swap.

use embedded_hal::i2c::I2c;

use crate::error::SensorError;
use crate::pins::MAX17048_I2C_ADDR;

const REG_VCELL: u8 = 0x02;
const REG_SOC: u8 = 0x04;
const REG_MODE: u8 = 0x06;
const REG_VERSION: u8 = 0x08;

const MODE_QUICK_START: u8 = 0x80;
const MODE_SLEEP_BITS: u8 = 0x60;

pub struct Max17048<B> {
    bus: B,
    addr: u8,
}

impl<B> Max17048<B>
where
    B: I2c,
{
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            addr: MAX17048_I2C_ADDR,
        }
    }

    /// Battery state of charge in percent (1/256 % per LSB).
    pub fn state_of_charge(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_u16(REG_SOC)?;
        Ok(f32::from(raw) / 256.0)
    }

    /// Cell voltage in volts.
    pub fn cell_voltage(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_u16(REG_VCELL)?;
        Ok(f32::from(raw) / 12_000.0)
    }

    /// Silicon version register.
    pub fn version(&mut self) -> Result<u16, SensorError> {
        self.read_u16(REG_VERSION)
    }

    /// Restart the ModelGauge calculation: set the QuickStart bit and clear
    /// the sleep/hibernate bits in the mode register's high byte.
    pub fn quick_start(&mut self) -> Result<(), SensorError> {
        let mut mode = [0u8; 1];
        self.bus
            .write_read(self.addr, &[REG_MODE], &mut mode)
            .map_err(|_| SensorError::I2cReadFailed)?;
        let value = (mode[0] | MODE_QUICK_START) & !MODE_SLEEP_BITS;
        self.bus
            .write(self.addr, &[REG_MODE, value])
            .map_err(|_| SensorError::I2cWriteFailed)
    }

    fn read_u16(&mut self, reg: u8) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.bus
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(|_| SensorError::I2cReadFailed)?;
        Ok((u16::from(buf[0]) << 8) | u16::from(buf[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation, SevenBitAddress};
    use std::collections::HashMap;

    /// Register-map mock: answers write-read transactions from a map and
    /// records plain writes.
    struct RegBus {
        regs: HashMap<u8, Vec<u8>>,
        writes: Vec<Vec<u8>>,
    }

    impl RegBus {
        fn new(regs: &[(u8, &[u8])]) -> Self {
            Self {
                regs: regs.iter().map(|(r, v)| (*r, v.to_vec())).collect(),
                writes: Vec::new(),
            }
        }
    }

    impl ErrorType for RegBus {
        type Error = ErrorKind;
    }

    impl I2c for RegBus {
        fn transaction(
            &mut self,
            address: SevenBitAddress,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            assert_eq!(address, MAX17048_I2C_ADDR);
            let mut reg = None;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        if bytes.len() == 1 {
                            reg = Some(bytes[0]);
                        } else {
                            self.writes.push(bytes.to_vec());
                        }
                    }
                    Operation::Read(buf) => {
                        let reg = reg.expect("read without register select");
                        let data = self.regs.get(&reg).ok_or(ErrorKind::Other)?;
                        buf.copy_from_slice(&data[..buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn soc_is_raw_over_256() {
        // 0x5F40 = 24384 -> 95.25 %
        let bus = RegBus::new(&[(REG_SOC, &[0x5F, 0x40])]);
        let mut gauge = Max17048::new(bus);
        let soc = gauge.state_of_charge().unwrap();
        assert!((soc - 95.25).abs() < 1e-4);
    }

    #[test]
    fn voltage_conversion() {
        // 0xB400 = 46080 -> 3.84 V
        let bus = RegBus::new(&[(REG_VCELL, &[0xB4, 0x00])]);
        let mut gauge = Max17048::new(bus);
        let v = gauge.cell_voltage().unwrap();
        assert!((v - 3.84).abs() < 1e-3);
    }

    #[test]
    fn version_big_endian() {
        let bus = RegBus::new(&[(REG_VERSION, &[0x00, 0x12])]);
        let mut gauge = Max17048::new(bus);
        assert_eq!(gauge.version().unwrap(), 0x0012);
    }

    #[test]
    fn quick_start_sets_bit_and_clears_sleep() {
        let bus = RegBus::new(&[(REG_MODE, &[0x60])]);
        let mut gauge = Max17048::new(bus);
        gauge.quick_start().unwrap();
        assert_eq!(gauge.bus.writes, vec![vec![REG_MODE, 0x80]]);
    }

    #[test]
    fn read_error_is_mapped() {
        let bus = RegBus::new(&[]);
        let mut gauge = Max17048::new(bus);
        assert_eq!(gauge.state_of_charge(), Err(SensorError::I2cReadFailed));
    }
}
