// Licensed under the Apache-2.0 license

//! Legacy I2C devices on the shared bus.
//!
//! [`LegacyI2cTarget`] adapts any device written against the
//! `proposed_traits::i2c_target` callbacks to the bus. Such devices only
//! live on the legacy segment: they take no part in I3C address matching
//! and refuse every CCC.

use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, TargetCore, TargetDevice};
use proposed_traits::i2c_target::{I2CCoreTarget, ReadTarget, RegisterAccess, WriteTarget};

pub struct LegacyI2cTarget<T> {
    core: TargetCore,
    device: T,
    in_transaction: bool,
}

impl<T> LegacyI2cTarget<T>
where
    T: I2CCoreTarget + ReadTarget + WriteTarget,
{
    /// # Errors
    ///
    /// `Error::AddressNack` when the device refuses `address` during `init`.
    pub fn new(address: u8, mut device: T) -> Result<Self, Error> {
        device.init(address).map_err(|_| Error::AddressNack)?;
        Ok(Self {
            core: TargetCore::new(address, 0, 0, 0),
            device,
            in_transaction: false,
        })
    }

    #[must_use]
    pub const fn device(&self) -> &T {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut T {
        &mut self.device
    }
}

impl<T> TargetDevice for LegacyI2cTarget<T>
where
    T: I2CCoreTarget + ReadTarget + WriteTarget,
{
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.device
            .on_write(data)
            .map(|()| data.len())
            .map_err(|_| Error::DataNack)
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        self.device.on_read(buf).map_or(0, |count| count.min(buf.len()))
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        match event {
            TargetEvent::StartSend | TargetEvent::StartRecv => {
                if !self.device.on_address_match(self.core.static_address()) {
                    return Err(Error::AddressNack);
                }
                self.device.on_transaction_start(self.in_transaction);
                self.in_transaction = true;
            }
            TargetEvent::Stop => {
                self.in_transaction = false;
                self.device.on_stop();
            }
            TargetEvent::Nack => {}
        }
        Ok(())
    }

    fn handle_ccc_read(&mut self, _ccc: CccCursor, _buf: &mut [u8]) -> Result<usize, Error> {
        Err(Error::DataNack)
    }

    fn handle_ccc_write(&mut self, _ccc: CccCursor, _data: &[u8]) -> Result<(), Error> {
        Err(Error::DataNack)
    }

    fn is_legacy_i2c(&self) -> bool {
        true
    }
}

pub const REGISTER_FILE_SIZE: usize = 256;

/// EEPROM-style I2C device: the first written byte sets the register
/// pointer, later bytes are stored from there and reads continue from it.
pub struct I2cRegisterFile {
    address: u8,
    regs: [u8; REGISTER_FILE_SIZE],
    pointer: u8,
    pointer_set: bool,
}

impl Default for I2cRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cRegisterFile {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            address: 0,
            regs: [0; REGISTER_FILE_SIZE],
            pointer: 0,
            pointer_set: false,
        }
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.regs
    }
}

impl embedded_hal::i2c::ErrorType for I2cRegisterFile {
    type Error = Error;
}

impl I2CCoreTarget for I2cRegisterFile {
    fn init(&mut self, address: u8) -> Result<(), Self::Error> {
        if address == 0 || address > 0x7f {
            return Err(Error::ReservedAddress);
        }
        self.address = address;
        Ok(())
    }

    fn on_transaction_start(&mut self, _repeated: bool) {
        self.pointer_set = false;
    }

    fn on_stop(&mut self) {
        self.pointer_set = false;
    }

    fn on_address_match(&mut self, address: u8) -> bool {
        self.address == address
    }
}

impl ReadTarget for I2cRegisterFile {
    fn on_read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let pointer = self.pointer;
        let count = self.read_register(pointer, buffer)?;
        self.pointer = self.pointer.wrapping_add(count as u8);
        Ok(count)
    }
}

impl WriteTarget for I2cRegisterFile {
    fn on_write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut bytes = data.iter();
        if !self.pointer_set {
            if let Some(&pointer) = bytes.next() {
                self.pointer = pointer;
                self.pointer_set = true;
            }
        }
        for &byte in bytes {
            self.write_register(self.pointer, byte)?;
            self.pointer = self.pointer.wrapping_add(1);
        }
        Ok(())
    }
}

impl proposed_traits::i2c_target::WriteReadTarget for I2cRegisterFile {}

impl RegisterAccess for I2cRegisterFile {
    fn write_register(&mut self, register: u8, data: u8) -> Result<(), Self::Error> {
        let slot = self
            .regs
            .get_mut(usize::from(register))
            .ok_or(Error::DataNack)?;
        *slot = data;
        Ok(())
    }

    fn read_register(&mut self, register: u8, data: &mut [u8]) -> Result<usize, Self::Error> {
        let mut index = register;
        for byte in data.iter_mut() {
            *byte = self.regs.get(usize::from(index)).copied().unwrap_or(0xff);
            index = index.wrapping_add(1);
        }
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i3c::bus::Bus;
    use crate::i3c::common::{Direction, BROADCAST_ADDR};
    use crate::i3c::i2c_compat::LegacyI2c;
    use embedded_hal::i2c::I2c;

    fn bus() -> Bus<LegacyI2cTarget<I2cRegisterFile>> {
        let mut bus = Bus::default();
        bus.register(LegacyI2cTarget::new(0x50, I2cRegisterFile::new()).unwrap())
            .unwrap();
        bus
    }

    #[test]
    fn eeprom_write_then_random_read() {
        let mut bus = bus();
        let mut i2c = LegacyI2c::new(&mut bus);
        i2c.write(0x50, &[0x10, 0xde, 0xad, 0xbe, 0xef]).unwrap();
        let mut buf = [0u8; 4];
        i2c.write_read(0x50, &[0x10], &mut buf).unwrap();
        assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(bus.device(0).unwrap().device().contents()[0x12], 0xbe);
    }

    #[test]
    fn pointer_wraps_at_end_of_file() {
        let mut bus = bus();
        let mut i2c = LegacyI2c::new(&mut bus);
        i2c.write(0x50, &[0xff, 0x01, 0x02]).unwrap();
        let mut buf = [0u8; 2];
        i2c.write_read(0x50, &[0xff], &mut buf).unwrap();
        assert_eq!(buf, [0x01, 0x02]);
    }

    #[test]
    fn invisible_to_i3c_and_refuses_cccs() {
        let mut bus = bus();
        assert_eq!(
            bus.start_transfer(0x50, Direction::Write),
            Err(Error::AddressNack)
        );
        assert_eq!(
            bus.start_transfer(BROADCAST_ADDR, Direction::Write),
            Err(Error::AddressNack)
        );
        let target = bus.device_mut(0).unwrap();
        assert_eq!(
            target.handle_ccc_write(CccCursor::default(), &[0]),
            Err(Error::DataNack)
        );
        assert!(target.is_legacy_i2c());
    }

    #[test]
    fn init_rejects_general_call_address() {
        assert_eq!(
            LegacyI2cTarget::new(0x00, I2cRegisterFile::new()).err(),
            Some(Error::AddressNack)
        );
    }
}
