// Licensed under the Apache-2.0 license

//! `embedded-hal` I2C view of the legacy segment of a bus.
//!
//! Drivers written against `embedded_hal::i2c::I2c` can talk to the legacy
//! I2C targets of a [`Bus`] without knowing about I3C.

use crate::common::Logger;
use crate::i3c::bus::Bus;
use crate::i3c::common::Direction;
use crate::i3c::error::Error;
use crate::i3c::target::TargetDevice;
use embedded_hal::i2c::{Operation, SevenBitAddress};

pub struct LegacyI2c<'a, D: TargetDevice, L: Logger> {
    bus: &'a mut Bus<D, L>,
}

impl<'a, D: TargetDevice, L: Logger> LegacyI2c<'a, D, L> {
    pub fn new(bus: &'a mut Bus<D, L>) -> Self {
        Self { bus }
    }

    fn run(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        let mut previous: Option<Direction> = None;
        for operation in operations {
            let direction = match operation {
                Operation::Read(_) => Direction::Read,
                Operation::Write(_) => Direction::Write,
            };
            // Adjacent operations of the same kind share one START.
            if previous != Some(direction) {
                self.bus.legacy_start(address, direction)?;
                previous = Some(direction);
            }
            match operation {
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = self.bus.legacy_recv();
                    }
                }
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        self.bus.legacy_send(byte)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<D: TargetDevice, L: Logger> embedded_hal::i2c::ErrorType for LegacyI2c<'_, D, L> {
    type Error = Error;
}

impl<D: TargetDevice, L: Logger> embedded_hal::i2c::I2c for LegacyI2c<'_, D, L> {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let result = self.run(address, operations);
        if result.is_err() {
            self.bus.legacy_nack();
        }
        self.bus.legacy_end();
        result
    }
}
