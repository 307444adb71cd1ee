// Licensed under the Apache-2.0 license

//! Device models that can be attached to a [`Bus`](crate::i3c::bus::Bus).
//!
//! A bus holds a single device type. [`Target`] closes over every model in
//! this module so mixed populations can share one bus without trait
//! objects.

pub mod legacy;
pub mod mock;
pub mod remote;
pub mod sensor;

#[cfg(feature = "i3c_target")]
use crate::i3c::controller_target::ControllerTarget;
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, IbiOutcome, IbiRequest, TargetCore, TargetDevice};
use legacy::{I2cRegisterFile, LegacyI2cTarget};
use mock::MockTarget;
use remote::{BufferLink, RemoteLink, RemoteTarget};
use sensor::SensorTarget;

pub enum Target<R: RemoteLink = BufferLink> {
    Mock(MockTarget),
    Sensor(SensorTarget),
    LegacyI2c(LegacyI2cTarget<I2cRegisterFile>),
    Remote(RemoteTarget<R>),
    #[cfg(feature = "i3c_target")]
    Controller(ControllerTarget),
}

macro_rules! dispatch {
    ($self:expr, $target:ident => $body:expr) => {
        match $self {
            Target::Mock($target) => $body,
            Target::Sensor($target) => $body,
            Target::LegacyI2c($target) => $body,
            Target::Remote($target) => $body,
            #[cfg(feature = "i3c_target")]
            Target::Controller($target) => $body,
        }
    };
}

impl<R: RemoteLink> Target<R> {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            Self::Sensor(_) => "sensor",
            Self::LegacyI2c(_) => "legacy-i2c",
            Self::Remote(_) => "remote",
            #[cfg(feature = "i3c_target")]
            Self::Controller(_) => "controller",
        }
    }
}

impl<R: RemoteLink> From<MockTarget> for Target<R> {
    fn from(target: MockTarget) -> Self {
        Self::Mock(target)
    }
}

impl<R: RemoteLink> From<SensorTarget> for Target<R> {
    fn from(target: SensorTarget) -> Self {
        Self::Sensor(target)
    }
}

impl<R: RemoteLink> From<LegacyI2cTarget<I2cRegisterFile>> for Target<R> {
    fn from(target: LegacyI2cTarget<I2cRegisterFile>) -> Self {
        Self::LegacyI2c(target)
    }
}

impl<R: RemoteLink> From<RemoteTarget<R>> for Target<R> {
    fn from(target: RemoteTarget<R>) -> Self {
        Self::Remote(target)
    }
}

#[cfg(feature = "i3c_target")]
impl<R: RemoteLink> From<ControllerTarget> for Target<R> {
    fn from(target: ControllerTarget) -> Self {
        Self::Controller(target)
    }
}

impl<R: RemoteLink> TargetDevice for Target<R> {
    fn core(&self) -> &TargetCore {
        dispatch!(self, target => target.core())
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        dispatch!(self, target => target.core_mut())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        dispatch!(self, target => target.send(data))
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        dispatch!(self, target => target.recv(buf))
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        dispatch!(self, target => target.event(event))
    }

    fn handle_ccc_read(&mut self, ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error> {
        dispatch!(self, target => target.handle_ccc_read(ccc, buf))
    }

    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error> {
        dispatch!(self, target => target.handle_ccc_write(ccc, data))
    }

    fn is_legacy_i2c(&self) -> bool {
        dispatch!(self, target => target.is_legacy_i2c())
    }

    fn take_ibi(&mut self) -> Option<IbiRequest> {
        dispatch!(self, target => target.take_ibi())
    }

    fn ibi_done(&mut self, outcome: IbiOutcome) {
        dispatch!(self, target => target.ibi_done(outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i3c::bus::Bus;
    use crate::i3c::ccc;
    use crate::i3c::common::{Direction, BROADCAST_ADDR};
    use crate::i3c::i2c_compat::LegacyI2c;
    use embedded_hal::i2c::I2c;

    fn mixed_bus() -> Bus<Target> {
        let mut bus = Bus::default();
        bus.register(MockTarget::new(0, 0x0000_0000_00aa, 0x10, 0).into())
            .unwrap();
        bus.register(SensorTarget::new(0).into()).unwrap();
        bus.register(
            LegacyI2cTarget::new(0x50, I2cRegisterFile::new())
                .unwrap()
                .into(),
        )
        .unwrap();
        bus
    }

    fn entdaa_round(bus: &mut Bus<Target>, address: u8) -> [u8; 8] {
        bus.start_transfer(BROADCAST_ADDR, Direction::Read).unwrap();
        let mut id = [0u8; 8];
        assert_eq!(bus.recv(&mut id), Ok(8));
        bus.send(&[address]).unwrap();
        id
    }

    #[test]
    fn entdaa_across_device_kinds_skips_legacy() {
        let mut bus = mixed_bus();
        bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
        bus.send(&[ccc::ENTDAA]).unwrap();
        let first = entdaa_round(&mut bus, 0x08);
        let second = entdaa_round(&mut bus, 0x09);
        assert_eq!(
            bus.start_transfer(BROADCAST_ADDR, Direction::Read),
            Err(Error::AddressNack)
        );
        bus.end_transfer();

        // The mock has the lower PID and wins the first round.
        assert_eq!(first.first(), Some(&0xaa));
        assert_eq!(second.first(), Some(&0x02));
        let kinds: [(&str, Option<u8>); 3] = [
            (bus.devices()[0].kind(), bus.devices()[0].core().dynamic_address()),
            (bus.devices()[1].kind(), bus.devices()[1].core().dynamic_address()),
            (bus.devices()[2].kind(), bus.devices()[2].core().dynamic_address()),
        ];
        assert_eq!(
            kinds,
            [
                ("mock", Some(0x08)),
                ("sensor", Some(0x09)),
                ("legacy-i2c", None)
            ]
        );
    }

    #[test]
    fn legacy_device_reachable_beside_i3c_targets() {
        let mut bus = mixed_bus();
        let mut buf = [0u8; 1];
        {
            let mut i2c = LegacyI2c::new(&mut bus);
            i2c.write(0x50, &[0x00, 0x5a]).unwrap();
            i2c.write_read(0x50, &[0x00], &mut buf).unwrap();
        }
        assert_eq!(buf, [0x5a]);
    }
}
