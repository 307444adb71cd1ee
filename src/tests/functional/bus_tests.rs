// Licensed under the Apache-2.0 license

use crate::i3c::bus::Bus;
use crate::i3c::ccc;
use crate::i3c::common::{Direction, BROADCAST_ADDR};
use crate::i3c::devices::mock::MockTarget;
use crate::i3c::devices::sensor::{reg, SensorTarget, CTRL3_C_IF_INC, WHO_AM_I_VALUE};
use crate::i3c::devices::Target;
use crate::i3c::target::TargetDevice;
use embedded_io::Write;
use hex_literal::hex;

const SENSOR_ADDR: u8 = 0x6a;
const MOCK_ADDR: u8 = 0x48;

pub fn run_bus_tests<W: Write>(out: &mut W) {
    writeln!(out, "\r\n=== I3C Bus Tests ===\r").unwrap();

    test_setaasa_then_register_access(out);
    test_rstdaa_then_entdaa(out);
    test_direct_getpid(out);
    test_broadcast_setmrl(out);

    writeln!(out, "\r\n=== All Bus Tests Passed ===\r").unwrap();
}

fn populated_bus() -> Bus<Target> {
    let mut bus = Bus::default();
    bus.register(SensorTarget::new(SENSOR_ADDR).into()).unwrap();
    bus.register(MockTarget::new(MOCK_ADDR, 0x0000_0000_0001, 0x10, 0xee).into())
        .unwrap();
    bus
}

fn sensor(bus: &Bus<Target>) -> &SensorTarget {
    match bus.device(0) {
        Some(Target::Sensor(sensor)) => sensor,
        _ => panic!("slot 0 is not the sensor"),
    }
}

fn broadcast(bus: &mut Bus<Target>, bytes: &[u8]) {
    bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
    for byte in bytes {
        bus.send(&[*byte]).unwrap();
    }
    bus.end_transfer();
}

fn test_setaasa_then_register_access<W: Write>(out: &mut W) {
    write!(out, "Testing SETAASA and register access... ").unwrap();

    let mut bus = populated_bus();
    broadcast(&mut bus, &[ccc::SETAASA]);
    assert_eq!(bus.device(0).unwrap().core().dynamic_address(), Some(SENSOR_ADDR));
    assert_eq!(bus.device(1).unwrap().core().dynamic_address(), Some(MOCK_ADDR));

    bus.start_transfer(SENSOR_ADDR, Direction::Write).unwrap();
    bus.send(&[reg::CTRL3_C]).unwrap();
    bus.send(&[CTRL3_C_IF_INC]).unwrap();
    bus.end_transfer();

    bus.start_transfer(SENSOR_ADDR, Direction::Write).unwrap();
    bus.send(&[reg::OUTX_L_G]).unwrap();
    bus.start_transfer(SENSOR_ADDR, Direction::Read).unwrap();
    let mut gyro = [0u8; 6];
    assert_eq!(bus.recv(&mut gyro), Ok(6));
    bus.end_transfer();
    for (offset, byte) in gyro.iter().enumerate() {
        assert_eq!(sensor(&bus).register(reg::OUTX_L_G + offset as u8), Some(*byte));
    }

    bus.start_transfer(SENSOR_ADDR, Direction::Write).unwrap();
    bus.send(&[reg::WHO_AM_I]).unwrap();
    bus.start_transfer(SENSOR_ADDR, Direction::Read).unwrap();
    let mut id = [0u8; 1];
    assert_eq!(bus.recv(&mut id), Ok(1));
    bus.end_transfer();
    assert_eq!(id, [WHO_AM_I_VALUE]);

    writeln!(out, "PASSED\r").unwrap();
}

fn entdaa_round(bus: &mut Bus<Target>, address: u8) -> [u8; 8] {
    bus.start_transfer(BROADCAST_ADDR, Direction::Read).unwrap();
    let mut id = [0u8; 8];
    assert_eq!(bus.recv(&mut id), Ok(8));
    bus.send(&[address]).unwrap();
    id
}

fn test_rstdaa_then_entdaa<W: Write>(out: &mut W) {
    write!(out, "Testing RSTDAA followed by ENTDAA... ").unwrap();

    let mut bus = populated_bus();
    broadcast(&mut bus, &[ccc::SETAASA]);
    broadcast(&mut bus, &[ccc::RSTDAA]);
    assert!(bus.devices().iter().all(|dev| dev.core().dynamic_address().is_none()));

    bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
    bus.send(&[ccc::ENTDAA]).unwrap();
    let first = entdaa_round(&mut bus, 0x10);
    let second = entdaa_round(&mut bus, 0x11);
    bus.end_transfer();

    // PID (little endian), BCR and DCR; the mock has the lower PID.
    assert_eq!(first, hex!("010000000000 06 00"));
    assert_eq!(second, hex!("0208006c100b 07 44"));
    assert_eq!(bus.device(1).unwrap().core().dynamic_address(), Some(0x10));
    assert_eq!(bus.device(0).unwrap().core().dynamic_address(), Some(0x11));

    writeln!(out, "PASSED\r").unwrap();
}

fn test_direct_getpid<W: Write>(out: &mut W) {
    write!(out, "Testing direct GETPID... ").unwrap();

    let mut bus = populated_bus();
    broadcast(&mut bus, &[ccc::SETAASA]);

    bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
    bus.send(&[ccc::GETPID]).unwrap();
    bus.start_transfer(SENSOR_ADDR, Direction::Read).unwrap();
    let mut pid = [0u8; 6];
    assert_eq!(bus.recv(&mut pid), Ok(6));
    bus.end_transfer();
    assert_eq!(pid, hex!("0208006c100b"));

    writeln!(out, "PASSED\r").unwrap();
}

fn test_broadcast_setmrl<W: Write>(out: &mut W) {
    write!(out, "Testing broadcast SETMRL and GETMRL... ").unwrap();

    let mut bus = populated_bus();
    broadcast(&mut bus, &[ccc::SETAASA]);
    broadcast(&mut bus, &[ccc::SETMRL, 0x00, 0x40]);
    assert_eq!(sensor(&bus).max_read_len(), 0x40);

    bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
    bus.send(&[ccc::GETMRL]).unwrap();
    bus.start_transfer(SENSOR_ADDR, Direction::Read).unwrap();
    let mut mrl = [0u8; 2];
    assert_eq!(bus.recv(&mut mrl), Ok(2));
    bus.end_transfer();
    assert_eq!(mrl, [0x00, 0x40]);

    writeln!(out, "PASSED\r").unwrap();
}
