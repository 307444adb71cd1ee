// Licensed under the Apache-2.0 license

use crate::i3c::address_table::AddressTableEntry;
use crate::i3c::ccc;
use crate::i3c::common::ControllerConfigBuilder;
use crate::i3c::controller::Controller;
use crate::i3c::descriptor::{
    AddressAssignCommand, ResponseDescriptor, TransferArgument, TransferCommand,
};
use crate::i3c::devices::legacy::{I2cRegisterFile, LegacyI2cTarget};
use crate::i3c::devices::mock::MockTarget;
use crate::i3c::devices::sensor::{reg, SensorTarget, SENSOR_PID, WHO_AM_I_VALUE};
use crate::i3c::devices::Target;
use crate::i3c::error::ResponseError;
use crate::tests::RecordingLogger;
use embedded_io::Write;

pub fn run_controller_tests<W: Write>(out: &mut W) {
    writeln!(out, "\r\n=== I3C Controller Tests ===\r").unwrap();

    test_dynamic_addressing(out);
    test_private_transfers_after_entdaa(out);
    test_ccc_commands(out);
    test_error_logging(out);
    #[cfg(feature = "i3c_target")]
    test_controller_to_controller(out);

    writeln!(out, "\r\n=== All Controller Tests Passed ===\r").unwrap();
}

fn write(len: u32) -> u32 {
    TransferArgument::new().with_data_len(len).bits()
}

fn private(slot: u32, tid: u32) -> TransferCommand {
    TransferCommand::new()
        .with_dev_index(slot)
        .with_tid(tid)
        .with_roc(true)
        .with_toc(true)
}

fn ccc_command(code: u8, tid: u32) -> TransferCommand {
    TransferCommand::new()
        .with_cp(true)
        .with_cmd(u32::from(code))
        .with_tid(tid)
        .with_roc(true)
        .with_toc(true)
}

/// Mock and sensor waiting for ENTDAA, plus an EEPROM on the legacy segment.
fn mixed_controller() -> Controller<Target> {
    let mut ctrl = Controller::with_config(ControllerConfigBuilder::new().build());
    ctrl.register_target(MockTarget::new(0, 0x0000_0000_00aa, 0x10, 0).into())
        .unwrap();
    ctrl.register_target(SensorTarget::new(0).into()).unwrap();
    ctrl.register_target(
        LegacyI2cTarget::new(0x50, I2cRegisterFile::new())
            .unwrap()
            .into(),
    )
    .unwrap();
    ctrl.set_address_table_entry(0, AddressTableEntry::i3c(0x08))
        .unwrap();
    ctrl.set_address_table_entry(1, AddressTableEntry::i3c(0x09))
        .unwrap();
    ctrl.set_address_table_entry(2, AddressTableEntry::i2c(0x50))
        .unwrap();
    ctrl.enable();
    ctrl
}

fn assign(ctrl: &mut Controller<Target>) -> ResponseDescriptor {
    let cmd = AddressAssignCommand::new()
        .with_cmd(u32::from(ccc::ENTDAA))
        .with_dev_index(0)
        .with_dev_count(2)
        .with_tid(1)
        .with_roc(true)
        .with_toc(true);
    ctrl.submit(write(0), cmd.bits());
    let response = ResponseDescriptor(ctrl.read_response());
    // Identity words pushed by the assignment.
    while ctrl.data_buffer_status_level().rx_blr() > 0 {
        let _ = ctrl.read_rx();
    }
    response
}

fn test_dynamic_addressing<W: Write>(out: &mut W) {
    write!(out, "Testing ENTDAA address assignment... ").unwrap();

    let mut ctrl = mixed_controller();
    let response = assign(&mut ctrl);
    assert_eq!(response.tid(), 1);
    assert_eq!(response.err_status(), ResponseError::None as u32);
    assert_eq!(response.data_length(), 0);

    let mock = ctrl.char_table().get(0).unwrap();
    assert_eq!((mock.pid, mock.dynamic_address), (0xaa, 0x08));
    let sensor = ctrl.char_table().get(1).unwrap();
    assert_eq!((sensor.pid, sensor.dynamic_address), (SENSOR_PID, 0x09));
    assert!(ctrl.engine().can_transmit());

    writeln!(out, "PASSED\r").unwrap();
}

fn test_private_transfers_after_entdaa<W: Write>(out: &mut W) {
    write!(out, "Testing private transfers after ENTDAA... ").unwrap();

    let mut ctrl = mixed_controller();
    let _ = assign(&mut ctrl);

    // Sub-address write, then a read from the sensor.
    ctrl.write_tx_bytes(&[reg::WHO_AM_I]);
    ctrl.submit(write(1), private(1, 2).with_toc(false).bits());
    ctrl.submit(write(1), private(1, 3).with_rnw(true).bits());
    assert_eq!(ctrl.read_rx(), u32::from(WHO_AM_I_VALUE));
    for tid in [2, 3] {
        let response = ResponseDescriptor(ctrl.read_response());
        assert_eq!((response.tid(), response.err_status()), (tid, 0));
    }

    // The mock stores what it is sent and returns it from offset 0.
    ctrl.write_tx_bytes(&[0x11, 0x22, 0x33]);
    ctrl.submit(write(3), private(0, 4).bits());
    ctrl.submit(write(3), private(0, 5).with_rnw(true).bits());
    assert_eq!(ctrl.read_rx(), 0x0033_2211);
    let _ = ctrl.read_response();
    assert_eq!(ResponseDescriptor(ctrl.read_response()).data_length(), 3);

    // EEPROM on the legacy segment.
    ctrl.write_tx_bytes(&[0x00, 0x5a]);
    ctrl.submit(write(2), private(2, 6).bits());
    ctrl.write_tx_bytes(&[0x00]);
    ctrl.submit(write(1), private(2, 7).with_toc(false).bits());
    ctrl.submit(write(1), private(2, 8).with_rnw(true).bits());
    assert_eq!(ctrl.read_rx(), 0x0000_005a);
    for tid in [6, 7, 8] {
        let response = ResponseDescriptor(ctrl.read_response());
        assert_eq!((response.tid(), response.err_status()), (tid, 0));
    }

    writeln!(out, "PASSED\r").unwrap();
}

fn test_ccc_commands<W: Write>(out: &mut W) {
    write!(out, "Testing CCC commands through the queues... ").unwrap();

    let mut ctrl = mixed_controller();
    let _ = assign(&mut ctrl);

    ctrl.write_tx_bytes(&[0x01, 0x00]);
    ctrl.submit(write(2), ccc_command(ccc::SETMWL, 1).bits());
    assert_eq!(ResponseDescriptor(ctrl.read_response()).err_status(), 0);
    match ctrl.bus().device(1) {
        Some(Target::Sensor(sensor)) => assert_eq!(sensor.max_write_len(), 0x0100),
        _ => panic!("slot 1 is not the sensor"),
    }

    ctrl.submit(
        write(6),
        ccc_command(ccc::GETPID, 2)
            .with_dev_index(1)
            .with_rnw(true)
            .bits(),
    );
    assert_eq!(ctrl.read_rx(), 0x6c00_0802);
    assert_eq!(ctrl.read_rx(), 0x0000_0b10);
    let response = ResponseDescriptor(ctrl.read_response());
    assert_eq!((response.tid(), response.data_length()), (2, 6));

    ctrl.submit(
        write(2),
        ccc_command(ccc::GETMWL, 3)
            .with_dev_index(1)
            .with_rnw(true)
            .bits(),
    );
    assert_eq!(ctrl.read_rx(), 0x0000_0001);
    let _ = ctrl.read_response();

    writeln!(out, "PASSED\r").unwrap();
}

fn test_error_logging<W: Write>(out: &mut W) {
    write!(out, "Testing error reporting... ").unwrap();

    let logger = RecordingLogger::default();
    let mut ctrl: Controller<Target, RecordingLogger> =
        Controller::new(ControllerConfigBuilder::new().build(), logger.clone());
    ctrl.register_target(MockTarget::new(0x48, 1, 0x10, 0).into())
        .unwrap();
    ctrl.set_address_table_entry(0, AddressTableEntry::i3c(0x33))
        .unwrap();
    ctrl.enable();

    assert_eq!(ctrl.read_response(), 0);
    assert!(logger
        .errors()
        .iter()
        .any(|line| line.contains("response queue read while empty")));

    ctrl.write_tx_bytes(&[0x01]);
    ctrl.submit(write(1), private(0, 1).bits());
    let response = ResponseDescriptor(ctrl.read_response());
    assert_eq!(response.err_status(), ResponseError::I2cNack as u32);
    assert!(!ctrl.engine().can_transmit());
    assert!(logger
        .errors()
        .iter()
        .any(|line| line.contains("address 0x33 nacked")));

    ctrl.resume();
    assert!(ctrl.engine().can_transmit());

    writeln!(out, "PASSED\r").unwrap();
}

#[cfg(feature = "i3c_target")]
fn test_controller_to_controller<W: Write>(out: &mut W) {
    use crate::common::NoOpLogger;
    use crate::i3c::common::DeviceRole;
    use crate::i3c::controller_target::ControllerTarget;

    write!(out, "Testing a controller driving a target-mode block... ").unwrap();

    let config = ControllerConfigBuilder::new()
        .role(DeviceRole::SlaveOnly)
        .static_address(0x4a)
        .build();
    let mut ctrl: Controller<Target> =
        Controller::with_config(ControllerConfigBuilder::new().build());
    ctrl.register_target(
        ControllerTarget::new(config, 0x07ec_a003_0001, 0x06, 0x00, NoOpLogger {}).into(),
    )
    .unwrap();
    ctrl.set_address_table_entry(0, AddressTableEntry::i3c(0x4a))
        .unwrap();
    ctrl.enable();

    fn peer(ctrl: &mut Controller<Target>) -> &mut ControllerTarget {
        match ctrl.bus_mut().device_mut(0) {
            Some(Target::Controller(peer)) => peer,
            _ => panic!("slot 0 is not a controller"),
        }
    }

    ctrl.write_tx_bytes(&[0xde, 0xad, 0xbe, 0xef]);
    ctrl.submit(write(4), private(0, 1).bits());
    assert_eq!(ResponseDescriptor(ctrl.read_response()).err_status(), 0);
    let received = peer(&mut ctrl).poll_response().unwrap();
    assert!(received.rx_rsp());
    assert_eq!(received.data_length(), 4);
    assert_eq!(peer(&mut ctrl).read_rx(), 0xefbe_adde);

    peer(&mut ctrl).stage_read(&[1, 2, 3, 4], 5);
    ctrl.submit(write(4), private(0, 2).with_rnw(true).bits());
    assert_eq!(ctrl.read_rx(), 0x0403_0201);
    assert_eq!(ResponseDescriptor(ctrl.read_response()).data_length(), 4);
    let served = peer(&mut ctrl).poll_response().unwrap();
    assert_eq!((served.tid(), served.data_length()), (5, 0));

    writeln!(out, "PASSED\r").unwrap();
}
