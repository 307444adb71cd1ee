// Licensed under the Apache-2.0 license

use crate::i3c::address_table::AddressTableEntry;
use crate::i3c::ccc;
use crate::i3c::common::{ControllerConfigBuilder, HOT_JOIN_ADDR};
use crate::i3c::controller::Controller;
use crate::i3c::descriptor::{IbiStatus, ResponseDescriptor, TransferArgument, TransferCommand};
use crate::i3c::devices::mock::MockTarget;
use crate::i3c::devices::remote::{reply, BufferLink, RemoteOpcode, RemoteTarget};
use crate::i3c::devices::sensor::SensorTarget;
use crate::i3c::devices::Target;
use crate::i3c::regs::{device_ctrl, ibi_queue_ctrl, QueueThldCtrl, QUEUE_THLD_CTRL_RESET};
use crate::i3c::target::{IbiOutcome, TargetCore, TargetDevice};
use embedded_io::Write;

const MAGIC: u8 = 0xee;
const MOCK_ADDR: u8 = 0x48;
const REMOTE_ADDR: u8 = 0x30;

pub fn run_ibi_tests<W: Write>(out: &mut W) {
    writeln!(out, "\r\n=== I3C IBI Tests ===\r").unwrap();

    test_mock_interrupt_is_queued(out);
    test_remote_payload_is_sliced(out);
    test_hot_join_nacked_and_disabled(out);
    test_rejected_interrupt_is_notified(out);

    writeln!(out, "\r\n=== All IBI Tests Passed ===\r").unwrap();
}

fn write(len: u32) -> u32 {
    TransferArgument::new().with_data_len(len).bits()
}

fn controller(targets: [Target; 1], entry: AddressTableEntry) -> Controller<Target> {
    let mut ctrl = Controller::with_config(ControllerConfigBuilder::new().build());
    for target in targets {
        ctrl.register_target(target).unwrap();
    }
    ctrl.set_address_table_entry(0, entry).unwrap();
    ctrl.enable();
    ctrl
}

fn mock(ctrl: &Controller<Target>) -> &MockTarget {
    match ctrl.bus().device(0) {
        Some(Target::Mock(mock)) => mock,
        _ => panic!("slot 0 is not the mock"),
    }
}

fn remote_link(ctrl: &Controller<Target>, index: usize) -> &BufferLink {
    match ctrl.bus().device(index) {
        Some(Target::Remote(remote)) => remote.link(),
        _ => panic!("device {index} is not a remote target"),
    }
}

fn push_remote_ibi(ctrl: &mut Controller<Target>, index: usize, address: u8, payload: &[u8]) {
    let Some(Target::Remote(remote)) = ctrl.bus_mut().device_mut(index) else {
        panic!("device {index} is not a remote target");
    };
    let link = remote.link_mut();
    link.push_inbound(&[RemoteOpcode::Ibi as u8, address, 0x01]);
    link.push_inbound(&(payload.len() as u32).to_le_bytes());
    link.push_inbound(payload);
}

/// ENEC for target interrupts, then the single magic byte that makes the
/// mock raise one.
fn trigger_mock_ibi(ctrl: &mut Controller<Target>) {
    let enec = TransferCommand::new()
        .with_cp(true)
        .with_cmd(u32::from(ccc::ENEC))
        .with_tid(1)
        .with_roc(true)
        .with_toc(true);
    ctrl.write_tx_bytes(&[ccc::events::INT]);
    ctrl.submit(write(1), enec.bits());
    assert_eq!(ResponseDescriptor(ctrl.read_response()).err_status(), 0);
    assert!(mock(ctrl).can_ibi());

    let private = TransferCommand::new()
        .with_dev_index(0)
        .with_tid(2)
        .with_roc(true)
        .with_toc(true);
    ctrl.write_tx_bytes(&[MAGIC]);
    ctrl.submit(write(1), private.bits());
    assert_eq!(ResponseDescriptor(ctrl.read_response()).err_status(), 0);
}

fn test_mock_interrupt_is_queued<W: Write>(out: &mut W) {
    write!(out, "Testing target interrupt without payload... ").unwrap();

    let mock_target = MockTarget::new(MOCK_ADDR, 1, 0x10, MAGIC);
    let mut ctrl = controller([mock_target.into()], AddressTableEntry::i3c(MOCK_ADDR));
    trigger_mock_ibi(&mut ctrl);

    assert_eq!(ctrl.service_ibis(), 1);
    assert_eq!(mock(&ctrl).last_ibi(), Some(IbiOutcome::Acked));
    let status = IbiStatus(ctrl.read_ibi());
    assert_eq!(status.address(), MOCK_ADDR);
    assert_eq!(status.ibi_id() & 1, 1);
    assert_eq!((status.data_length(), status.last()), (0, true));
    assert!(!status.nacked());
    assert_eq!(ctrl.read_ibi(), 0);

    // Nothing pending the second time round.
    assert_eq!(ctrl.service_ibis(), 0);

    writeln!(out, "PASSED\r").unwrap();
}

fn test_remote_payload_is_sliced<W: Write>(out: &mut W) {
    write!(out, "Testing remote IBI payload slicing... ").unwrap();

    let core = TargetCore::new(REMOTE_ADDR, 0x0000_0000_00bb, 0x06, 0x00);
    let remote = RemoteTarget::with_link(core, BufferLink::new(), "peer");
    let mut ctrl = controller([remote.into()], AddressTableEntry::i3c(REMOTE_ADDR));
    ctrl.set_queue_thld_ctrl(QueueThldCtrl(QUEUE_THLD_CTRL_RESET).with_ibi_data(2).bits());
    push_remote_ibi(&mut ctrl, 0, REMOTE_ADDR, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

    assert_eq!(ctrl.service_ibis(), 1);
    assert_eq!(remote_link(&ctrl, 0).outbound().last(), Some(&reply::IBI_ACK));
    assert_eq!(ctrl.queue_status_level().ibi_status_cnt(), 2);

    let first = IbiStatus(ctrl.read_ibi());
    assert_eq!(first.address(), REMOTE_ADDR);
    assert_eq!((first.data_length(), first.last()), (8, false));
    assert_eq!(ctrl.read_ibi(), 0x0403_0201);
    assert_eq!(ctrl.read_ibi(), 0x0807_0605);
    let second = IbiStatus(ctrl.read_ibi());
    assert_eq!((second.data_length(), second.last()), (2, true));
    assert_eq!(ctrl.read_ibi(), 0x0000_0a09);

    writeln!(out, "PASSED\r").unwrap();
}

fn test_hot_join_nacked_and_disabled<W: Write>(out: &mut W) {
    write!(out, "Testing hot-join nack and disable... ").unwrap();

    let core = TargetCore::new(0, 0x0000_0000_00cc, 0x06, 0x00);
    let remote = RemoteTarget::with_link(core, BufferLink::new(), "joiner");
    let mut ctrl = controller([SensorTarget::new(0x6a).into()], AddressTableEntry::i3c(0x6a));
    ctrl.register_target(remote.into()).unwrap();
    let value = ctrl.device_ctrl() | device_ctrl::HOT_JOIN_ACK_NACK_CTRL;
    ctrl.set_device_ctrl(value);

    push_remote_ibi(&mut ctrl, 1, HOT_JOIN_ADDR, &[]);
    assert_eq!(ctrl.service_ibis(), 1);
    assert_eq!(remote_link(&ctrl, 1).outbound().last(), Some(&reply::IBI_NACK));
    // Broadcast DISEC reached every target.
    assert!(ctrl
        .bus()
        .devices()
        .iter()
        .all(|dev| !dev.core().events_enabled(ccc::events::HJ)));
    assert_eq!(ctrl.read_ibi(), 0);

    // A second attempt never reaches the controller.
    push_remote_ibi(&mut ctrl, 1, HOT_JOIN_ADDR, &[]);
    assert_eq!(ctrl.service_ibis(), 1);
    assert_eq!(remote_link(&ctrl, 1).outbound().last(), Some(&reply::IBI_NACK));
    assert_eq!(ctrl.read_ibi(), 0);

    writeln!(out, "PASSED\r").unwrap();
}

fn test_rejected_interrupt_is_notified<W: Write>(out: &mut W) {
    write!(out, "Testing rejected interrupt notification... ").unwrap();

    let mock_target = MockTarget::new(MOCK_ADDR, 1, 0x10, MAGIC);
    let entry = AddressTableEntry::i3c(MOCK_ADDR).with_sir_reject(true);
    let mut ctrl = controller([mock_target.into()], entry);
    ctrl.set_ibi_queue_ctrl(ibi_queue_ctrl::NOTIFY_REJECTED_SLAVE_IRQ);
    trigger_mock_ibi(&mut ctrl);

    assert_eq!(ctrl.service_ibis(), 1);
    assert_eq!(mock(&ctrl).last_ibi(), Some(IbiOutcome::Nacked));
    // Direct DISEC switched the mock's interrupts off.
    assert!(!mock(&ctrl).can_ibi());
    let status = IbiStatus(ctrl.read_ibi());
    assert!(status.nacked());
    assert!(status.last());
    assert_eq!(status.address(), MOCK_ADDR);

    writeln!(out, "PASSED\r").unwrap();
}
