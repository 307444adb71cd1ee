// Licensed under the Apache-2.0 license

//! Target-mode view of the controller.
//!
//! A controller configured as a secondary or target-only device answers
//! transfers from another controller on the same bus. Written bytes land in
//! its RX buffer, reads are served from a command pair software staged
//! beforehand, and every completed transfer leaves a response descriptor.

use crate::common::{Logger, NoOpLogger};
use crate::i3c::ccc;
use crate::i3c::common::{ControllerConfig, TargetEvent, ENTDAA_RESPONSE_LEN};
use crate::i3c::controller::QueueEngine;
use crate::i3c::descriptor::{
    CommandDescriptor, ResponseDescriptor, TransferArgument, TransferCommand,
};
use crate::i3c::error::Error;
use crate::i3c::queue::start_threshold;
use crate::i3c::regs::{
    intr, slv_event_ctrl, DeviceAddr, MaxDataSpeed, SlvCharCtrl, SlvMaxLen, SLV_CHAR_CTRL_RESET,
    SLV_EVENT_CTRL_RESET,
};
use crate::i3c::target::{CccCursor, TargetCore, TargetDevice};
use heapless::Vec;

/// Reply staged for the next private read.
#[derive(Clone, Copy, Debug)]
struct StagedRead {
    arg: CommandDescriptor,
    cmd: TransferCommand,
}

pub struct ControllerTarget<L: Logger = NoOpLogger> {
    core: TargetCore,
    engine: QueueEngine<L>,
    device_addr: DeviceAddr,
    event_ctrl: u32,
    max_len: SlvMaxLen,
    max_data_speed: MaxDataSpeed,
    char_ctrl: SlvCharCtrl,
    device_status: u16,
    staged: Option<StagedRead>,
    transferred: u16,
    current: Option<TargetEvent>,
}

impl<L: Logger> ControllerTarget<L> {
    /// `pid`, `bcr` and `dcr` are what the block reports during ENTDAA.
    pub fn new(config: ControllerConfig, pid: u64, bcr: u8, dcr: u8, logger: L) -> Self {
        let static_address = config.static_address;
        let max_len = SlvMaxLen(0)
            .with_mwl(u32::from(config.max_write_len))
            .with_mrl(u32::from(config.max_read_len));
        let device_addr = static_address.map_or(DeviceAddr(0), |addr| {
            DeviceAddr(0)
                .with_static_address(u32::from(addr))
                .with_static_valid(true)
        });
        Self {
            core: TargetCore::new(static_address.unwrap_or(0), pid, bcr, dcr),
            engine: QueueEngine::new(config, logger),
            device_addr,
            event_ctrl: SLV_EVENT_CTRL_RESET,
            max_len,
            max_data_speed: MaxDataSpeed(0),
            char_ctrl: SlvCharCtrl(SLV_CHAR_CTRL_RESET),
            device_status: 0,
            staged: None,
            transferred: 0,
            current: None,
        }
    }

    #[must_use]
    pub const fn engine(&self) -> &QueueEngine<L> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut QueueEngine<L> {
        &mut self.engine
    }

    /// COMMAND_QUEUE_PORT write. Target-mode pairs wait for a read from the
    /// bus instead of executing.
    pub fn write_command(&mut self, word: u32) {
        let _ = self.engine.push_command(word);
    }

    /// Stage the reply to the next private read.
    pub fn stage_read(&mut self, data: &[u8], tid: u32) {
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            for (dst, src) in word.iter_mut().zip(chunk) {
                *dst = *src;
            }
            self.engine.push_tx(u32::from_le_bytes(word));
        }
        let arg = TransferArgument::new().with_data_len(data.len() as u32);
        self.write_command(arg.bits());
        self.write_command(TransferCommand::new().with_tid(tid).with_roc(true).bits());
    }

    pub fn write_tx(&mut self, word: u32) {
        self.engine.push_tx(word);
    }

    pub fn read_rx(&mut self) -> u32 {
        self.engine.pop_rx()
    }

    /// # Errors
    ///
    /// `nb::Error::WouldBlock` while no response is queued.
    pub fn poll_response(&mut self) -> nb::Result<ResponseDescriptor, Error> {
        self.engine.pop_response().ok_or(nb::Error::WouldBlock)
    }

    #[must_use]
    pub const fn device_addr(&self) -> DeviceAddr {
        self.device_addr
    }

    /// DEVICE_ADDR write. A valid static address becomes the address the
    /// block answers to until one is assigned dynamically.
    pub fn set_device_addr(&mut self, value: u32) {
        self.device_addr = DeviceAddr(value);
        let static_address = if self.device_addr.static_valid() {
            self.device_addr.static_address() as u8
        } else {
            0
        };
        self.core.set_static_address(static_address);
        let dynamic = self
            .device_addr
            .dynamic_valid()
            .then_some(self.device_addr.dynamic_address() as u8);
        self.core.set_dynamic_address(dynamic);
    }

    #[must_use]
    pub const fn slv_event_ctrl(&self) -> u32 {
        self.event_ctrl
    }

    /// SLV_EVENT_CTRL write; the update flags are write-1-to-clear.
    pub fn write_slv_event_ctrl(&mut self, value: u32) {
        let updates = slv_event_ctrl::MRL_UPDATED | slv_event_ctrl::MWL_UPDATED;
        let kept = self.event_ctrl & updates & !value;
        self.event_ctrl = (value & slv_event_ctrl::EVENT_MASK) | kept;
    }

    #[must_use]
    pub const fn slv_max_len(&self) -> SlvMaxLen {
        self.max_len
    }

    pub fn set_max_data_speed(&mut self, value: MaxDataSpeed) {
        self.max_data_speed = value;
    }

    pub fn set_slv_char_ctrl(&mut self, value: SlvCharCtrl) {
        self.char_ctrl = value;
    }

    /// Low half of CCC_DEVICE_STATUS, returned by GETSTATUS.
    pub fn set_device_status(&mut self, status: u16) {
        self.device_status = status;
    }

    fn record_dynamic_address(&mut self, address: u8) {
        self.device_addr = self
            .device_addr
            .with_dynamic_address(u32::from(address))
            .with_dynamic_valid(true);
        self.engine.interrupts_mut().set(intr::DYN_ADDR_ASSGN);
        self.engine
            .logger_mut()
            .debug(format_args!("i3c target: dynamic address 0x{address:02x}"));
    }

    fn clear_dynamic_address(&mut self) {
        self.device_addr = self
            .device_addr
            .with_dynamic_address(0)
            .with_dynamic_valid(false);
        self.engine.interrupts_mut().clear(intr::DYN_ADDR_ASSGN);
    }

    fn hdr_supported(&self, code: u8) -> bool {
        let caps = self.engine.hw_capability();
        match code {
            ccc::ENTHDR0 => caps.hdr_ddr(),
            ccc::ENTHDR1 | ccc::ENTHDR2 => caps.hdr_ts(),
            _ => false,
        }
    }

    fn opcode_arrived(&mut self, code: u8) -> Result<(), Error> {
        match code {
            ccc::RSTDAA => self.clear_dynamic_address(),
            ccc::SETAASA => {
                if let Some(address) = self.core.dynamic_address() {
                    self.record_dynamic_address(address);
                }
            }
            ccc::ENTHDR0 | ccc::ENTHDR1 | ccc::ENTHDR2 => {
                if !self.hdr_supported(code) {
                    self.engine.logger_mut().error(format_args!(
                        "i3c target: ENTHDR 0x{code:02x} without the capability"
                    ));
                    return Err(Error::Unsupported);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn payload_byte(&mut self, code: u8, offset: usize, byte: u8) -> Result<(), Error> {
        let events = u32::from(byte) & slv_event_ctrl::EVENT_MASK;
        match (code, offset) {
            (ccc::ENEC | ccc::ENEC_DIRECT, 0) => self.event_ctrl |= events,
            (ccc::DISEC | ccc::DISEC_DIRECT, 0) => self.event_ctrl &= !events,
            (ccc::SETDASA, 0) => {
                if !self.device_addr.static_valid() {
                    return Err(Error::DataNack);
                }
                self.record_dynamic_address(byte);
            }
            (ccc::SETNEWDA, 0) | (ccc::ENTDAA, ENTDAA_RESPONSE_LEN) => {
                self.record_dynamic_address(byte);
            }
            (ccc::SETMRL | ccc::SETMRL_DIRECT, 0 | 1) => {
                self.max_len = self.max_len.with_mrl(merge_be(self.max_len.mrl(), offset, byte));
                self.event_ctrl |= slv_event_ctrl::MRL_UPDATED;
                self.engine.interrupts_mut().set(intr::CCC_UPDATED);
            }
            (ccc::SETMWL | ccc::SETMWL_DIRECT, 0 | 1) => {
                self.max_len = self.max_len.with_mwl(merge_be(self.max_len.mwl(), offset, byte));
                self.event_ctrl |= slv_event_ctrl::MWL_UPDATED;
                self.engine.interrupts_mut().set(intr::CCC_UPDATED);
            }
            _ => {}
        }
        Ok(())
    }

    fn response_for_stop(&mut self) {
        match self.current.take() {
            Some(TargetEvent::StartSend) => {
                let response = ResponseDescriptor(0)
                    .with_rx_rsp(true)
                    .with_data_length(u32::from(self.transferred));
                self.engine.push_response(response);
            }
            Some(TargetEvent::StartRecv) => {
                if let Some(staged) = self.staged.take() {
                    let owed = staged.arg.payload_len().saturating_sub(self.transferred);
                    if staged.cmd.roc() {
                        let response = ResponseDescriptor(0)
                            .with_tid(staged.cmd.tid())
                            .with_data_length(u32::from(owed));
                        self.engine.push_response(response);
                    }
                }
            }
            _ => {}
        }
        self.transferred = 0;
    }
}

/// Replace byte `offset` (0 is the MSB) of a 16-bit big-endian field.
fn merge_be(current: u32, offset: usize, byte: u8) -> u32 {
    if offset == 0 {
        (current & 0x00ff) | (u32::from(byte) << 8)
    } else {
        (current & 0xff00) | u32::from(byte)
    }
}

impl<L: Logger> TargetDevice for ControllerTarget<L> {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        let taken = self.engine.push_rx_bytes(data);
        if taken < data.len() {
            self.engine.logger_mut().error(format_args!(
                "i3c target: RX full, kept {taken} of {} bytes",
                data.len()
            ));
        }
        self.transferred = self.transferred.saturating_add(taken as u16);
        Ok(taken)
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        let Some(staged) = self.staged else {
            return 0;
        };
        let total = staged.arg.payload_len();
        let owed = usize::from(total.saturating_sub(self.transferred));
        let mut supplied = 0;
        for (dst, index) in buf.iter_mut().take(owed).zip(self.transferred..) {
            let byte = match staged.arg {
                CommandDescriptor::ShortData(arg) if staged.cmd.sdap() => {
                    Some(arg.byte(usize::from(index)))
                }
                _ => self.engine.pop_tx_byte(),
            };
            let Some(byte) = byte else {
                break;
            };
            *dst = byte;
            supplied += 1;
        }
        self.transferred = self.transferred.saturating_add(supplied as u16);
        supplied
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        // Restarts inside a CCC carry no private transfer.
        if self.core.cursor().in_ccc() && event != TargetEvent::Stop {
            self.current = None;
            return Ok(());
        }
        match event {
            TargetEvent::StartSend => {
                let needed = start_threshold(self.engine.data_buffer_thld_ctrl().rx_start());
                if self.engine.rx_bytes_free() < needed {
                    self.engine
                        .logger_mut()
                        .debug(format_args!("i3c target: RX below start threshold"));
                    return Err(Error::AddressNack);
                }
                self.current = Some(event);
            }
            TargetEvent::StartRecv => {
                let Some((arg, cmd)) = self.engine.pop_command_pair() else {
                    self.engine
                        .logger_mut()
                        .debug(format_args!("i3c target: no reply staged"));
                    return Err(Error::AddressNack);
                };
                let arg = CommandDescriptor::decode(arg)?;
                self.staged = Some(StagedRead {
                    arg,
                    cmd: TransferCommand(cmd),
                });
                self.transferred = 0;
                self.current = Some(event);
            }
            TargetEvent::Stop => self.response_for_stop(),
            TargetEvent::Nack => {}
        }
        Ok(())
    }

    fn handle_ccc_read(&mut self, ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error> {
        let mut reply: Vec<u8, 3> = Vec::new();
        let fill = match ccc.code() {
            ccc::GETSTATUS => reply.extend_from_slice(&self.device_status.to_be_bytes()),
            ccc::GETMXDS => reply.extend_from_slice(&[
                self.max_data_speed.max_wr() as u8,
                self.max_data_speed.max_rd() as u8,
                self.max_data_speed.turnaround() as u8,
            ]),
            ccc::GETMRL => reply.extend_from_slice(&(self.max_len.mrl() as u16).to_be_bytes()),
            ccc::GETMWL => reply.extend_from_slice(&(self.max_len.mwl() as u16).to_be_bytes()),
            ccc::GETCAPS => reply.push(self.char_ctrl.hdr_cap() as u8).map_err(|_| ()),
            code => {
                self.engine
                    .logger_mut()
                    .debug(format_args!("i3c target: no answer to ccc 0x{code:02x}"));
                return Err(Error::DataNack);
            }
        };
        fill.map_err(|()| Error::QueueOverflow)?;
        let pending = reply.get(ccc.byte_offset..).unwrap_or(&[]);
        let mut supplied = 0;
        for (dst, &src) in buf.iter_mut().zip(pending) {
            *dst = src;
            supplied += 1;
        }
        Ok(supplied)
    }

    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error> {
        let code = ccc.code();
        if data.is_empty() {
            self.current = None;
            return self.opcode_arrived(code);
        }
        for (offset, &byte) in (ccc.byte_offset..).zip(data) {
            self.payload_byte(code, offset, byte)?;
        }
        Ok(())
    }
}
