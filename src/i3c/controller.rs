// Licensed under the Apache-2.0 license

//! Command/response queue engine of a DWC-style I3C controller.
//!
//! Software pushes (argument, command) word pairs into the command queue and
//! payload words into the TX buffer. The engine turns each pair into bus
//! transactions on a [`Bus`] and reports completion through the response
//! queue, RX data through the RX buffer and IBIs through the IBI queue.
//!
//! The engine runs synchronously: pushing a command word (for a controller
//! that drives the bus) or writing RESUME drains the queue on the caller's
//! stack. A Nack halts the engine until software writes RESUME.

use crate::common::{Logger, NoOpLogger};
use crate::i3c::address_table::{
    AddressTable, AddressTableEntry, CharacteristicTable, DeviceCharacteristics,
};
use crate::i3c::bus::Bus;
use crate::i3c::ccc;
use crate::i3c::common::{
    ControllerConfig, Direction, TransferSpeed, BROADCAST_ADDR, ENTDAA_RESPONSE_LEN,
};
use crate::i3c::descriptor::{
    AddressAssignCommand, CmdAttr, CommandDescriptor, ResponseDescriptor, ShortDataArgument,
    TransferArgument, TransferCommand,
};
use crate::i3c::error::{Error, ResponseError};
use crate::i3c::ibi::{queue_words, slice_size, IbiArbiter, IbiHandler, IbiPolicy};
use crate::i3c::queue::{
    fifo_threshold, start_threshold, DataBuffer, WordQueue, CMD_QUEUE_DEPTH, IBI_QUEUE_DEPTH,
    RESP_QUEUE_DEPTH, RX_BUFFER_BYTES, TX_BUFFER_BYTES,
};
use crate::i3c::regs::{
    device_ctrl, intr, reset_ctrl, DataBufferStatusLevel, DataBufferThldCtrl, HwCapability,
    InterruptRegs, PresentState, QueueStatusLevel, QueueThldCtrl, TransferState, TransferStatus,
    DATA_BUFFER_THLD_CTRL_RESET, HW_CAPABILITY_RESET, PRESENT_STATE_RESET, QUEUE_THLD_CTRL_RESET,
};
use crate::i3c::target::TargetDevice;
use heapless::Vec;

/// Register state, queues and tables of the controller, independent of the
/// bus it drives.
pub struct QueueEngine<L: Logger = NoOpLogger> {
    config: ControllerConfig,
    device_ctrl: u32,
    hw_capability: HwCapability,
    queue_thld: QueueThldCtrl,
    data_thld: DataBufferThldCtrl,
    ibi_queue_ctrl: u32,
    present_state: PresentState,
    intr: InterruptRegs,
    cmd_queue: WordQueue<CMD_QUEUE_DEPTH>,
    resp_queue: WordQueue<RESP_QUEUE_DEPTH>,
    ibi_queue: WordQueue<IBI_QUEUE_DEPTH>,
    ibi_status_cnt: usize,
    tx: DataBuffer<TX_BUFFER_BYTES>,
    rx: DataBuffer<RX_BUFFER_BYTES>,
    address_table: AddressTable,
    char_table: CharacteristicTable,
    ibi: IbiArbiter,
    logger: L,
}

impl<L: Logger> QueueEngine<L> {
    pub fn new(config: ControllerConfig, logger: L) -> Self {
        let depth = config.num_devices;
        let mut engine = Self {
            config,
            device_ctrl: 0,
            hw_capability: HwCapability(HW_CAPABILITY_RESET),
            queue_thld: QueueThldCtrl(QUEUE_THLD_CTRL_RESET),
            data_thld: DataBufferThldCtrl(DATA_BUFFER_THLD_CTRL_RESET),
            ibi_queue_ctrl: 0,
            present_state: PresentState(PRESENT_STATE_RESET),
            intr: InterruptRegs::new(),
            cmd_queue: WordQueue::new(),
            resp_queue: WordQueue::new(),
            ibi_queue: WordQueue::new(),
            ibi_status_cnt: 0,
            tx: DataBuffer::new(),
            rx: DataBuffer::new(),
            address_table: AddressTable::new(depth),
            char_table: CharacteristicTable::new(depth),
            ibi: IbiArbiter::new(),
            logger,
        };
        engine.reset();
        engine
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Core reset: every register back to its reset value, every queue empty.
    pub fn reset(&mut self) {
        self.device_ctrl = 0;
        self.hw_capability = HwCapability(HW_CAPABILITY_RESET)
            .with_role(self.config.role as u32)
            .with_hdr_ddr(self.config.hdr_ddr)
            .with_hdr_ts(self.config.hdr_ts);
        self.queue_thld = QueueThldCtrl(QUEUE_THLD_CTRL_RESET);
        self.data_thld = DataBufferThldCtrl(DATA_BUFFER_THLD_CTRL_RESET);
        self.ibi_queue_ctrl = 0;
        self.present_state = PresentState(PRESENT_STATE_RESET);
        self.intr.reset();
        self.address_table.clear();
        self.char_table.clear();
        self.ibi.reset();
        self.reset_cmd_queue();
        self.reset_resp_queue();
        self.reset_ibi_queue();
        self.reset_tx();
        self.reset_rx();
    }

    /// RESET_CTRL write.
    pub fn reset_ctrl(&mut self, value: u32) {
        if value & reset_ctrl::CORE != 0 {
            self.reset();
        }
        if value & reset_ctrl::CMD_QUEUE != 0 {
            self.reset_cmd_queue();
        }
        if value & reset_ctrl::RESP_QUEUE != 0 {
            self.reset_resp_queue();
        }
        if value & reset_ctrl::TX_BUF != 0 {
            self.reset_tx();
        }
        if value & reset_ctrl::RX_BUF != 0 {
            self.reset_rx();
        }
        if value & reset_ctrl::IBI_QUEUE != 0 {
            self.reset_ibi_queue();
        }
    }

    fn reset_cmd_queue(&mut self) {
        self.cmd_queue.clear();
        if self.cmd_queue.free() >= self.queue_thld.cmd_empty() as usize {
            self.intr.set(intr::CMD_QUEUE_RDY);
        }
    }

    fn reset_resp_queue(&mut self) {
        self.resp_queue.clear();
        self.intr.clear(intr::RESP_RDY);
    }

    fn reset_ibi_queue(&mut self) {
        self.ibi_queue.clear();
        self.ibi_status_cnt = 0;
        self.intr.clear(intr::IBI_THLD);
    }

    fn reset_tx(&mut self) {
        self.tx.clear();
        self.intr.set(intr::TX_THLD);
    }

    fn reset_rx(&mut self) {
        self.rx.clear();
        self.intr.clear(intr::RX_THLD);
    }

    /// Enabled and not waiting for RESUME.
    #[must_use]
    pub const fn can_transmit(&self) -> bool {
        self.device_ctrl & device_ctrl::ENABLE != 0 && self.device_ctrl & device_ctrl::RESUME == 0
    }

    /// Waiting for RESUME after an error.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.device_ctrl & device_ctrl::RESUME != 0
    }

    #[must_use]
    pub const fn device_ctrl(&self) -> u32 {
        self.device_ctrl
    }

    #[must_use]
    pub const fn hw_capability(&self) -> HwCapability {
        self.hw_capability
    }

    #[must_use]
    pub const fn present_state(&self) -> PresentState {
        self.present_state
    }

    #[must_use]
    pub fn queue_status_level(&self) -> QueueStatusLevel {
        QueueStatusLevel(0)
            .with_cmd_empty_loc(self.cmd_queue.free() as u32)
            .with_resp_blr(self.resp_queue.len() as u32)
            .with_ibi_blr(self.ibi_queue.len() as u32)
            .with_ibi_status_cnt(self.ibi_status_cnt as u32)
    }

    #[must_use]
    pub fn data_buffer_status_level(&self) -> DataBufferStatusLevel {
        DataBufferStatusLevel(0)
            .with_tx_empty_loc(self.tx.words_free() as u32)
            .with_rx_blr(self.rx.words_used() as u32)
    }

    pub fn set_queue_thld_ctrl(&mut self, value: u32) {
        self.queue_thld = QueueThldCtrl(value);
    }

    #[must_use]
    pub const fn queue_thld_ctrl(&self) -> QueueThldCtrl {
        self.queue_thld
    }

    pub fn set_data_buffer_thld_ctrl(&mut self, value: u32) {
        self.data_thld = DataBufferThldCtrl(value);
    }

    #[must_use]
    pub const fn data_buffer_thld_ctrl(&self) -> DataBufferThldCtrl {
        self.data_thld
    }

    pub fn set_ibi_queue_ctrl(&mut self, value: u32) {
        self.ibi_queue_ctrl = value;
    }

    #[must_use]
    pub const fn interrupts(&self) -> &InterruptRegs {
        &self.intr
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptRegs {
        &mut self.intr
    }

    #[must_use]
    pub const fn address_table(&self) -> &AddressTable {
        &self.address_table
    }

    pub fn address_table_mut(&mut self) -> &mut AddressTable {
        &mut self.address_table
    }

    #[must_use]
    pub const fn char_table(&self) -> &CharacteristicTable {
        &self.char_table
    }

    fn set_state(&mut self, state: TransferState) {
        self.present_state = self.present_state.with_transfer_state(state as u32);
    }

    fn set_status(&mut self, status: TransferStatus) {
        self.present_state = self.present_state.with_transfer_status(status as u32);
    }

    fn go_idle(&mut self) {
        self.set_state(TransferState::Idle);
        self.set_status(TransferStatus::Idle);
    }

    /// Stop executing until software writes RESUME.
    fn halt(&mut self) {
        self.set_state(TransferState::Halt);
        self.set_status(TransferStatus::Halt);
        self.intr.set(intr::TRANSFER_ERR);
        self.device_ctrl |= device_ctrl::RESUME;
    }

    /// Queue one command-queue word. Returns `true` when the word was a
    /// command, i.e. a pair may now be complete.
    pub fn push_command(&mut self, word: u32) -> bool {
        let Some(attr) = CmdAttr::of(word) else {
            self.logger.error(format_args!(
                "i3c ctrl: command word 0x{word:08x} has unknown attribute"
            ));
            return false;
        };
        if self.cmd_queue.push(word).is_err() {
            self.logger
                .error(format_args!("i3c ctrl: command queue full, dropped 0x{word:08x}"));
            return false;
        }
        if self.cmd_queue.free() < self.queue_thld.cmd_empty() as usize {
            self.intr.clear(intr::CMD_QUEUE_RDY);
        }
        attr.is_command()
    }

    fn pop_command(&mut self) -> u32 {
        let Ok(word) = self.cmd_queue.pop() else {
            self.logger
                .error(format_args!("i3c ctrl: command queue read while empty"));
            return 0;
        };
        if self.cmd_queue.free() >= self.queue_thld.cmd_empty() as usize {
            self.intr.set(intr::CMD_QUEUE_RDY);
        }
        word
    }

    /// TX data port write.
    pub fn push_tx(&mut self, word: u32) {
        if self.tx.push_word(word).is_err() {
            self.logger
                .error(format_args!("i3c ctrl: TX buffer full, dropped 0x{word:08x}"));
            return;
        }
        if self.tx.words_free() < fifo_threshold(self.data_thld.tx()) {
            self.intr.clear(intr::TX_THLD);
        }
    }

    fn pop_tx(&mut self) -> u32 {
        let Ok(word) = self.tx.pop_word() else {
            self.logger
                .error(format_args!("i3c ctrl: TX buffer read while empty"));
            return 0;
        };
        if self.tx.words_free() >= fifo_threshold(self.data_thld.tx()) {
            self.intr.set(intr::TX_THLD);
        }
        word
    }

    /// Take the next (argument, command) pair, if a whole one is queued.
    pub(crate) fn pop_command_pair(&mut self) -> Option<(u32, u32)> {
        if self.cmd_queue.is_empty() || self.cmd_queue.len() % 2 != 0 {
            return None;
        }
        let arg = self.pop_command();
        let cmd = self.pop_command();
        Some((arg, cmd))
    }

    /// Target-mode read of one TX byte.
    pub(crate) fn pop_tx_byte(&mut self) -> Option<u8> {
        let byte = self.tx.pop_byte()?;
        if self.tx.bytes_free() >= start_threshold(self.data_thld.tx_start()) {
            self.intr.set(intr::TX_THLD);
        }
        Some(byte)
    }

    /// Target-mode write into RX; returns how many bytes fit.
    pub(crate) fn push_rx_bytes(&mut self, data: &[u8]) -> usize {
        let taken = self.rx.push_bytes(data);
        if self.rx.bytes_used() >= start_threshold(self.data_thld.rx_start()) {
            self.intr.set(intr::RX_THLD);
        }
        taken
    }

    #[must_use]
    pub fn rx_bytes_free(&self) -> usize {
        self.rx.bytes_free()
    }

    pub(crate) fn logger_mut(&mut self) -> &mut L {
        &mut self.logger
    }

    fn push_rx(&mut self, word: u32) {
        if self.rx.push_word(word).is_err() {
            self.logger
                .error(format_args!("i3c ctrl: RX buffer full, dropped 0x{word:08x}"));
            return;
        }
        if self.rx.words_used() >= fifo_threshold(self.data_thld.rx()) {
            self.intr.set(intr::RX_THLD);
        }
    }

    /// RX data port read; 0 when empty.
    pub fn pop_rx(&mut self) -> u32 {
        let Ok(word) = self.rx.pop_word() else {
            self.logger
                .error(format_args!("i3c ctrl: RX buffer read while empty"));
            return 0;
        };
        if self.rx.words_used() < fifo_threshold(self.data_thld.rx()) {
            self.intr.clear(intr::RX_THLD);
        }
        word
    }

    pub(crate) fn push_response(&mut self, response: ResponseDescriptor) {
        if self.resp_queue.push(response.bits()).is_err() {
            self.logger.error(format_args!(
                "i3c ctrl: response queue full, dropped 0x{:08x}",
                response.bits()
            ));
        }
        if self.resp_queue.len() > self.queue_thld.resp() as usize {
            self.intr.set(intr::RESP_RDY);
        }
    }

    /// Response queue read; `None` when empty.
    pub fn pop_response(&mut self) -> Option<ResponseDescriptor> {
        let word = self.resp_queue.pop().ok()?;
        if self.resp_queue.len() <= self.queue_thld.resp() as usize {
            self.intr.clear(intr::RESP_RDY);
        }
        Some(ResponseDescriptor(word))
    }

    /// IBI queue read; 0 when empty.
    pub fn pop_ibi(&mut self) -> u32 {
        let Ok(word) = self.ibi_queue.pop() else {
            return 0;
        };
        if self.ibi_queue.len() <= self.queue_thld.ibi_status() as usize {
            self.intr.clear(intr::IBI_THLD);
        }
        word
    }

    /// DEVICE_CTRL write.
    ///
    /// RESUME releases a halted engine and drains the command queue; ABORT
    /// sends STOP on both segments. Neither bit reads back as set.
    pub fn write_device_ctrl<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        value: u32,
    ) {
        self.device_ctrl = value & !(device_ctrl::RESUME | device_ctrl::ABORT);
        if value & device_ctrl::RESUME != 0 {
            self.logger.debug(format_args!("i3c ctrl: resume"));
            self.execute(bus);
        }
        if value & device_ctrl::ABORT != 0 {
            self.logger.debug(format_args!("i3c ctrl: abort"));
            bus.legacy_end();
            bus.end_transfer();
            self.intr.set(intr::TRANSFER_ABORT);
        }
        if !self.is_halted() {
            self.go_idle();
        }
    }

    /// Drain the command queue pair by pair.
    ///
    /// Returns without touching the queue while the engine is disabled or
    /// halted, or while a command still waits for its partner word.
    pub fn execute<D: TargetDevice, BL: Logger>(&mut self, bus: &mut Bus<D, BL>) {
        self.set_state(TransferState::Idle);
        if !self.can_transmit() || self.cmd_queue.len() % 2 != 0 {
            return;
        }
        while self.can_transmit() && !self.cmd_queue.is_empty() {
            let arg = self.pop_command();
            let cmd = self.pop_command();
            match CommandDescriptor::decode(cmd) {
                Ok(CommandDescriptor::Transfer(cmd)) => self.transfer_cmd(bus, cmd, arg),
                Ok(CommandDescriptor::AddressAssign(cmd)) => self.addr_assign(bus, cmd),
                Ok(CommandDescriptor::Argument(_) | CommandDescriptor::ShortData(_)) => {
                    self.logger.error(format_args!(
                        "i3c ctrl: argument 0x{cmd:08x} where a command was expected"
                    ));
                }
                Err(_) => {
                    self.logger
                        .error(format_args!("i3c ctrl: undecodable command 0x{cmd:08x}"));
                }
            }
        }
    }

    fn transfer_cmd<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        cmd: TransferCommand,
        arg: u32,
    ) {
        self.present_state = self.present_state.with_cmd_tid(cmd.tid());

        let speed = TransferSpeed::from_bits(cmd.speed());
        let admitted = match speed {
            TransferSpeed::HdrDdr => self.hw_capability.hdr_ddr(),
            TransferSpeed::HdrTs => self.hw_capability.hdr_ts(),
            _ => true,
        };
        if !admitted {
            self.logger
                .error(format_args!("i3c ctrl: {speed:?} is not supported"));
            self.halt();
            return;
        }
        self.logger.debug(format_args!(
            "i3c ctrl: tid {} at {} Hz",
            cmd.tid(),
            speed.nominal_rate().to_Hz()
        ));

        match CommandDescriptor::decode(arg) {
            Ok(CommandDescriptor::Argument(arg)) => self.transfer(bus, cmd, arg),
            Ok(CommandDescriptor::ShortData(arg)) => self.short_transfer(bus, cmd, arg),
            _ => {
                self.logger
                    .error(format_args!("i3c ctrl: bad argument word 0x{arg:08x}"));
                self.halt();
            }
        }
    }

    /// Target address of a slot, logging out-of-range slots.
    fn slot_address(&mut self, slot: usize) -> u8 {
        if slot >= self.address_table.depth() {
            self.logger
                .error(format_args!("i3c ctrl: address table slot {slot} out of range"));
        }
        self.address_table.target_address(slot)
    }

    fn start<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        address: u8,
        direction: Direction,
        legacy: bool,
    ) -> Result<(), Error> {
        let result = if legacy {
            bus.legacy_start(address, direction)
        } else {
            bus.start_transfer(address, direction)
        };
        if result.is_err() {
            self.logger
                .error(format_args!("i3c ctrl: address 0x{address:02x} nacked"));
            self.halt();
        }
        result
    }

    fn send_byte<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        byte: u8,
        legacy: bool,
    ) -> Result<(), Error> {
        let result = if legacy {
            bus.legacy_send(byte)
        } else {
            bus.send(&[byte]).map(|_| ())
        };
        if result.is_err() {
            self.logger
                .error(format_args!("i3c ctrl: byte 0x{byte:02x} nacked"));
            self.halt();
        }
        result
    }

    /// Legacy targets can neither refuse nor shorten a read.
    fn recv_data<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        buf: &mut [u8],
        legacy: bool,
    ) -> Result<usize, Error> {
        if legacy {
            for byte in buf.iter_mut() {
                *byte = bus.legacy_recv();
            }
            return Ok(buf.len());
        }
        let result = bus.recv(buf);
        if result.is_err() {
            self.logger.error(format_args!("i3c ctrl: read nacked"));
            self.halt();
        }
        result
    }

    fn end<D: TargetDevice, BL: Logger>(bus: &mut Bus<D, BL>, legacy: bool) {
        if legacy {
            bus.legacy_end();
        } else {
            bus.end_transfer();
        }
    }

    /// Pull TX words and send them byte by byte. `Err` carries the count
    /// sent before the Nack.
    fn tx<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        len: u16,
        legacy: bool,
    ) -> Result<u16, u16> {
        let mut sent = 0u16;
        while sent < len {
            for byte in self.pop_tx().to_le_bytes() {
                if self.send_byte(bus, byte, legacy).is_err() {
                    return Err(sent);
                }
                sent += 1;
                if sent >= len {
                    break;
                }
            }
        }
        Ok(sent)
    }

    /// Read into RX a word at a time; a short trailing word is zero padded.
    fn rx<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        len: u16,
        legacy: bool,
    ) -> Result<u16, u16> {
        let mut received = 0u16;
        while received < len {
            let want = usize::from((len - received).min(4));
            let mut word = [0u8; 4];
            let Some(chunk) = word.get_mut(..want) else {
                break;
            };
            let got = self
                .recv_data(bus, chunk, legacy)
                .map_err(|_| received)?
                .min(want);
            for byte in word.iter_mut().skip(got) {
                *byte = 0;
            }
            if got > 0 {
                self.push_rx(u32::from_le_bytes(word));
            }
            received += got as u16;
            if got < want {
                break;
            }
        }
        Ok(received)
    }

    fn transfer_ccc<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        cmd: TransferCommand,
    ) -> Result<(), ResponseError> {
        let code = cmd.cmd() as u8;
        self.start(bus, BROADCAST_ADDR, Direction::Write, false)
            .map_err(|_| ResponseError::BroadcastNack)?;
        self.logger.debug(format_args!("i3c ctrl: ccc 0x{code:02x}"));
        self.send_byte(bus, code, false)
            .map_err(|_| ResponseError::I2cNack)?;
        if ccc::is_direct(code) {
            let address = self.slot_address(cmd.dev_index() as usize);
            self.start(bus, address, Direction::from_rnw(cmd.rnw()), false)
                .map_err(|_| ResponseError::BroadcastNack)?;
        }
        Ok(())
    }

    fn transfer<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        cmd: TransferCommand,
        arg: TransferArgument,
    ) {
        let slot = cmd.dev_index() as usize;
        let legacy = !cmd.cp() && self.address_table.is_legacy_i2c(slot);
        let direction = Direction::from_rnw(cmd.rnw());
        let len = arg.data_len() as u16;
        let code = cmd.cp().then_some(cmd.cmd() as u8);
        self.set_status(TransferStatus::for_transfer(
            code,
            direction.is_read(),
            legacy,
        ));

        let addressed = if cmd.cp() {
            self.transfer_ccc(bus, cmd)
        } else {
            self.private_start(bus, slot, direction, legacy)
        };

        let (err, moved) = match addressed {
            Err(err) => (err, 0),
            Ok(()) => {
                let moved = if direction.is_read() {
                    self.rx(bus, len, legacy)
                } else {
                    self.tx(bus, len, legacy)
                };
                match moved {
                    Ok(count) => {
                        self.go_idle();
                        (ResponseError::None, count)
                    }
                    Err(count) => (ResponseError::I2cNack, count),
                }
            }
        };

        if cmd.toc() {
            Self::end(bus, legacy);
        }
        if cmd.roc() {
            let remaining = if direction.is_read() {
                moved
            } else {
                len.saturating_sub(moved)
            };
            self.push_response(
                ResponseDescriptor(0)
                    .with_tid(cmd.tid())
                    .with_err_status(err as u32)
                    .with_data_length(u32::from(remaining)),
            );
        }
    }

    fn private_start<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        slot: usize,
        direction: Direction,
        legacy: bool,
    ) -> Result<(), ResponseError> {
        let address = self.slot_address(slot);
        if self.device_ctrl & device_ctrl::BROADCAST_ADDR_INC != 0 && !legacy {
            self.start(bus, BROADCAST_ADDR, Direction::Write, false)
                .map_err(|_| ResponseError::I2cNack)?;
        }
        self.start(bus, address, direction, legacy)
            .map_err(|_| ResponseError::I2cNack)
    }

    fn short_transfer<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        cmd: TransferCommand,
        arg: ShortDataArgument,
    ) {
        if cmd.rnw() {
            self.logger
                .error(format_args!("i3c ctrl: short data argument cannot read"));
            return;
        }
        let slot = cmd.dev_index() as usize;
        let legacy = self.address_table.is_legacy_i2c(slot);
        let address = self.slot_address(slot);
        self.set_status(TransferStatus::for_transfer(None, false, legacy));

        // Byte 0 of the argument only travels as a CCC defining byte.
        let mut data: Vec<u8, 4> = Vec::new();
        if cmd.cp() {
            let _ = data.push(cmd.cmd() as u8);
            if cmd.dbp() {
                let _ = data.push(arg.byte(0));
            }
        }
        if arg.byte_strb() & 0x2 != 0 {
            let _ = data.push(arg.byte(1));
        }
        if arg.byte_strb() & 0x4 != 0 {
            let _ = data.push(arg.byte(2));
        }

        let mut err = ResponseError::None;
        if self.start(bus, address, Direction::Write, legacy).is_err() {
            err = ResponseError::I2cNack;
        } else {
            for &byte in &data {
                if self.send_byte(bus, byte, legacy).is_err() {
                    err = ResponseError::I2cNack;
                    break;
                }
            }
            if err == ResponseError::None {
                self.go_idle();
            }
        }

        if cmd.toc() {
            Self::end(bus, legacy);
        }
        if cmd.roc() {
            self.push_response(
                ResponseDescriptor(0)
                    .with_tid(cmd.tid())
                    .with_err_status(err as u32),
            );
        }
    }

    fn addr_assign<D: TargetDevice, BL: Logger>(
        &mut self,
        bus: &mut Bus<D, BL>,
        cmd: AddressAssignCommand,
    ) {
        if !self.config.role.can_assign_addresses() {
            self.logger.error(format_args!(
                "i3c ctrl: {:?} cannot run ENTDAA",
                self.config.role
            ));
            return;
        }
        self.present_state = self.present_state.with_cmd_tid(cmd.tid());
        self.set_status(TransferStatus::Entdaa);
        self.set_state(TransferState::Daa);

        let first = cmd.dev_index() as usize;
        let count = cmd.dev_count() as usize;
        let mut assigned = 0;
        let mut err = ResponseError::None;

        let opened = self
            .start(bus, BROADCAST_ADDR, Direction::Write, false)
            .and_then(|()| self.send_byte(bus, cmd.cmd() as u8, false));
        if opened.is_err() {
            err = ResponseError::BroadcastNack;
        } else {
            while assigned < count {
                let slot = first + assigned;
                let Ok(address) = self.address_table.assignable_address(slot) else {
                    self.logger.error(format_args!(
                        "i3c ctrl: slot {slot} holds no assignable address"
                    ));
                    err = ResponseError::DaaNack;
                    break;
                };
                // A broadcast nobody answers ends the assignment without
                // halting: every target already has an address.
                if bus.start_transfer(BROADCAST_ADDR, Direction::Write).is_err() {
                    self.logger
                        .debug(format_args!("i3c ctrl: no target left for ENTDAA"));
                    err = ResponseError::BroadcastNack;
                    break;
                }
                let mut identity = [0u8; ENTDAA_RESPONSE_LEN];
                if self.recv_data(bus, &mut identity, false).is_err() {
                    err = ResponseError::DaaNack;
                    break;
                }
                if self.send_byte(bus, address, false).is_err() {
                    err = ResponseError::DaaNack;
                    break;
                }
                let chars = DeviceCharacteristics::from_entdaa(identity, address);
                if self.char_table.record(slot, chars).is_err() {
                    self.logger.error(format_args!(
                        "i3c ctrl: characteristic table slot {slot} out of range"
                    ));
                }
                self.logger.debug(format_args!(
                    "i3c ctrl: pid 0x{:012x} -> 0x{address:02x}",
                    chars.pid
                ));
                let [w0, w1] = [0usize, 4].map(|at| {
                    let mut word = [0u8; 4];
                    for (dst, src) in word.iter_mut().zip(identity.iter().skip(at)) {
                        *dst = *src;
                    }
                    u32::from_le_bytes(word)
                });
                self.push_rx(w0);
                self.push_rx(w1);
                assigned += 1;
            }
        }

        if !self.is_halted() {
            self.go_idle();
        }
        if cmd.toc() {
            bus.end_transfer();
        }
        if cmd.roc() {
            self.push_response(
                ResponseDescriptor(0)
                    .with_tid(cmd.tid())
                    .with_err_status(err as u32)
                    .with_data_length((count - assigned) as u32),
            );
        }
    }
}

impl<D: TargetDevice, BL: Logger, L: Logger> IbiHandler<D, BL> for QueueEngine<L> {
    fn ibi_request(
        &mut self,
        _bus: &mut Bus<D, BL>,
        target_address: u8,
        address: u8,
        is_recv: bool,
    ) -> Result<(), Error> {
        self.set_status(TransferStatus::Ibi);
        self.set_state(TransferState::IbiRead);
        let policy = IbiPolicy::from_regs(self.device_ctrl, self.ibi_queue_ctrl);
        let result = self
            .ibi
            .request(policy, &self.address_table, target_address, address, is_recv);
        self.logger.debug(format_args!(
            "i3c ctrl: ibi 0x{address:02x} rnw {} -> {}",
            is_recv,
            if result.is_ok() { "ack" } else { "nack" }
        ));
        result
    }

    fn ibi_recv(&mut self, _bus: &mut Bus<D, BL>, byte: u8) -> Result<(), Error> {
        // Refuse the byte that would no longer fit in the IBI queue; what is
        // already buffered is queued as a shorter IBI.
        let slices = slice_size(self.queue_thld.ibi_data());
        if queue_words(self.ibi.buffered() + 1, slices) > self.ibi_queue.free() {
            self.logger.error(format_args!(
                "i3c ctrl: ibi queue full, ibi cut at {} bytes",
                self.ibi.buffered()
            ));
            return Err(Error::DataNack);
        }
        let result = self.ibi.recv_byte(byte);
        if result.is_err() {
            self.logger
                .error(format_args!("i3c ctrl: ibi buffer full, aborting ibi"));
        }
        result
    }

    fn ibi_finish(&mut self, bus: &mut Bus<D, BL>) -> Result<(), Error> {
        if let Some(disec) = self.ibi.take_disec() {
            self.set_state(TransferState::IbiDisable);
            if disec.send(bus).is_err() {
                self.logger.error(format_args!(
                    "i3c ctrl: DISEC 0x{:02x} was not delivered",
                    disec.events
                ));
            }
        }
        let slices = slice_size(self.queue_thld.ibi_data());
        let result = self.ibi.finish(slices, &mut self.ibi_queue);
        match result {
            Ok(0) => {}
            Ok(count) => self.ibi_status_cnt = count,
            Err(_) => self
                .logger
                .error(format_args!("i3c ctrl: ibi queue overflow")),
        }
        if self.ibi_queue.len() > self.queue_thld.ibi_status() as usize {
            self.intr.set(intr::IBI_THLD);
        }
        self.go_idle();
        result.map(|_| ())
    }
}

/// A controller attached to the bus it drives.
///
/// This is the software-facing register surface: command/TX/RX/response/IBI
/// ports, DEVICE_CTRL, interrupts, thresholds and resets.
pub struct Controller<D: TargetDevice, L: Logger + Clone = NoOpLogger> {
    bus: Bus<D, L>,
    engine: QueueEngine<L>,
}

impl<D: TargetDevice> Controller<D, NoOpLogger> {
    #[must_use]
    pub fn with_config(config: ControllerConfig) -> Self {
        Self::new(config, NoOpLogger {})
    }
}

impl<D: TargetDevice, L: Logger + Clone> Controller<D, L> {
    pub fn new(config: ControllerConfig, logger: L) -> Self {
        Self {
            bus: Bus::new(logger.clone()),
            engine: QueueEngine::new(config, logger),
        }
    }

    #[must_use]
    pub const fn bus(&self) -> &Bus<D, L> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<D, L> {
        &mut self.bus
    }

    #[must_use]
    pub const fn engine(&self) -> &QueueEngine<L> {
        &self.engine
    }

    /// # Errors
    ///
    /// See [`Bus::register`].
    pub fn register_target(&mut self, device: D) -> Result<usize, Error> {
        self.bus.register(device)
    }

    /// COMMAND_QUEUE_PORT write.
    pub fn write_command(&mut self, word: u32) {
        let is_command = self.engine.push_command(word);
        if is_command && self.engine.config().role.drives_bus() {
            self.engine.execute(&mut self.bus);
        }
    }

    /// Queue an (argument, command) pair.
    pub fn submit(&mut self, arg: u32, cmd: u32) {
        self.write_command(arg);
        self.write_command(cmd);
    }

    /// TX data port write.
    pub fn write_tx(&mut self, word: u32) {
        self.engine.push_tx(word);
    }

    /// Queue `data` as little-endian TX words.
    pub fn write_tx_bytes(&mut self, data: &[u8]) {
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            for (dst, src) in word.iter_mut().zip(chunk) {
                *dst = *src;
            }
            self.engine.push_tx(u32::from_le_bytes(word));
        }
    }

    /// RX data port read.
    pub fn read_rx(&mut self) -> u32 {
        self.engine.pop_rx()
    }

    /// RESPONSE_QUEUE_PORT read; 0 (and a logged error) when empty.
    pub fn read_response(&mut self) -> u32 {
        match self.engine.pop_response() {
            Some(response) => response.bits(),
            None => {
                self.engine
                    .logger
                    .error(format_args!("i3c ctrl: response queue read while empty"));
                0
            }
        }
    }

    /// Non-blocking response read.
    ///
    /// # Errors
    ///
    /// `nb::Error::WouldBlock` while no response is queued.
    pub fn poll_response(&mut self) -> nb::Result<ResponseDescriptor, Error> {
        self.engine.pop_response().ok_or(nb::Error::WouldBlock)
    }

    /// IBI_QUEUE_DATA read.
    pub fn read_ibi(&mut self) -> u32 {
        self.engine.pop_ibi()
    }

    pub fn set_device_ctrl(&mut self, value: u32) {
        self.engine.write_device_ctrl(&mut self.bus, value);
    }

    #[must_use]
    pub const fn device_ctrl(&self) -> u32 {
        self.engine.device_ctrl()
    }

    /// Set ENABLE, keeping the other DEVICE_CTRL bits.
    pub fn enable(&mut self) {
        let value = self.engine.device_ctrl() | device_ctrl::ENABLE;
        self.set_device_ctrl(value);
    }

    /// Release a halted engine.
    pub fn resume(&mut self) {
        let value = self.engine.device_ctrl() | device_ctrl::RESUME;
        self.set_device_ctrl(value);
    }

    pub fn abort(&mut self) {
        let value = self.engine.device_ctrl() | device_ctrl::ABORT;
        self.set_device_ctrl(value);
    }

    #[must_use]
    pub const fn intr_status(&self) -> u32 {
        self.engine.interrupts().status()
    }

    #[must_use]
    pub const fn raw_intr_status(&self) -> u32 {
        self.engine.interrupts().raw_status()
    }

    pub fn write_intr_status(&mut self, value: u32) {
        self.engine.interrupts_mut().write_status(value);
    }

    pub fn set_intr_status_en(&mut self, value: u32) {
        self.engine.interrupts_mut().write_status_en(value);
    }

    pub fn set_intr_signal_en(&mut self, value: u32) {
        self.engine.interrupts_mut().write_signal_en(value);
    }

    pub fn force_intr(&mut self, value: u32) {
        self.engine.interrupts_mut().force(value);
    }

    #[must_use]
    pub const fn irq_level(&self) -> bool {
        self.engine.interrupts().irq_level()
    }

    pub fn reset_ctrl(&mut self, value: u32) {
        self.engine.reset_ctrl(value);
    }

    #[must_use]
    pub const fn present_state(&self) -> PresentState {
        self.engine.present_state()
    }

    #[must_use]
    pub fn queue_status_level(&self) -> QueueStatusLevel {
        self.engine.queue_status_level()
    }

    #[must_use]
    pub fn data_buffer_status_level(&self) -> DataBufferStatusLevel {
        self.engine.data_buffer_status_level()
    }

    pub fn set_queue_thld_ctrl(&mut self, value: u32) {
        self.engine.set_queue_thld_ctrl(value);
    }

    pub fn set_data_buffer_thld_ctrl(&mut self, value: u32) {
        self.engine.set_data_buffer_thld_ctrl(value);
    }

    pub fn set_ibi_queue_ctrl(&mut self, value: u32) {
        self.engine.set_ibi_queue_ctrl(value);
    }

    /// # Errors
    ///
    /// `Error::InvalidSlot` beyond the configured table depth.
    pub fn set_address_table_entry(
        &mut self,
        slot: usize,
        entry: AddressTableEntry,
    ) -> Result<(), Error> {
        self.engine.address_table_mut().set_entry(slot, entry)
    }

    #[must_use]
    pub const fn address_table(&self) -> &AddressTable {
        self.engine.address_table()
    }

    #[must_use]
    pub const fn char_table(&self) -> &CharacteristicTable {
        self.engine.char_table()
    }

    /// Let every target with a pending IBI raise it. Returns how many did.
    pub fn service_ibis(&mut self) -> usize {
        self.bus.service_ibis(&mut self.engine)
    }
}
