// Licensed under the Apache-2.0 license

//! Shared-medium model of an I3C bus.
//!
//! The bus owns the registered targets and the state of the transaction in
//! flight: which targets are selected, whether the header was a broadcast,
//! and which CCC (if any) is being delivered. Bus-level CCC semantics (address
//! assignment, ENTDAA identity exchange, event enables) are applied here
//! before a target's own CCC callbacks run.
//!
//! ## Transaction shape
//!
//! ```text
//! IDLE --start_transfer--> ADDRESSED --send/recv--> DATA | CCC --end_transfer--> IDLE
//! ```
//!
//! ENTDAA keeps the bus in its CCC state across repeated broadcast headers.
//! Each header selects the unassigned target with the lowest provisioned ID,
//! so every round has exactly one responder.

use crate::common::{Logger, NoOpLogger};
use crate::i3c::ccc;
use crate::i3c::common::{
    is_reserved_address, Direction, TargetEvent, BROADCAST_ADDR, ENTDAA_RESPONSE_LEN, MAX_TARGETS,
};
use crate::i3c::error::Error;
use crate::i3c::ibi::IbiHandler;
use crate::i3c::target::{IbiOutcome, IbiRequest, TargetDevice};
use heapless::Vec;

pub struct Bus<D: TargetDevice, L: Logger = NoOpLogger> {
    devices: Vec<D, MAX_TARGETS>,
    current_devs: Vec<usize, MAX_TARGETS>,
    broadcast: bool,
    in_ccc: bool,
    active_ccc: Option<u8>,
    in_entdaa: bool,
    legacy_current: Option<usize>,
    logger: L,
}

impl<D: TargetDevice> Default for Bus<D, NoOpLogger> {
    fn default() -> Self {
        Self::new(NoOpLogger {})
    }
}

impl<D: TargetDevice, L: Logger> Bus<D, L> {
    pub fn new(logger: L) -> Self {
        Self {
            devices: Vec::new(),
            current_devs: Vec::new(),
            broadcast: false,
            in_ccc: false,
            active_ccc: None,
            in_entdaa: false,
            legacy_current: None,
            logger,
        }
    }

    /// Attach a target and return its registry index.
    ///
    /// # Errors
    ///
    /// `Error::TableFull` when `MAX_TARGETS` targets are attached,
    /// `Error::ReservedAddress` for a non-zero reserved static address.
    pub fn register(&mut self, device: D) -> Result<usize, Error> {
        let static_address = device.core().static_address();
        if static_address != 0 && is_reserved_address(static_address) {
            self.logger.error(format_args!(
                "i3c: refusing target with reserved static address 0x{static_address:02x}"
            ));
            return Err(Error::ReservedAddress);
        }
        let index = self.devices.len();
        self.devices.push(device).map_err(|_| Error::TableFull)?;
        self.logger.debug(format_args!(
            "i3c: registered target {index} at static 0x{static_address:02x}"
        ));
        Ok(index)
    }

    #[must_use]
    pub fn device(&self, index: usize) -> Option<&D> {
        self.devices.get(index)
    }

    pub fn device_mut(&mut self, index: usize) -> Option<&mut D> {
        self.devices.get_mut(index)
    }

    #[must_use]
    pub fn devices(&self) -> &[D] {
        &self.devices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Registry indices selected by the transaction in flight.
    #[must_use]
    pub fn current_devices(&self) -> &[usize] {
        &self.current_devs
    }

    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    #[must_use]
    pub const fn in_ccc(&self) -> bool {
        self.in_ccc
    }

    #[must_use]
    pub const fn active_ccc(&self) -> Option<u8> {
        self.active_ccc
    }

    #[must_use]
    pub const fn in_entdaa(&self) -> bool {
        self.in_entdaa
    }

    pub fn logger_mut(&mut self) -> &mut L {
        &mut self.logger
    }

    /// Drive a START (or repeated START) with `address`.
    ///
    /// A broadcast header opens a new CCC unless ENTDAA is in progress.
    ///
    /// # Errors
    ///
    /// `Error::AddressNack` when nothing matched, or when a target refused a
    /// non-broadcast selection.
    pub fn start_transfer(&mut self, address: u8, direction: Direction) -> Result<(), Error> {
        if address == BROADCAST_ADDR {
            self.broadcast = true;
            if !self.in_entdaa {
                self.in_ccc = false;
                self.active_ccc = None;
            }
        } else {
            self.broadcast = false;
        }
        self.logger
            .debug(format_args!("i3c: start 0x{address:02x} {direction:?}"));

        if let Err(err) = self.scan_bus(address) {
            self.logger
                .debug(format_args!("i3c: no target answered 0x{address:02x}"));
            return Err(err);
        }

        let event = direction.target_event();
        for &index in &self.current_devs {
            let Some(device) = self.devices.get_mut(index) else {
                continue;
            };
            if device.event(event).is_err() && !self.broadcast {
                self.logger
                    .debug(format_args!("i3c: target {index} refused selection"));
                return Err(Error::AddressNack);
            }
        }
        Ok(())
    }

    /// Rebuild the selected set for `address`.
    ///
    /// During ENTDAA the set holds at most one target: the unassigned one
    /// that wins arbitration.
    ///
    /// # Errors
    ///
    /// `Error::AddressNack` when no target was selected.
    pub fn scan_bus(&mut self, address: u8) -> Result<(), Error> {
        self.current_devs.clear();
        if self.in_entdaa {
            if address != BROADCAST_ADDR {
                return Err(Error::AddressNack);
            }
            // Lowest (PID, BCR, DCR) wins.
            let winner = self
                .devices
                .iter()
                .enumerate()
                .filter(|(_, device)| {
                    !device.is_legacy_i2c() && device.core().dynamic_address().is_none()
                })
                .min_by_key(|(_, device)| {
                    let core = device.core();
                    (core.pid(), core.bcr(), core.dcr())
                })
                .map(|(index, _)| index);
            if let Some(index) = winner {
                let _ = self.current_devs.push(index);
            }
        } else {
            for (index, device) in self.devices.iter().enumerate() {
                if device.is_legacy_i2c() {
                    continue;
                }
                let own = device.core().address();
                let selected = self.broadcast || (own != 0 && own == address);
                if selected && self.current_devs.push(index).is_err() {
                    break;
                }
            }
        }
        if self.current_devs.is_empty() {
            Err(Error::AddressNack)
        } else {
            Ok(())
        }
    }

    /// Drive a STOP.
    pub fn end_transfer(&mut self) {
        for (index, device) in self.devices.iter_mut().enumerate() {
            device.core_mut().reset_ccc();
            if !self.in_entdaa && !self.current_devs.contains(&index) {
                continue;
            }
            if device.event(TargetEvent::Stop).is_err() {
                self.logger
                    .debug(format_args!("i3c: target {index} ignored STOP"));
            }
        }
        self.logger.debug(format_args!("i3c: stop"));
        self.current_devs.clear();
        self.broadcast = false;
        self.in_entdaa = false;
        self.in_ccc = false;
        self.active_ccc = None;
    }

    /// Write bytes to the selected targets.
    ///
    /// Right after a broadcast header the first byte is the CCC opcode.
    /// While a CCC is active every byte goes through the bus-level CCC
    /// handling of each selected target. Refusals are only reported in the
    /// addressed phase of a direct CCC.
    ///
    /// # Errors
    ///
    /// `Error::DataNack` when a target refused a private write or the
    /// payload of a direct CCC.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.current_devs.is_empty() || data.is_empty() {
            return Ok(0);
        }

        if self.broadcast && !self.in_ccc {
            if let Some(&code) = data.first() {
                self.in_ccc = true;
                self.active_ccc = Some(code);
                if code == ccc::ENTDAA {
                    self.in_entdaa = true;
                }
                for &index in &self.current_devs {
                    if let Some(device) = self.devices.get_mut(index) {
                        device.core_mut().reset_ccc();
                    }
                }
                self.logger.debug(format_args!("i3c: ccc 0x{code:02x}"));
            }
        }

        if self.in_ccc {
            let addressed = !self.broadcast && self.active_ccc.is_some_and(ccc::is_direct);
            for &index in &self.current_devs {
                let Some(device) = self.devices.get_mut(index) else {
                    continue;
                };
                if let Err(err) = Self::target_ccc_write(device, data) {
                    if addressed {
                        self.logger
                            .debug(format_args!("i3c: target {index} nacked direct ccc"));
                        return Err(err);
                    }
                    self.logger
                        .debug(format_args!("i3c: target {index} ignored broadcast ccc"));
                }
            }
            return Ok(data.len());
        }

        let mut accepted = data.len();
        for &index in &self.current_devs {
            let Some(device) = self.devices.get_mut(index) else {
                continue;
            };
            match device.send(data) {
                Ok(count) => accepted = accepted.min(count),
                Err(err) => {
                    self.logger
                        .debug(format_args!("i3c: target {index} nacked write"));
                    return Err(err);
                }
            }
        }
        Ok(accepted)
    }

    /// Read bytes from the first selected target.
    ///
    /// Unfilled bytes read as `0xff`, the idle level of SDA. Outside a CCC a
    /// target may end the read early; the returned count says how much it
    /// supplied.
    ///
    /// # Errors
    ///
    /// `Error::DataNack` when the target refused a CCC read.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        buf.fill(0xff);
        let Some(&index) = self.current_devs.first() else {
            return Ok(0);
        };
        let Some(device) = self.devices.get_mut(index) else {
            return Ok(0);
        };
        if self.in_ccc {
            let result = Self::target_ccc_read(device, buf);
            if result.is_err() {
                self.logger
                    .debug(format_args!("i3c: target {index} nacked ccc read"));
            }
            return result;
        }
        Ok(device.recv(buf).min(buf.len()))
    }

    /// Signal a controller NACK to the selected targets.
    pub fn nack(&mut self) {
        for &index in &self.current_devs {
            if let Some(device) = self.devices.get_mut(index) {
                let _ = device.event(TargetEvent::Nack);
            }
        }
    }

    fn target_ccc_write(device: &mut D, data: &[u8]) -> Result<(), Error> {
        let mut payload = data;
        if !device.core().cursor().in_ccc() {
            let Some((&code, rest)) = payload.split_first() else {
                return Ok(());
            };
            let core = device.core_mut();
            core.begin_ccc(code);
            match code {
                ccc::SETAASA => {
                    let static_address = core.static_address();
                    if static_address != 0 {
                        core.set_dynamic_address(Some(static_address));
                    }
                }
                ccc::RSTDAA => core.set_dynamic_address(None),
                _ => {}
            }
            let cursor = device.core().cursor();
            device.handle_ccc_write(cursor, &[])?;
            payload = rest;
        }
        if payload.is_empty() {
            return Ok(());
        }

        let cursor = device.core().cursor();
        let mut entdaa_done = false;
        {
            let core = device.core_mut();
            for (offset, &byte) in (cursor.byte_offset..).zip(payload) {
                match (cursor.code(), offset) {
                    (ccc::ENTDAA, ENTDAA_RESPONSE_LEN) => {
                        core.set_dynamic_address(Some(byte));
                        entdaa_done = true;
                    }
                    (ccc::SETDASA | ccc::SETNEWDA, 0) => core.set_dynamic_address(Some(byte)),
                    (ccc::ENEC | ccc::ENEC_DIRECT, 0) => core.enable_events(byte),
                    (ccc::DISEC | ccc::DISEC_DIRECT, 0) => core.disable_events(byte),
                    _ => {}
                }
            }
            core.advance_ccc(payload.len());
        }
        let result = device.handle_ccc_write(cursor, payload);
        if entdaa_done {
            device.core_mut().reset_ccc();
        }
        result
    }

    fn target_ccc_read(device: &mut D, buf: &mut [u8]) -> Result<usize, Error> {
        let cursor = device.core().cursor();
        if !cursor.in_ccc() {
            return Err(Error::DataNack);
        }
        let identity = device.core().entdaa_response();
        let (start, end) = match cursor.code() {
            ccc::ENTDAA => (0, ENTDAA_RESPONSE_LEN),
            ccc::GETPID => (0, 6),
            ccc::GETBCR => (6, 7),
            ccc::GETDCR => (7, 8),
            _ => {
                let supplied = device.handle_ccc_read(cursor, buf)?.min(buf.len());
                device.core_mut().advance_ccc(supplied);
                return Ok(supplied);
            }
        };
        // Identity bytes are answered by the bus alone.
        let pending = identity
            .get(start + cursor.byte_offset..end)
            .unwrap_or(&[]);
        let mut filled = 0;
        for (dst, &src) in buf.iter_mut().zip(pending) {
            *dst = src;
            filled += 1;
        }
        device.core_mut().advance_ccc(filled);
        Ok(filled)
    }

    /// START on the legacy I2C segment.
    ///
    /// # Errors
    ///
    /// `Error::AddressNack` when no legacy target owns `address` or it
    /// refused selection.
    pub fn legacy_start(&mut self, address: u8, direction: Direction) -> Result<(), Error> {
        let index = self
            .devices
            .iter()
            .position(|device| device.is_legacy_i2c() && device.core().static_address() == address)
            .ok_or(Error::AddressNack)?;
        self.legacy_current = Some(index);
        self.logger
            .debug(format_args!("i2c: start 0x{address:02x} {direction:?}"));
        let device = self.devices.get_mut(index).ok_or(Error::AddressNack)?;
        device
            .event(direction.target_event())
            .map_err(|_| Error::AddressNack)
    }

    /// # Errors
    ///
    /// `Error::DataNack` when the byte was refused or nothing is selected.
    pub fn legacy_send(&mut self, byte: u8) -> Result<(), Error> {
        let device = self
            .legacy_current
            .and_then(|index| self.devices.get_mut(index))
            .ok_or(Error::DataNack)?;
        match device.send(&[byte]) {
            Ok(1) => Ok(()),
            _ => Err(Error::DataNack),
        }
    }

    /// I2C targets cannot refuse a read; an idle bus reads `0xff`.
    pub fn legacy_recv(&mut self) -> u8 {
        let mut buf = [0xff];
        if let Some(device) = self
            .legacy_current
            .and_then(|index| self.devices.get_mut(index))
        {
            device.recv(&mut buf);
        }
        let [byte] = buf;
        byte
    }

    pub fn legacy_end(&mut self) {
        if let Some(device) = self
            .legacy_current
            .take()
            .and_then(|index| self.devices.get_mut(index))
        {
            let _ = device.event(TargetEvent::Stop);
        }
    }

    pub fn legacy_nack(&mut self) {
        if let Some(device) = self
            .legacy_current
            .and_then(|index| self.devices.get_mut(index))
        {
            let _ = device.event(TargetEvent::Nack);
        }
    }

    /// Collect pending IBIs from every target in registration order and run
    /// each through `handler`. Returns the number of IBIs raised.
    pub fn service_ibis<H: IbiHandler<D, L>>(&mut self, handler: &mut H) -> usize {
        let mut raised = 0;
        for index in 0..self.devices.len() {
            let request = match self.devices.get_mut(index) {
                Some(device) if !device.is_legacy_i2c() => device.take_ibi(),
                _ => None,
            };
            let Some(request) = request else {
                continue;
            };
            let outcome = self.deliver_ibi(index, &request, handler);
            self.logger.debug(format_args!(
                "i3c: ibi from 0x{:02x} -> {outcome:?}",
                request.address
            ));
            if let Some(device) = self.devices.get_mut(index) {
                device.ibi_done(outcome);
            }
            raised += 1;
        }
        raised
    }

    fn deliver_ibi<H: IbiHandler<D, L>>(
        &mut self,
        index: usize,
        request: &IbiRequest,
        handler: &mut H,
    ) -> IbiOutcome {
        let Some(device) = self.devices.get(index) else {
            return IbiOutcome::Nacked;
        };
        let target_address = device.core().address();
        if !device.core().events_enabled(request.event_class()) {
            self.logger.debug(format_args!(
                "i3c: target {index} raised a disabled ibi class"
            ));
            return IbiOutcome::Nacked;
        }

        let outcome = if handler
            .ibi_request(self, target_address, request.address, request.is_recv)
            .is_err()
        {
            IbiOutcome::Nacked
        } else {
            let mut outcome = IbiOutcome::Acked;
            for &byte in &request.payload {
                if handler.ibi_recv(self, byte).is_err() {
                    outcome = IbiOutcome::DataNacked;
                    break;
                }
            }
            outcome
        };
        if handler.ibi_finish(self).is_err() {
            self.logger.error(format_args!("i3c: ibi finish failed"));
        }
        outcome
    }
}
