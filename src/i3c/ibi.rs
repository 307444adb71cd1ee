// Licensed under the Apache-2.0 license

//! In-band interrupt arbitration.
//!
//! The bus gate ([`Bus::service_ibis`](crate::i3c::bus::Bus::service_ibis))
//! drives an [`IbiHandler`] through `request`, one `recv` per payload byte
//! and `finish`. The controller's handler keeps its intermediate state in an
//! [`IbiArbiter`], which classifies the request, applies the reject policy,
//! and on `finish` turns the buffered payload into IBI queue words.

use crate::common::Logger;
use crate::i3c::address_table::AddressTable;
use crate::i3c::bus::Bus;
use crate::i3c::ccc;
use crate::i3c::common::{Direction, BROADCAST_ADDR, HOT_JOIN_ADDR};
use crate::i3c::descriptor::IbiStatus;
use crate::i3c::error::Error;
use crate::i3c::queue::{WordQueue, IBI_QUEUE_DEPTH};
use crate::i3c::regs::{device_ctrl, ibi_queue_ctrl};
use crate::i3c::target::TargetDevice;
use heapless::Vec;

/// Bytes the intermediate IBI buffer holds.
pub const IBI_BUFFER_CAPACITY: usize = IBI_QUEUE_DEPTH * 8;

/// Receiver of in-band interrupts on a bus.
///
/// `finish` always runs, also after a refused request, so a handler can
/// answer a rejection with DISEC on the same bus.
pub trait IbiHandler<D: TargetDevice, L: Logger> {
    /// Arbitrate an IBI header. `target_address` is the current address of
    /// the requesting target, `address` what it put in the header.
    ///
    /// # Errors
    ///
    /// `Error::AddressNack` to refuse the IBI.
    fn ibi_request(
        &mut self,
        bus: &mut Bus<D, L>,
        target_address: u8,
        address: u8,
        is_recv: bool,
    ) -> Result<(), Error>;

    /// # Errors
    ///
    /// `Error::DataNack` to refuse the byte and abort the IBI.
    fn ibi_recv(&mut self, bus: &mut Bus<D, L>, byte: u8) -> Result<(), Error>;

    /// # Errors
    ///
    /// Implementation defined; the gate only logs it.
    fn ibi_finish(&mut self, bus: &mut Bus<D, L>) -> Result<(), Error>;
}

/// Handler for a bus with no IBI receiver: every request is refused.
#[derive(Clone, Copy, Debug, Default)]
pub struct NackAllIbis;

impl<D: TargetDevice, L: Logger> IbiHandler<D, L> for NackAllIbis {
    fn ibi_request(
        &mut self,
        _bus: &mut Bus<D, L>,
        _target_address: u8,
        _address: u8,
        _is_recv: bool,
    ) -> Result<(), Error> {
        Err(Error::AddressNack)
    }

    fn ibi_recv(&mut self, _bus: &mut Bus<D, L>, _byte: u8) -> Result<(), Error> {
        Err(Error::DataNack)
    }

    fn ibi_finish(&mut self, _bus: &mut Bus<D, L>) -> Result<(), Error> {
        Ok(())
    }
}

/// Reject and notify configuration, taken from DEVICE_CTRL and
/// IBI_QUEUE_CTRL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IbiPolicy {
    pub hot_join_nack_and_disable: bool,
    pub notify_rejected_hot_join: bool,
    pub notify_rejected_controller_request: bool,
    pub notify_rejected_target_interrupt: bool,
}

impl IbiPolicy {
    #[must_use]
    pub const fn from_regs(device_ctrl: u32, ibi_queue_ctrl: u32) -> Self {
        Self {
            hot_join_nack_and_disable: device_ctrl & device_ctrl::HOT_JOIN_ACK_NACK_CTRL != 0,
            notify_rejected_hot_join: ibi_queue_ctrl & ibi_queue_ctrl::NOTIFY_REJECTED_HOT_JOIN
                != 0,
            notify_rejected_controller_request: ibi_queue_ctrl
                & ibi_queue_ctrl::NOTIFY_REJECTED_MASTER_REQ
                != 0,
            notify_rejected_target_interrupt: ibi_queue_ctrl
                & ibi_queue_ctrl::NOTIFY_REJECTED_SLAVE_IRQ
                != 0,
        }
    }
}

/// DISEC a rejection asks to send back to the requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Disec {
    /// `None` for a broadcast DISEC.
    pub address: Option<u8>,
    pub events: u8,
}

impl Disec {
    /// Send this DISEC on `bus` and end the transfer.
    ///
    /// # Errors
    ///
    /// Propagates the Nack of the broadcast header or of the direct restart.
    pub fn send<D: TargetDevice, L: Logger>(self, bus: &mut Bus<D, L>) -> Result<(), Error> {
        let result = self.drive(bus);
        bus.end_transfer();
        result
    }

    fn drive<D: TargetDevice, L: Logger>(self, bus: &mut Bus<D, L>) -> Result<(), Error> {
        bus.start_transfer(BROADCAST_ADDR, Direction::Write)?;
        match self.address {
            Some(address) => {
                bus.send(&[ccc::DISEC_DIRECT])?;
                bus.start_transfer(address, Direction::Write)?;
            }
            None => {
                bus.send(&[ccc::DISEC])?;
            }
        }
        bus.send(&[self.events])?;
        Ok(())
    }
}

/// Slice size in bytes for an IBI_DATA_THLD value: whole words, at least
/// one, at most 63 bytes.
#[must_use]
pub const fn slice_size(ibi_data_thld: u32) -> usize {
    let words = if ibi_data_thld == 0 {
        1
    } else {
        ibi_data_thld as usize
    };
    let bytes = words * 4;
    if bytes >= 64 {
        63
    } else {
        bytes
    }
}

/// Queue words taken by a `len`-byte IBI cut into `slice_size` slices: one
/// status per slice plus the payload padded to whole words.
#[must_use]
pub fn queue_words(len: usize, slice_size: usize) -> usize {
    if len == 0 {
        return 1;
    }
    let slice_size = slice_size.max(1);
    let full = len / slice_size;
    let rest = len % slice_size;
    let mut words = full * (1 + slice_size.div_ceil(4));
    if rest > 0 {
        words += 1 + rest.div_ceil(4);
    }
    words
}

/// Intermediate state of the IBI in flight.
pub struct IbiArbiter {
    buffer: Vec<u8, IBI_BUFFER_CAPACITY>,
    status: IbiStatus,
    nacked: bool,
    notify: bool,
    aborted: bool,
    disec: Option<Disec>,
}

impl Default for IbiArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl IbiArbiter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            status: IbiStatus(0),
            nacked: false,
            notify: false,
            aborted: false,
            disec: None,
        }
    }

    /// Classify an IBI header and apply the reject policy.
    ///
    /// # Errors
    ///
    /// `Error::AddressNack` when the request is refused.
    pub fn request(
        &mut self,
        policy: IbiPolicy,
        table: &AddressTable,
        target_address: u8,
        address: u8,
        is_recv: bool,
    ) -> Result<(), Error> {
        self.status = IbiStatus::for_request(address, is_recv);

        if address == HOT_JOIN_ADDR {
            self.notify = policy.notify_rejected_hot_join;
            if policy.hot_join_nack_and_disable {
                self.reject(Some(Disec {
                    address: None,
                    events: ccc::events::HJ,
                }));
                return Err(Error::AddressNack);
            }
            return Ok(());
        }

        if address != target_address {
            self.reject(None);
            return Err(Error::AddressNack);
        }

        let (notify, events) = if is_recv {
            (policy.notify_rejected_target_interrupt, ccc::events::INT)
        } else {
            (policy.notify_rejected_controller_request, ccc::events::CR)
        };
        self.notify = notify;

        let Some(entry) = table.slot_of(address).and_then(|slot| table.entry(slot)) else {
            self.reject(None);
            return Err(Error::AddressNack);
        };
        let refused = if is_recv {
            entry.sir_reject()
        } else {
            entry.mr_reject()
        };
        if refused {
            self.reject(Some(Disec {
                address: Some(address),
                events,
            }));
            return Err(Error::AddressNack);
        }
        Ok(())
    }

    fn reject(&mut self, disec: Option<Disec>) {
        self.nacked = true;
        self.status = self.status.with_nacked(true);
        self.disec = disec;
    }

    /// Buffer one payload byte.
    ///
    /// # Errors
    ///
    /// `Error::DataNack` when the buffer is full; the IBI is then discarded
    /// on `finish`.
    pub fn recv_byte(&mut self, byte: u8) -> Result<(), Error> {
        if self.buffer.push(byte).is_err() {
            self.aborted = true;
            return Err(Error::DataNack);
        }
        Ok(())
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn is_nacked(&self) -> bool {
        self.nacked
    }

    pub fn take_disec(&mut self) -> Option<Disec> {
        self.disec.take()
    }

    /// Move the buffered IBI into `queue` and return to idle.
    ///
    /// Each slice of `slice_size` bytes is preceded by a status word; the
    /// last slice carries `last`. A refused IBI without notification, or one
    /// aborted by a full buffer, leaves the queue untouched. Returns the
    /// number of status words pushed.
    ///
    /// # Errors
    ///
    /// `Error::QueueOverflow` when the whole IBI does not fit in `queue`;
    /// nothing is pushed then.
    pub fn finish<const N: usize>(
        &mut self,
        slice_size: usize,
        queue: &mut WordQueue<N>,
    ) -> Result<usize, Error> {
        let result = if self.aborted || (self.nacked && !self.notify) {
            Ok(0)
        } else {
            self.push_slices(slice_size.max(1), queue)
        };
        self.reset();
        result
    }

    fn push_slices<const N: usize>(
        &self,
        slice_size: usize,
        queue: &mut WordQueue<N>,
    ) -> Result<usize, Error> {
        if queue_words(self.buffer.len(), slice_size) > queue.free() {
            return Err(Error::QueueOverflow);
        }
        if self.buffer.is_empty() {
            queue.push(self.status.with_last(true).bits())?;
            return Ok(1);
        }
        let total = self.buffer.len();
        let mut statuses = 0;
        for (index, slice) in self.buffer.chunks(slice_size).enumerate() {
            let last = (index + 1) * slice_size >= total;
            let status = self
                .status
                .with_data_length(slice.len() as u32)
                .with_last(last);
            queue.push(status.bits())?;
            statuses += 1;
            for bytes in slice.chunks(4) {
                let mut word = [0u8; 4];
                for (dst, src) in word.iter_mut().zip(bytes) {
                    *dst = *src;
                }
                queue.push(u32::from_le_bytes(word))?;
            }
        }
        Ok(statuses)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
