// Licensed under the Apache-2.0 license

//! Target-side capability interface.
//!
//! Every device that can sit on the bus implements [`TargetDevice`]. The bus
//! owns the bus-level identity of a target ([`TargetCore`]): addresses, the
//! provisioned ID, and the cursor into the CCC currently being delivered.
//! Devices only implement their own behaviour; address assignment and the
//! ENTDAA identity exchange are handled by the bus before a device sees the
//! bytes.

use crate::i3c::ccc;
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use heapless::Vec;

/// Largest IBI payload a target may queue.
pub const MAX_IBI_PAYLOAD: usize = 256;

/// Progress through the CCC a target is currently receiving.
///
/// `byte_offset` counts payload bytes after the opcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CccCursor {
    pub active_ccc: Option<u8>,
    pub byte_offset: usize,
}

impl CccCursor {
    #[must_use]
    pub const fn in_ccc(&self) -> bool {
        self.active_ccc.is_some()
    }

    /// The active opcode, or `0xff` when none.
    #[must_use]
    pub fn code(&self) -> u8 {
        self.active_ccc.unwrap_or(0xff)
    }
}

/// Bus-visible identity and CCC state of a target.
#[derive(Clone, Debug)]
pub struct TargetCore {
    static_address: u8,
    dynamic_address: Option<u8>,
    pid: u64,
    bcr: u8,
    dcr: u8,
    events: u8,
    cursor: CccCursor,
}

impl TargetCore {
    /// A target with a factory-set identity. `static_address` may be 0 for
    /// targets that can only be reached after ENTDAA.
    #[must_use]
    pub const fn new(static_address: u8, pid: u64, bcr: u8, dcr: u8) -> Self {
        Self {
            static_address,
            dynamic_address: None,
            pid: pid & 0xffff_ffff_ffff,
            bcr,
            dcr,
            events: ccc::events::ALL,
            cursor: CccCursor {
                active_ccc: None,
                byte_offset: 0,
            },
        }
    }

    #[must_use]
    pub const fn static_address(&self) -> u8 {
        self.static_address
    }

    pub fn set_static_address(&mut self, address: u8) {
        self.static_address = address;
    }

    #[must_use]
    pub const fn dynamic_address(&self) -> Option<u8> {
        self.dynamic_address
    }

    pub fn set_dynamic_address(&mut self, address: Option<u8>) {
        self.dynamic_address = address;
    }

    /// Dynamic address when assigned, static address otherwise.
    #[must_use]
    pub fn address(&self) -> u8 {
        self.dynamic_address.unwrap_or(self.static_address)
    }

    #[must_use]
    pub const fn pid(&self) -> u64 {
        self.pid
    }

    #[must_use]
    pub const fn bcr(&self) -> u8 {
        self.bcr
    }

    #[must_use]
    pub const fn dcr(&self) -> u8 {
        self.dcr
    }

    /// The eight bytes a target answers with during ENTDAA.
    #[must_use]
    pub fn entdaa_response(&self) -> [u8; 8] {
        let pid = self.pid.to_le_bytes();
        let [p0, p1, p2, p3, p4, p5, _, _] = pid;
        [p0, p1, p2, p3, p4, p5, self.bcr, self.dcr]
    }

    /// Event classes (see [`ccc::events`]) the controller currently allows.
    #[must_use]
    pub const fn events(&self) -> u8 {
        self.events
    }

    #[must_use]
    pub const fn events_enabled(&self, mask: u8) -> bool {
        self.events & mask == mask
    }

    pub fn enable_events(&mut self, mask: u8) {
        self.events |= mask & ccc::events::ALL;
    }

    pub fn disable_events(&mut self, mask: u8) {
        self.events &= !mask;
    }

    #[must_use]
    pub const fn cursor(&self) -> CccCursor {
        self.cursor
    }

    pub fn begin_ccc(&mut self, code: u8) {
        self.cursor = CccCursor {
            active_ccc: Some(code),
            byte_offset: 0,
        };
    }

    pub fn advance_ccc(&mut self, bytes: usize) {
        self.cursor.byte_offset += bytes;
    }

    pub fn reset_ccc(&mut self) {
        self.cursor = CccCursor::default();
    }
}

/// An in-band interrupt a target wants to raise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IbiRequest {
    /// Address sent in the IBI header: the target's own address, or
    /// [`HOT_JOIN_ADDR`](crate::i3c::common::HOT_JOIN_ADDR).
    pub address: u8,
    /// `true` for a target interrupt, `false` for a controller role request.
    pub is_recv: bool,
    pub payload: Vec<u8, MAX_IBI_PAYLOAD>,
}

impl IbiRequest {
    #[must_use]
    pub const fn new(address: u8, is_recv: bool) -> Self {
        Self {
            address,
            is_recv,
            payload: Vec::new(),
        }
    }

    /// Event class this request belongs to, for ENEC/DISEC filtering.
    #[must_use]
    pub fn event_class(&self) -> u8 {
        if self.address == crate::i3c::common::HOT_JOIN_ADDR {
            ccc::events::HJ
        } else if self.is_recv {
            ccc::events::INT
        } else {
            ccc::events::CR
        }
    }
}

/// How the controller answered an IBI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IbiOutcome {
    Acked,
    /// The header was refused.
    Nacked,
    /// The header was accepted but a payload byte was refused.
    DataNacked,
}

/// Capability set of a device attached to the bus.
///
/// The five transfer callbacks mirror what a target observes on the wire.
/// CCC callbacks are invoked after the bus has applied the bus-level
/// semantics of the opcode, with the cursor as it stood before `data`.
/// `handle_ccc_write` is also invoked with an empty payload when the opcode
/// itself arrives.
pub trait TargetDevice {
    fn core(&self) -> &TargetCore;

    fn core_mut(&mut self) -> &mut TargetCore;

    /// Accept private-write bytes.
    ///
    /// # Errors
    ///
    /// `Error::DataNack` when the target refuses a byte. Bytes before the
    /// refused one are considered delivered.
    fn send(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Supply private-read bytes. Returning fewer than `buf.len()` ends the
    /// read early.
    fn recv(&mut self, buf: &mut [u8]) -> usize;

    /// # Errors
    ///
    /// `Error::AddressNack` to refuse selection.
    fn event(&mut self, event: TargetEvent) -> Result<(), Error>;

    /// # Errors
    ///
    /// `Error::DataNack` for an unsupported CCC.
    fn handle_ccc_read(&mut self, ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error>;

    /// # Errors
    ///
    /// `Error::DataNack` for an unsupported CCC or payload.
    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error>;

    /// Legacy targets are only reachable through the I2C surface of the bus.
    fn is_legacy_i2c(&self) -> bool {
        false
    }

    /// Hand over a pending IBI, if any.
    fn take_ibi(&mut self) -> Option<IbiRequest> {
        None
    }

    fn ibi_done(&mut self, _outcome: IbiOutcome) {}
}
