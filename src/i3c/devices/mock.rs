// Licensed under the Apache-2.0 license

//! Scratch-buffer target used to exercise controllers.
//!
//! Private writes fill the buffer from the current cursor, private reads
//! drain it, and STOP rewinds the cursor. Writing the configured magic byte
//! as the only byte of a transfer queues a target interrupt, provided the
//! controller has enabled interrupts with ENEC.

use crate::i3c::ccc;
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, IbiOutcome, IbiRequest, TargetCore, TargetDevice};

pub const MOCK_BUFFER_SIZE: usize = 0x100;
/// IBI capable, with payload.
pub const MOCK_BCR: u8 = 0x06;
pub const MOCK_DCR: u8 = 0x00;

pub struct MockTarget {
    core: TargetCore,
    buf: [u8; MOCK_BUFFER_SIZE],
    buf_size: usize,
    cursor: usize,
    ibi_magic: u8,
    can_ibi: bool,
    written: usize,
    held_magic: bool,
    pending_ibi: Option<IbiRequest>,
    last_ibi: Option<IbiOutcome>,
}

impl MockTarget {
    /// `buf_size` is clamped to [`MOCK_BUFFER_SIZE`]. An `ibi_magic` of 0
    /// disables interrupts.
    #[must_use]
    pub fn new(static_address: u8, pid: u64, buf_size: usize, ibi_magic: u8) -> Self {
        Self {
            core: TargetCore::new(static_address, pid, MOCK_BCR, MOCK_DCR),
            buf: [0; MOCK_BUFFER_SIZE],
            buf_size: buf_size.min(MOCK_BUFFER_SIZE),
            cursor: 0,
            ibi_magic,
            can_ibi: false,
            written: 0,
            held_magic: false,
            pending_ibi: None,
            last_ibi: None,
        }
    }

    #[must_use]
    pub fn contents(&self) -> &[u8] {
        self.buf.get(..self.buf_size).unwrap_or(&[])
    }

    #[must_use]
    pub const fn can_ibi(&self) -> bool {
        self.can_ibi
    }

    /// Outcome of the last IBI this target raised.
    #[must_use]
    pub const fn last_ibi(&self) -> Option<IbiOutcome> {
        self.last_ibi
    }

    fn store(&mut self, data: &[u8]) -> usize {
        let mut stored = 0;
        for &byte in data {
            if self.cursor >= self.buf_size {
                break;
            }
            let Some(slot) = self.buf.get_mut(self.cursor) else {
                break;
            };
            *slot = byte;
            self.cursor += 1;
            stored += 1;
        }
        stored
    }

    fn raise_ibi(&mut self) {
        if !self.can_ibi {
            return;
        }
        self.pending_ibi = Some(IbiRequest::new(self.core.address(), true));
    }

    fn size_be(&self) -> [u8; 2] {
        (self.buf_size as u16).to_be_bytes()
    }
}

impl TargetDevice for MockTarget {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.written == 0 && self.ibi_magic != 0 && data == [self.ibi_magic] {
            // Held back until STOP shows whether it was the whole transfer.
            self.held_magic = true;
            self.written = 1;
            return Ok(1);
        }
        if self.held_magic {
            self.held_magic = false;
            let magic = self.ibi_magic;
            if self.store(&[magic]) != 1 {
                return Err(Error::DataNack);
            }
        }
        let stored = self.store(data);
        self.written += stored;
        if stored < data.len() {
            return Err(Error::DataNack);
        }
        Ok(stored)
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        let end = self.buf_size;
        let Some(available) = self.buf.get(self.cursor..end) else {
            return 0;
        };
        let count = available.len().min(buf.len());
        for (dst, &src) in buf.iter_mut().zip(available) {
            *dst = src;
        }
        self.cursor += count;
        count
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        match event {
            TargetEvent::Stop => {
                if self.held_magic && self.written == 1 {
                    self.raise_ibi();
                }
                self.held_magic = false;
                self.written = 0;
                self.cursor = 0;
            }
            TargetEvent::StartSend | TargetEvent::StartRecv => {
                self.held_magic = false;
                self.written = 0;
            }
            TargetEvent::Nack => {}
        }
        Ok(())
    }

    fn handle_ccc_read(&mut self, ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error> {
        let reply = match ccc.code() {
            ccc::GETMXDS => [0x00, 0x00],
            ccc::GETCAPS => [0x00, 0x01],
            ccc::GETMWL | ccc::GETMRL => self.size_be(),
            _ => return Err(Error::DataNack),
        };
        let pending = reply.get(ccc.byte_offset..).unwrap_or(&[]);
        let count = pending.len().min(buf.len());
        for (dst, &src) in buf.iter_mut().zip(pending) {
            *dst = src;
        }
        Ok(count)
    }

    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error> {
        match ccc.code() {
            ccc::ENEC | ccc::ENEC_DIRECT => {
                if data.first().is_some_and(|events| events & ccc::events::INT != 0) {
                    self.can_ibi = true;
                }
                Ok(())
            }
            ccc::DISEC | ccc::DISEC_DIRECT => {
                if data.first().is_some_and(|events| events & ccc::events::INT != 0) {
                    self.can_ibi = false;
                }
                Ok(())
            }
            ccc::ENTDAA
            | ccc::SETAASA
            | ccc::RSTDAA
            | ccc::SETDASA
            | ccc::SETNEWDA
            | ccc::GETPID
            | ccc::GETBCR
            | ccc::GETDCR
            | ccc::GETMWL
            | ccc::GETMRL
            | ccc::GETMXDS
            | ccc::GETCAPS => Ok(()),
            _ => Err(Error::DataNack),
        }
    }

    fn take_ibi(&mut self) -> Option<IbiRequest> {
        self.pending_ibi.take()
    }

    fn ibi_done(&mut self, outcome: IbiOutcome) {
        self.last_ibi = Some(outcome);
    }
}
