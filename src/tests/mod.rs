// Licensed under the Apache-2.0 license

//! Host-side test fixtures shared by the unit tests and the functional
//! suites.

pub mod functional;

use crate::common::Logger;
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, IbiOutcome, IbiRequest, TargetCore, TargetDevice};
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

/// What a [`RecordingTarget`] observed, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Event(TargetEvent),
    Send(Vec<u8>),
}

/// Target that records every transfer callback and answers reads from a
/// scripted byte queue.
pub struct RecordingTarget {
    core: TargetCore,
    pub calls: Vec<Call>,
    pub refuse_start: bool,
    pub refuse_ccc: bool,
    pub read_data: Vec<u8>,
    pub legacy: bool,
    pub pending_ibi: Option<IbiRequest>,
    pub ibi_outcomes: Vec<IbiOutcome>,
}

impl RecordingTarget {
    pub const BCR: u8 = 0x06;
    pub const DCR: u8 = 0x00;

    pub fn new(static_address: u8, pid: u64) -> Self {
        Self {
            core: TargetCore::new(static_address, pid, Self::BCR, Self::DCR),
            calls: Vec::new(),
            refuse_start: false,
            refuse_ccc: false,
            read_data: Vec::new(),
            legacy: false,
            pending_ibi: None,
            ibi_outcomes: Vec::new(),
        }
    }
}

impl TargetDevice for RecordingTarget {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.calls.push(Call::Send(data.to_vec()));
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.read_data.len());
        for (dst, src) in buf.iter_mut().zip(self.read_data.drain(..count)) {
            *dst = src;
        }
        count
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        self.calls.push(Call::Event(event));
        let start = matches!(event, TargetEvent::StartSend | TargetEvent::StartRecv);
        if start && self.refuse_start {
            return Err(Error::AddressNack);
        }
        Ok(())
    }

    fn handle_ccc_read(&mut self, _ccc: CccCursor, _buf: &mut [u8]) -> Result<usize, Error> {
        Err(Error::DataNack)
    }

    fn handle_ccc_write(&mut self, _ccc: CccCursor, _data: &[u8]) -> Result<(), Error> {
        if self.refuse_ccc {
            return Err(Error::DataNack);
        }
        Ok(())
    }

    fn is_legacy_i2c(&self) -> bool {
        self.legacy
    }

    fn take_ibi(&mut self) -> Option<IbiRequest> {
        self.pending_ibi.take()
    }

    fn ibi_done(&mut self, outcome: IbiOutcome) {
        self.ibi_outcomes.push(outcome);
    }
}

/// Console the functional suites print their progress to.
#[derive(Default)]
pub struct Console {
    pub text: String,
}

impl embedded_io::ErrorType for Console {
    type Error = core::convert::Infallible;
}

impl embedded_io::Write for Console {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.text.push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Logger that keeps every line, shared between clones.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    pub lines: Rc<RefCell<Vec<String>>>,
}

impl RecordingLogger {
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|line| line.strip_prefix("error: ").map(String::from))
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.lines.borrow_mut().push(std::format!("debug: {args}"));
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.lines.borrow_mut().push(std::format!("error: {args}"));
    }
}
