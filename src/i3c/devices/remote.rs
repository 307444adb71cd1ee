// Licensed under the Apache-2.0 license

//! Target proxied over a byte link.
//!
//! Every callback is forwarded to a peer on the other end of an
//! `embedded_io` stream, which implements the device. Controller writes
//! are buffered and leave as one frame (opcode, LE u32 length, payload)
//! before the next bus event, before a synchronous read, or when the kind
//! of write changes. Reads are synchronous: the request goes out and the
//! reply (LE u32 length, payload) is awaited.
//!
//! Outside a request the peer may only send transfer acknowledgements and
//! IBI frames (opcode, address, RnW, LE u32 length, payload). These are
//! collected by [`RemoteTarget::poll_link`], which the IBI gate triggers
//! through [`TargetDevice::take_ibi`].

use crate::common::{Logger, NoOpLogger};
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, IbiOutcome, IbiRequest, TargetCore, TargetDevice};
use embedded_io::{Read, ReadReady, Write};
use heapless::{Deque, Vec};
use zerocopy::little_endian::U32;
use zerocopy::{Immutable, IntoBytes, KnownLayout, Unaligned};

/// Bytes of controller writes buffered before a frame must go out.
pub const REMOTE_BUFFER_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RemoteOpcode {
    StartRecv = 1,
    StartSend = 2,
    Stop = 3,
    Nack = 4,
    Recv = 5,
    Send = 6,
    CccWrite = 7,
    CccRead = 8,
    Ibi = 9,
}

impl From<TargetEvent> for RemoteOpcode {
    fn from(event: TargetEvent) -> Self {
        match event {
            TargetEvent::StartSend => Self::StartSend,
            TargetEvent::StartRecv => Self::StartRecv,
            TargetEvent::Stop => Self::Stop,
            TargetEvent::Nack => Self::Nack,
        }
    }
}

/// Single-byte answers exchanged outside a request.
pub mod reply {
    pub const RX_ACK: u8 = 0x00;
    pub const RX_NACK: u8 = 0x01;
    pub const IBI_ACK: u8 = 0xc0;
    pub const IBI_NACK: u8 = 0xc1;
    pub const IBI_DATA_NACK: u8 = 0xc2;
}

/// Opcode plus payload length, as it appears on the link.
#[repr(C)]
#[derive(IntoBytes, Immutable, KnownLayout, Unaligned, Clone, Copy, Debug)]
pub struct FrameHeader {
    pub opcode: u8,
    pub len: U32,
}

impl FrameHeader {
    #[must_use]
    pub fn new(opcode: RemoteOpcode, len: usize) -> Self {
        Self {
            opcode: opcode as u8,
            len: U32::new(u32::try_from(len).unwrap_or(u32::MAX)),
        }
    }
}

/// Transport a remote target talks over.
pub trait RemoteLink: Read + Write + ReadReady {}

impl<T: Read + Write + ReadReady> RemoteLink for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IbiRxState {
    Idle,
    Address,
    Rnw,
    Length,
    Data,
}

struct IbiFrame {
    request: IbiRequest,
    len: [u8; 4],
    len_bytes: usize,
    expected: usize,
    received: usize,
    overflow: bool,
}

impl IbiFrame {
    const fn new() -> Self {
        Self {
            request: IbiRequest::new(0, false),
            len: [0; 4],
            len_bytes: 0,
            expected: 0,
            received: 0,
            overflow: false,
        }
    }
}

pub struct RemoteTarget<T: RemoteLink, L: Logger = NoOpLogger> {
    core: TargetCore,
    link: T,
    name: &'static str,
    tx: Vec<u8, REMOTE_BUFFER_SIZE>,
    tx_kind: RemoteOpcode,
    ibi_rx: IbiRxState,
    ibi_frame: IbiFrame,
    pending_ibi: Option<IbiRequest>,
    logger: L,
}

impl<T: RemoteLink> RemoteTarget<T, NoOpLogger> {
    pub fn with_link(core: TargetCore, link: T, name: &'static str) -> Self {
        Self::new(core, link, name, NoOpLogger {})
    }
}

impl<T: RemoteLink, L: Logger> RemoteTarget<T, L> {
    pub fn new(core: TargetCore, link: T, name: &'static str, logger: L) -> Self {
        Self {
            core,
            link,
            name,
            tx: Vec::new(),
            tx_kind: RemoteOpcode::Send,
            ibi_rx: IbiRxState::Idle,
            ibi_frame: IbiFrame::new(),
            pending_ibi: None,
            logger,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn link(&self) -> &T {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    /// Bytes of controller writes not yet sent to the peer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.tx.len()
    }

    /// Consume unprompted input from the peer until an IBI is complete or
    /// the link runs dry.
    pub fn poll_link(&mut self) {
        while self.pending_ibi.is_none() {
            match self.link.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    self.logger
                        .error(format_args!("remote-i3c {}: link poll failed", self.name));
                    break;
                }
            }
            let mut byte = [0u8; 1];
            match self.link.read(&mut byte) {
                Ok(1) => {}
                Ok(_) => break,
                Err(_) => {
                    self.logger
                        .error(format_args!("remote-i3c {}: link read failed", self.name));
                    break;
                }
            }
            let [byte] = byte;
            self.rx_byte(byte);
        }
    }

    fn rx_byte(&mut self, byte: u8) {
        match self.ibi_rx {
            IbiRxState::Idle => match byte {
                reply::RX_ACK => {}
                reply::RX_NACK => self
                    .logger
                    .error(format_args!("remote-i3c {}: peer nacked a transfer", self.name)),
                code if code == RemoteOpcode::Ibi as u8 => {
                    self.ibi_frame = IbiFrame::new();
                    self.ibi_rx = IbiRxState::Address;
                }
                other => self.logger.error(format_args!(
                    "remote-i3c {}: unknown response 0x{other:02x}",
                    self.name
                )),
            },
            IbiRxState::Address => {
                self.ibi_frame.request.address = byte;
                self.ibi_rx = IbiRxState::Rnw;
            }
            IbiRxState::Rnw => {
                self.ibi_frame.request.is_recv = byte != 0;
                self.ibi_rx = IbiRxState::Length;
            }
            IbiRxState::Length => {
                let frame = &mut self.ibi_frame;
                if let Some(slot) = frame.len.get_mut(frame.len_bytes) {
                    *slot = byte;
                }
                frame.len_bytes += 1;
                if frame.len_bytes == frame.len.len() {
                    frame.expected = u32::from_le_bytes(frame.len) as usize;
                    if frame.expected == 0 {
                        self.complete_ibi();
                    } else {
                        self.ibi_rx = IbiRxState::Data;
                    }
                }
            }
            IbiRxState::Data => {
                let frame = &mut self.ibi_frame;
                if frame.request.payload.push(byte).is_err() {
                    frame.overflow = true;
                }
                frame.received += 1;
                if frame.received == frame.expected {
                    self.complete_ibi();
                }
            }
        }
    }

    fn complete_ibi(&mut self) {
        self.ibi_rx = IbiRxState::Idle;
        let frame = core::mem::replace(&mut self.ibi_frame, IbiFrame::new());
        self.logger.debug(format_args!(
            "remote-i3c {}: ibi from 0x{:02x}, {} bytes",
            self.name, frame.request.address, frame.expected
        ));
        if frame.overflow {
            self.logger
                .error(format_args!("remote-i3c {}: ibi payload too long", self.name));
            let _ = self.write_link(&[reply::IBI_NACK]);
            return;
        }
        self.pending_ibi = Some(frame.request);
    }

    fn write_link(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.link.write_all(bytes).is_err() {
            self.logger
                .error(format_args!("remote-i3c {}: link write failed", self.name));
            return Err(Error::Link);
        }
        Ok(())
    }

    fn read_link(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        if self.link.read_exact(buf).is_err() {
            self.logger
                .error(format_args!("remote-i3c {}: link read failed", self.name));
            return Err(Error::Link);
        }
        Ok(())
    }

    fn flush_tx(&mut self) -> Result<(), Error> {
        if self.tx.is_empty() {
            return Ok(());
        }
        let header = FrameHeader::new(self.tx_kind, self.tx.len());
        self.logger.debug(format_args!(
            "remote-i3c {}: {:?} {} bytes",
            self.name,
            self.tx_kind,
            self.tx.len()
        ));
        let result = match self.link.write_all(header.as_bytes()) {
            Ok(()) => self.link.write_all(&self.tx).map_err(|_| Error::Link),
            Err(_) => Err(Error::Link),
        };
        self.tx.clear();
        if result.is_err() {
            self.logger
                .error(format_args!("remote-i3c {}: link write failed", self.name));
        }
        result
    }

    fn push_tx(&mut self, kind: RemoteOpcode, data: &[u8]) -> Result<usize, Error> {
        if self.tx_kind != kind {
            self.flush_tx()?;
            self.tx_kind = kind;
        }
        let free = self.tx.capacity() - self.tx.len();
        let count = data.len().min(free);
        if let Some(accepted) = data.get(..count) {
            let _ = self.tx.extend_from_slice(accepted);
        }
        if count < data.len() {
            self.logger
                .error(format_args!("remote-i3c {}: tx buffer full", self.name));
            return Err(Error::DataNack);
        }
        Ok(count)
    }

    /// Read a length-prefixed reply into `buf`; surplus bytes are dropped.
    fn read_reply(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut len = [0u8; 4];
        self.read_link(&mut len)?;
        let len = u32::from_le_bytes(len) as usize;
        let take = len.min(buf.len());
        if let Some(dst) = buf.get_mut(..take) {
            self.read_link(dst)?;
        }
        let mut surplus = [0u8; 1];
        for _ in take..len {
            self.read_link(&mut surplus)?;
        }
        Ok(take)
    }

    fn request_read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.flush_tx()?;
        let header = FrameHeader::new(RemoteOpcode::Recv, buf.len());
        self.write_link(header.as_bytes())?;
        self.read_reply(buf)
    }
}

impl<T: RemoteLink, L: Logger> TargetDevice for RemoteTarget<T, L> {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.push_tx(RemoteOpcode::Send, data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        self.request_read(buf).unwrap_or(0)
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        self.flush_tx()?;
        self.write_link(&[RemoteOpcode::from(event) as u8])
    }

    fn handle_ccc_read(&mut self, _ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error> {
        self.flush_tx()?;
        self.write_link(&[RemoteOpcode::CccRead as u8])?;
        self.read_reply(buf)
    }

    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error> {
        // The peer sees the opcode as the first byte of the CCC frame.
        let opcode = [ccc.code()];
        let bytes = if data.is_empty() { &opcode[..] } else { data };
        self.push_tx(RemoteOpcode::CccWrite, bytes).map(|_| ())
    }

    fn take_ibi(&mut self) -> Option<IbiRequest> {
        self.poll_link();
        self.pending_ibi.take()
    }

    fn ibi_done(&mut self, outcome: IbiOutcome) {
        let answer = match outcome {
            IbiOutcome::Acked => reply::IBI_ACK,
            IbiOutcome::Nacked => reply::IBI_NACK,
            IbiOutcome::DataNacked => reply::IBI_DATA_NACK,
        };
        let _ = self.write_link(&[answer]);
    }
}

pub const BUFFER_LINK_SIZE: usize = 1024;

/// In-memory link: the test side queues what the peer "sends" and reads
/// back what the target wrote.
#[derive(Default)]
pub struct BufferLink {
    inbound: Deque<u8, BUFFER_LINK_SIZE>,
    outbound: Vec<u8, BUFFER_LINK_SIZE>,
}

impl BufferLink {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inbound: Deque::new(),
            outbound: Vec::new(),
        }
    }

    /// Queue bytes as if the peer had sent them. Returns how many fit.
    pub fn push_inbound(&mut self, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .take_while(|&&byte| self.inbound.push_back(byte).is_ok())
            .count()
    }

    #[must_use]
    pub fn outbound(&self) -> &[u8] {
        &self.outbound
    }

    pub fn clear_outbound(&mut self) {
        self.outbound.clear();
    }
}

impl embedded_io::ErrorType for BufferLink {
    type Error = embedded_io::ErrorKind;
}

impl Read for BufferLink {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;
        for slot in buf.iter_mut() {
            let Some(byte) = self.inbound.pop_front() else {
                break;
            };
            *slot = byte;
            count += 1;
        }
        Ok(count)
    }
}

impl ReadReady for BufferLink {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inbound.is_empty())
    }
}

impl Write for BufferLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let free = self.outbound.capacity() - self.outbound.len();
        let count = buf.len().min(free);
        if let Some(accepted) = buf.get(..count) {
            let _ = self.outbound.extend_from_slice(accepted);
        }
        Ok(count)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i3c::bus::Bus;
    use crate::i3c::ccc;
    use crate::i3c::common::{Direction, BROADCAST_ADDR};
    use crate::i3c::ibi::NackAllIbis;
    use hex_literal::hex;

    const ADDR: u8 = 0x30;

    fn bus() -> Bus<RemoteTarget<BufferLink>> {
        let mut bus = Bus::default();
        let core = TargetCore::new(ADDR, 0x0000_1234_5678, 0x06, 0x00);
        bus.register(RemoteTarget::with_link(core, BufferLink::new(), "peer"))
            .unwrap();
        bus
    }

    fn link(bus: &mut Bus<RemoteTarget<BufferLink>>) -> &mut BufferLink {
        bus.device_mut(0).unwrap().link_mut()
    }

    #[test]
    fn start_opcodes_follow_controller_direction() {
        assert_eq!(
            RemoteOpcode::from(Direction::Write.target_event()) as u8,
            2
        );
        assert_eq!(RemoteOpcode::from(Direction::Read.target_event()) as u8, 1);

        // A write right after a read opens with START_SEND again.
        let mut bus = bus();
        link(&mut bus).push_inbound(&hex!("01000000 5a"));
        bus.start_transfer(ADDR, Direction::Read).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(bus.recv(&mut buf), Ok(1));
        bus.start_transfer(ADDR, Direction::Write).unwrap();
        bus.send(&[0x10]).unwrap();
        bus.end_transfer();
        assert_eq!(
            link(&mut bus).outbound(),
            hex!("01 05 01000000 02 06 01000000 10 03")
        );
    }

    #[test]
    fn private_write_is_framed_before_stop() {
        let mut bus = bus();
        bus.start_transfer(ADDR, Direction::Write).unwrap();
        for byte in [0xaa, 0xbb, 0xcc] {
            bus.send(&[byte]).unwrap();
        }
        assert_eq!(bus.device(0).unwrap().buffered(), 3);
        bus.end_transfer();
        assert_eq!(
            link(&mut bus).outbound(),
            hex!("02 06 03000000 aabbcc 03")
        );
    }

    #[test]
    fn private_read_requests_count_and_takes_reply() {
        let mut bus = bus();
        link(&mut bus).push_inbound(&hex!("02000000 1122"));
        bus.start_transfer(ADDR, Direction::Read).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(bus.recv(&mut buf), Ok(2));
        assert_eq!(buf, [0x11, 0x22, 0xff, 0xff]);
        bus.end_transfer();
        assert_eq!(link(&mut bus).outbound(), hex!("01 05 04000000 03"));
    }

    #[test]
    fn oversized_reply_is_drained() {
        let mut bus = bus();
        link(&mut bus).push_inbound(&hex!("03000000 112233 00"));
        bus.start_transfer(ADDR, Direction::Read).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(bus.recv(&mut buf), Ok(1));
        bus.end_transfer();
        // Only the trailing acknowledgement is left over.
        let target = bus.device_mut(0).unwrap();
        target.poll_link();
        assert!(!target.link_mut().read_ready().unwrap());
    }

    #[test]
    fn broadcast_ccc_carries_opcode_and_payload() {
        let mut bus = bus();
        bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
        bus.send(&[ccc::ENEC]).unwrap();
        bus.send(&[ccc::events::INT]).unwrap();
        bus.end_transfer();
        assert_eq!(
            link(&mut bus).outbound(),
            hex!("02 07 02000000 0001 03")
        );
    }

    #[test]
    fn direct_ccc_read_is_forwarded() {
        let mut bus = bus();
        bus.start_transfer(BROADCAST_ADDR, Direction::Write).unwrap();
        bus.send(&[ccc::GETMXDS]).unwrap();
        link(&mut bus).push_inbound(&hex!("02000000 0000"));
        bus.start_transfer(ADDR, Direction::Read).unwrap();
        let mut buf = [0xffu8; 2];
        assert_eq!(bus.recv(&mut buf), Ok(2));
        assert_eq!(buf, [0, 0]);
        bus.end_transfer();
        assert_eq!(
            link(&mut bus).outbound(),
            hex!("02 07 01000000 94 01 08 03")
        );
    }

    #[test]
    fn ibi_frame_is_raised_and_answered() {
        let mut bus = bus();
        link(&mut bus).push_inbound(&hex!("09 30 01 02000000 dead"));
        assert_eq!(bus.service_ibis(&mut NackAllIbis), 1);
        assert_eq!(link(&mut bus).outbound(), [reply::IBI_NACK]);
    }

    #[test]
    fn dead_link_reads_nothing() {
        let mut bus = bus();
        bus.start_transfer(ADDR, Direction::Read).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(bus.recv(&mut buf), Ok(0));
        bus.end_transfer();
    }
}
