// Licensed under the Apache-2.0 license

//! 6-axis IMU (accelerometer + gyroscope) with an I3C interface.
//!
//! The register file is addressed the usual way for this class of sensor:
//! the first byte of a write selects the register, later bytes are stored
//! from there on. With `CTRL3_C.IF_INC` set the register pointer advances
//! after every access. Reading `FIFO_DATA_OUT_TAG` cycles through the gyro,
//! accelerometer and temperature samples and moves the pointer to the
//! selected output block.

use crate::i3c::ccc;
use crate::i3c::common::TargetEvent;
use crate::i3c::error::Error;
use crate::i3c::target::{CccCursor, TargetCore, TargetDevice};

pub const SENSOR_PID: u64 = 0x0b10_6c00_0802;
pub const SENSOR_BCR: u8 = 0x07;
pub const SENSOR_DCR: u8 = 0x44;

pub mod reg {
    pub const WHO_AM_I: u8 = 0x0f;
    pub const CTRL3_C: u8 = 0x12;
    pub const OUT_TEMP_L: u8 = 0x20;
    pub const OUTX_L_G: u8 = 0x22;
    pub const OUTX_L_A: u8 = 0x28;
    pub const FIFO_DATA_OUT_TAG: u8 = 0x78;
    pub const FIFO_DATA_OUT_X_L: u8 = 0x79;
    pub const FIFO_DATA_OUT_Z_H: u8 = 0x7e;
    /// Size of the register file.
    pub const COUNT: usize = FIFO_DATA_OUT_Z_H as usize + 1;
}

pub const WHO_AM_I_VALUE: u8 = 0x6c;
/// Register address auto-increment.
pub const CTRL3_C_IF_INC: u8 = 1 << 2;

const GYRO_SEED: [u8; 6] = [0x2c, 0xa4, 0x2c, 0xa4, 0x2c, 0xa4];
const ACCEL_SEED: [u8; 6] = [0x40, 0x09, 0x40, 0x09, 0x40, 0x09];

/// Sample kind reported by `FIFO_DATA_OUT_TAG`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FifoTag {
    Gyro = 1,
    Accel = 2,
    Temperature = 3,
}

impl FifoTag {
    #[must_use]
    pub const fn next(tag: Option<Self>) -> Self {
        match tag {
            None | Some(Self::Temperature) => Self::Gyro,
            Some(Self::Gyro) => Self::Accel,
            Some(Self::Accel) => Self::Temperature,
        }
    }

    /// First register of the output block holding this sample.
    #[must_use]
    pub const fn block(self) -> u8 {
        match self {
            Self::Gyro => reg::OUTX_L_G,
            Self::Accel => reg::OUTX_L_A,
            Self::Temperature => reg::OUT_TEMP_L,
        }
    }
}

pub struct SensorTarget {
    core: TargetCore,
    regs: [u8; reg::COUNT],
    sub_addr: u8,
    addressed: bool,
    fifo_tag: Option<FifoTag>,
    mwl: u16,
    mrl: u16,
    status: u16,
    event_ctrl: u8,
}

impl SensorTarget {
    #[must_use]
    pub fn new(static_address: u8) -> Self {
        let mut regs = [0u8; reg::COUNT];
        seed(&mut regs, reg::WHO_AM_I, &[WHO_AM_I_VALUE]);
        seed(&mut regs, reg::CTRL3_C, &[CTRL3_C_IF_INC]);
        seed(&mut regs, reg::OUTX_L_G, &GYRO_SEED);
        seed(&mut regs, reg::OUTX_L_A, &ACCEL_SEED);
        Self {
            core: TargetCore::new(static_address, SENSOR_PID, SENSOR_BCR, SENSOR_DCR),
            regs,
            sub_addr: 0,
            addressed: false,
            fifo_tag: None,
            mwl: 0,
            mrl: 0,
            status: 0,
            event_ctrl: 0,
        }
    }

    #[must_use]
    pub fn register(&self, address: u8) -> Option<u8> {
        self.regs.get(usize::from(address)).copied()
    }

    pub fn set_register(&mut self, address: u8, value: u8) {
        if let Some(slot) = self.regs.get_mut(usize::from(address)) {
            *slot = value;
        }
    }

    #[must_use]
    pub const fn max_write_len(&self) -> u16 {
        self.mwl
    }

    #[must_use]
    pub const fn max_read_len(&self) -> u16 {
        self.mrl
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Event enables as last written by ENEC/DISEC.
    #[must_use]
    pub const fn event_ctrl(&self) -> u8 {
        self.event_ctrl
    }

    fn auto_increment(&self) -> bool {
        self.register(reg::CTRL3_C)
            .is_some_and(|ctrl| ctrl & CTRL3_C_IF_INC != 0)
    }

    fn advance(&mut self) {
        if self.auto_increment() {
            self.sub_addr = self.sub_addr.wrapping_add(1);
        }
    }

    fn read_one(&mut self) -> u8 {
        match self.sub_addr {
            reg::FIFO_DATA_OUT_TAG => {
                let tag = FifoTag::next(self.fifo_tag);
                self.fifo_tag = Some(tag);
                self.sub_addr = tag.block();
                (tag as u8) << 3
            }
            reg::FIFO_DATA_OUT_X_L..=reg::FIFO_DATA_OUT_Z_H => {
                let value = match self.fifo_tag {
                    Some(tag) => self
                        .register(tag.block() + (self.sub_addr - reg::FIFO_DATA_OUT_X_L))
                        .unwrap_or(0),
                    None => self.register(self.sub_addr).unwrap_or(0),
                };
                self.advance();
                value
            }
            address => {
                let value = self.register(address).unwrap_or(0);
                self.advance();
                value
            }
        }
    }
}

fn seed(regs: &mut [u8], start: u8, values: &[u8]) {
    if let Some(window) = regs.get_mut(usize::from(start)..) {
        for (dst, &src) in window.iter_mut().zip(values) {
            *dst = src;
        }
    }
}

/// Copy the big-endian bytes of `value` from `offset` on into `buf`.
fn reply_be(value: u16, offset: usize, buf: &mut [u8]) -> usize {
    let bytes = value.to_be_bytes();
    let pending = bytes.get(offset..).unwrap_or(&[]);
    let count = pending.len().min(buf.len());
    for (dst, &src) in buf.iter_mut().zip(pending) {
        *dst = src;
    }
    count
}

fn merge_be(current: u16, offset: usize, byte: u8) -> u16 {
    match offset {
        0 => (current & 0x00ff) | (u16::from(byte) << 8),
        1 => (current & 0xff00) | u16::from(byte),
        _ => current,
    }
}

impl TargetDevice for SensorTarget {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TargetCore {
        &mut self.core
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        let mut bytes = data.iter();
        if !self.addressed {
            let Some(&sub_addr) = bytes.next() else {
                return Ok(0);
            };
            self.sub_addr = sub_addr;
            self.addressed = true;
        }
        for &byte in bytes {
            let address = self.sub_addr;
            self.set_register(address, byte);
            self.advance();
        }
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> usize {
        for byte in buf.iter_mut() {
            *byte = self.read_one();
        }
        buf.len()
    }

    fn event(&mut self, event: TargetEvent) -> Result<(), Error> {
        if matches!(event, TargetEvent::StartSend | TargetEvent::Stop) {
            self.addressed = false;
        }
        Ok(())
    }

    fn handle_ccc_read(&mut self, ccc: CccCursor, buf: &mut [u8]) -> Result<usize, Error> {
        let value = match ccc.code() {
            ccc::GETMWL => self.mwl,
            ccc::GETMRL => self.mrl,
            ccc::GETSTATUS => self.status,
            ccc::GETMXDS | ccc::GETXTIME => return Ok(0),
            _ => return Err(Error::DataNack),
        };
        Ok(reply_be(value, ccc.byte_offset, buf))
    }

    fn handle_ccc_write(&mut self, ccc: CccCursor, data: &[u8]) -> Result<(), Error> {
        for (offset, &byte) in (ccc.byte_offset..).zip(data) {
            match ccc.code() {
                ccc::ENEC | ccc::ENEC_DIRECT if offset == 0 => self.event_ctrl |= byte,
                ccc::DISEC | ccc::DISEC_DIRECT if offset == 0 => self.event_ctrl &= !(byte & 0x0f),
                ccc::SETMRL | ccc::SETMRL_DIRECT => self.mrl = merge_be(self.mrl, offset, byte),
                ccc::SETMWL | ccc::SETMWL_DIRECT => self.mwl = merge_be(self.mwl, offset, byte),
                _ => {}
            }
        }
        Ok(())
    }
}
