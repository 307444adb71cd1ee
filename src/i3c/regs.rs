// Licensed under the Apache-2.0 license

//! Register fields, reset values and the interrupt block shared by the
//! controller and its target-mode mirror.

use crate::i3c::descriptor::register_word;

pub mod device_ctrl {
    pub const BROADCAST_ADDR_INC: u32 = 1 << 0;
    pub const HOT_JOIN_ACK_NACK_CTRL: u32 = 1 << 8;
    pub const ABORT: u32 = 1 << 29;
    pub const RESUME: u32 = 1 << 30;
    pub const ENABLE: u32 = 1 << 31;
}

pub mod intr {
    pub const TX_THLD: u32 = 1 << 0;
    pub const RX_THLD: u32 = 1 << 1;
    pub const IBI_THLD: u32 = 1 << 2;
    pub const CMD_QUEUE_RDY: u32 = 1 << 3;
    pub const RESP_RDY: u32 = 1 << 4;
    pub const TRANSFER_ABORT: u32 = 1 << 5;
    pub const CCC_UPDATED: u32 = 1 << 6;
    pub const DYN_ADDR_ASSGN: u32 = 1 << 8;
    pub const TRANSFER_ERR: u32 = 1 << 9;
    pub const DEFSLV: u32 = 1 << 10;
    pub const READ_REQ_RECV: u32 = 1 << 11;
    pub const IBI_UPDATED: u32 = 1 << 12;
    pub const BUSOWNER_UPDATED: u32 = 1 << 13;
    /// Bits software may clear by writing 1.
    pub const W1C_MASK: u32 = 0x3fe0;
}

pub mod ibi_queue_ctrl {
    pub const NOTIFY_REJECTED_HOT_JOIN: u32 = 1 << 0;
    pub const NOTIFY_REJECTED_MASTER_REQ: u32 = 1 << 1;
    pub const NOTIFY_REJECTED_SLAVE_IRQ: u32 = 1 << 3;
}

pub mod reset_ctrl {
    pub const CORE: u32 = 1 << 0;
    pub const CMD_QUEUE: u32 = 1 << 1;
    pub const RESP_QUEUE: u32 = 1 << 2;
    pub const TX_BUF: u32 = 1 << 3;
    pub const RX_BUF: u32 = 1 << 4;
    pub const IBI_QUEUE: u32 = 1 << 5;
}

pub mod slv_event_ctrl {
    pub const SIR_EN: u32 = 1 << 0;
    pub const MR_EN: u32 = 1 << 1;
    pub const HJ_EN: u32 = 1 << 3;
    pub const MRL_UPDATED: u32 = 1 << 6;
    pub const MWL_UPDATED: u32 = 1 << 7;
    /// Event-enable bits touched by ENEC/DISEC.
    pub const EVENT_MASK: u32 = 0xf;
}

pub const QUEUE_THLD_CTRL_RESET: u32 = 0x0100_0101;
pub const DATA_BUFFER_THLD_CTRL_RESET: u32 = 0x0101_0100;
pub const SLV_EVENT_CTRL_RESET: u32 = 0x0b;
pub const SLV_MAX_LEN_RESET: u32 = 0x00ff_00ff;
pub const SLV_CHAR_CTRL_RESET: u32 = 0x0001_0000;
pub const HW_CAPABILITY_RESET: u32 = 0x000e_00b8;
/// SCL and SDA idle high.
pub const PRESENT_STATE_RESET: u32 = 0x0000_0003;

register_word! {
    HwCapability {
        role: [0; 3],
    }
    flags {
        hdr_ddr: 3,
        hdr_ts: 4,
    }
}

register_word! {
    QueueThldCtrl {
        cmd_empty: [0; 8],
        resp: [8; 8],
        ibi_data: [16; 8],
        ibi_status: [24; 8],
    }
    flags {}
}

register_word! {
    DataBufferThldCtrl {
        tx: [0; 3],
        rx: [10; 3],
        tx_start: [16; 3],
        rx_start: [24; 3],
    }
    flags {}
}

register_word! {
    DeviceAddr {
        static_address: [0; 7],
        dynamic_address: [16; 7],
    }
    flags {
        static_valid: 15,
        dynamic_valid: 31,
    }
}

register_word! {
    SlvMaxLen {
        mwl: [0; 16],
        mrl: [16; 16],
    }
    flags {}
}

register_word! {
    MaxDataSpeed {
        max_wr: [0; 3],
        max_rd: [8; 3],
        turnaround: [16; 3],
    }
    flags {}
}

register_word! {
    SlvCharCtrl {
        hdr_cap: [16; 8],
    }
    flags {}
}

register_word! {
    QueueStatusLevel {
        cmd_empty_loc: [0; 8],
        resp_blr: [8; 8],
        ibi_blr: [16; 8],
        ibi_status_cnt: [24; 5],
    }
    flags {}
}

register_word! {
    DataBufferStatusLevel {
        tx_empty_loc: [0; 8],
        rx_blr: [16; 8],
    }
    flags {}
}

register_word! {
    PresentState {
        transfer_status: [8; 6],
        transfer_state: [16; 6],
        cmd_tid: [24; 4],
    }
    flags {}
}

/// Controller transfer state machine, reported in PRESENT_STATE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferState {
    Idle = 0x00,
    Start = 0x01,
    Restart = 0x02,
    Stop = 0x03,
    StartHold = 0x04,
    BroadcastWrite = 0x05,
    BroadcastRead = 0x06,
    Daa = 0x07,
    DaaGen = 0x08,
    CccByte = 0x0b,
    HdrCmd = 0x0c,
    Write = 0x0d,
    Read = 0x0e,
    IbiRead = 0x0f,
    IbiDisable = 0x10,
    HdrDdrCrc = 0x11,
    ClockStretch = 0x12,
    Halt = 0x13,
}

/// Kind of transfer in progress, reported in PRESENT_STATE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferStatus {
    Idle = 0x0,
    BroadcastCcc = 0x1,
    DirectCccWrite = 0x2,
    DirectCccRead = 0x3,
    Entdaa = 0x4,
    Setdasa = 0x5,
    I3cSdrWrite = 0x6,
    I3cSdrRead = 0x7,
    I2cSdrWrite = 0x8,
    I2cSdrRead = 0x9,
    HdrTsWrite = 0xa,
    HdrTsRead = 0xb,
    HdrDdrWrite = 0xc,
    HdrDdrRead = 0xd,
    Ibi = 0xe,
    Halt = 0xf,
}

impl TransferStatus {
    /// Status reported while a transfer command runs.
    #[must_use]
    pub const fn for_transfer(ccc: Option<u8>, read: bool, legacy: bool) -> Self {
        match (ccc, read, legacy) {
            (Some(code), false, _) if code & 0x80 != 0 => Self::DirectCccWrite,
            (Some(code), true, _) if code & 0x80 != 0 => Self::DirectCccRead,
            (Some(_), _, _) => Self::BroadcastCcc,
            (None, false, true) => Self::I2cSdrWrite,
            (None, true, true) => Self::I2cSdrRead,
            (None, false, false) => Self::I3cSdrWrite,
            (None, true, false) => Self::I3cSdrRead,
        }
    }
}

/// INTR_STATUS with its enable, signal and force companions.
#[derive(Clone, Copy, Debug, Default)]
pub struct InterruptRegs {
    status: u32,
    status_en: u32,
    signal_en: u32,
}

impl InterruptRegs {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: 0,
            status_en: 0,
            signal_en: 0,
        }
    }

    /// INTR_STATUS as software reads it, masked by INTR_STATUS_EN.
    #[must_use]
    pub const fn status(&self) -> u32 {
        self.status & self.status_en
    }

    #[must_use]
    pub const fn raw_status(&self) -> u32 {
        self.status
    }

    #[must_use]
    pub const fn is_set(&self, bits: u32) -> bool {
        self.status & bits == bits
    }

    pub fn set(&mut self, bits: u32) {
        self.status |= bits;
    }

    pub fn clear(&mut self, bits: u32) {
        self.status &= !bits;
    }

    pub fn assign(&mut self, bits: u32, level: bool) {
        if level {
            self.set(bits);
        } else {
            self.clear(bits);
        }
    }

    pub fn write_status(&mut self, value: u32) {
        self.status &= !(value & intr::W1C_MASK);
    }

    pub fn write_status_en(&mut self, value: u32) {
        self.status_en = value;
    }

    #[must_use]
    pub const fn status_en(&self) -> u32 {
        self.status_en
    }

    pub fn write_signal_en(&mut self, value: u32) {
        self.signal_en = value;
    }

    #[must_use]
    pub const fn signal_en(&self) -> u32 {
        self.signal_en
    }

    /// INTR_FORCE overwrites the raw status.
    pub fn force(&mut self, value: u32) {
        self.status = value;
    }

    /// Level of the interrupt line.
    #[must_use]
    pub const fn irq_level(&self) -> bool {
        self.status & self.signal_en != 0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
