// Licensed under the Apache-2.0 license

//! Common types and constants for the I3C bus and controller models.

use fugit::HertzU32;

/// Address every I3C target answers during broadcast phases.
pub const BROADCAST_ADDR: u8 = 0x7e;
/// Address used by targets requesting to hot-join the bus.
pub const HOT_JOIN_ADDR: u8 = 0x02;
/// Bytes a target returns per ENTDAA round: PID (6), BCR, DCR.
pub const ENTDAA_RESPONSE_LEN: usize = 8;
/// Upper bound on targets registered on a single bus.
pub const MAX_TARGETS: usize = 16;

/// Addresses that may never be assigned to a target.
///
/// 0x7e is the broadcast address, the others are single-bit error patterns
/// of it that a target could confuse with a broadcast header.
pub const RESERVED_ADDRESSES: [u8; 10] = [0x00, 0x01, 0x02, 0x3e, 0x5e, 0x6e, 0x76, 0x7a, 0x7c, 0x7e];

#[must_use]
pub fn is_reserved_address(address: u8) -> bool {
    address > 0x7e || RESERVED_ADDRESSES.contains(&address)
}

/// Direction of a transfer from the controller's point of view.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Controller writes, target receives.
    Write,
    /// Controller reads, target transmits.
    Read,
}

impl Direction {
    #[must_use]
    pub const fn from_rnw(rnw: bool) -> Self {
        if rnw {
            Self::Read
        } else {
            Self::Write
        }
    }

    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    /// The event a selected target observes for this direction.
    #[must_use]
    pub const fn target_event(self) -> TargetEvent {
        match self {
            Self::Write => TargetEvent::StartSend,
            Self::Read => TargetEvent::StartRecv,
        }
    }
}

/// Bus conditions delivered to targets, named from the controller's side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TargetEvent {
    /// Addressed for a controller write; the target is about to receive.
    StartSend,
    /// Addressed for a controller read; the target is about to send.
    StartRecv,
    Stop,
    Nack,
}

/// Transfer speed encoded in the SPEED field of a transfer command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferSpeed {
    Sdr0,
    Sdr1,
    Sdr2,
    Sdr3,
    Sdr4,
    HdrTs,
    HdrDdr,
    I2cFm,
}

impl TransferSpeed {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0x7 {
            0 => Self::Sdr0,
            1 => Self::Sdr1,
            2 => Self::Sdr2,
            3 => Self::Sdr3,
            4 => Self::Sdr4,
            5 => Self::HdrTs,
            6 => Self::HdrDdr,
            _ => Self::I2cFm,
        }
    }

    #[must_use]
    pub const fn is_hdr(self) -> bool {
        matches!(self, Self::HdrTs | Self::HdrDdr)
    }

    /// Nominal SCL rate for the mode.
    #[must_use]
    pub const fn nominal_rate(self) -> HertzU32 {
        match self {
            Self::Sdr0 | Self::HdrTs | Self::HdrDdr => HertzU32::from_raw(12_500_000),
            Self::Sdr1 => HertzU32::from_raw(8_000_000),
            Self::Sdr2 => HertzU32::from_raw(6_000_000),
            Self::Sdr3 => HertzU32::from_raw(4_000_000),
            Self::Sdr4 => HertzU32::from_raw(2_000_000),
            Self::I2cFm => HertzU32::from_raw(400_000),
        }
    }
}

/// Role the controller block was instantiated with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DeviceRole {
    MasterOnly = 1,
    ProgMasterSlave = 2,
    SecondaryMaster = 3,
    SlaveOnly = 4,
}

impl DeviceRole {
    /// Only a pure controller starts draining the command queue on push.
    #[must_use]
    pub const fn drives_bus(self) -> bool {
        matches!(self, Self::MasterOnly)
    }

    #[must_use]
    pub const fn can_assign_addresses(self) -> bool {
        (self as u8) < (Self::SlaveOnly as u8)
    }
}

/// Maximum number of address-table slots a controller can carry.
pub const MAX_TABLE_DEPTH: usize = 32;

pub struct ControllerConfig {
    pub role: DeviceRole,
    pub num_devices: usize,
    pub hdr_ddr: bool,
    pub hdr_ts: bool,
    pub static_address: Option<u8>,
    pub max_write_len: u16,
    pub max_read_len: u16,
    pub push_pull_rate: HertzU32,
    pub open_drain_rate: HertzU32,
}

pub struct ControllerConfigBuilder {
    role: DeviceRole,
    num_devices: usize,
    hdr_ddr: bool,
    hdr_ts: bool,
    static_address: Option<u8>,
    max_write_len: u16,
    max_read_len: u16,
    push_pull_rate: HertzU32,
    open_drain_rate: HertzU32,
}

impl Default for ControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            role: DeviceRole::MasterOnly,
            num_devices: 8,
            hdr_ddr: true,
            hdr_ts: true,
            static_address: None,
            max_write_len: 0xff,
            max_read_len: 0xff,
            push_pull_rate: TransferSpeed::Sdr0.nominal_rate(),
            open_drain_rate: HertzU32::from_raw(1_000_000),
        }
    }
    #[must_use]
    pub fn role(mut self, role: DeviceRole) -> Self {
        self.role = role;
        self
    }
    #[must_use]
    pub fn num_devices(mut self, count: usize) -> Self {
        self.num_devices = count;
        self
    }
    #[must_use]
    pub fn hdr_ddr(mut self, supported: bool) -> Self {
        self.hdr_ddr = supported;
        self
    }
    #[must_use]
    pub fn hdr_ts(mut self, supported: bool) -> Self {
        self.hdr_ts = supported;
        self
    }
    #[must_use]
    pub fn static_address(mut self, address: u8) -> Self {
        self.static_address = Some(address);
        self
    }
    #[must_use]
    pub fn max_write_len(mut self, len: u16) -> Self {
        self.max_write_len = len;
        self
    }
    #[must_use]
    pub fn max_read_len(mut self, len: u16) -> Self {
        self.max_read_len = len;
        self
    }
    #[must_use]
    pub fn push_pull_rate(mut self, rate: HertzU32) -> Self {
        self.push_pull_rate = rate;
        self
    }
    #[must_use]
    pub fn open_drain_rate(mut self, rate: HertzU32) -> Self {
        self.open_drain_rate = rate;
        self
    }
    #[must_use]
    pub fn build(self) -> ControllerConfig {
        ControllerConfig {
            role: self.role,
            num_devices: self.num_devices.clamp(1, MAX_TABLE_DEPTH),
            hdr_ddr: self.hdr_ddr,
            hdr_ts: self.hdr_ts,
            static_address: self.static_address.filter(|addr| !is_reserved_address(*addr)),
            max_write_len: self.max_write_len,
            max_read_len: self.max_read_len,
            push_pull_rate: self.push_pull_rate,
            open_drain_rate: self.open_drain_rate,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfigBuilder::new().build()
    }
}
