// Licensed under the Apache-2.0 license

//! Error types for the I3C bus and controller models.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No target matched the address, or the matched target refused selection.
    AddressNack,
    /// A target refused a byte mid-transfer.
    DataNack,
    /// A target refused an ENTDAA round.
    DaaNack,
    QueueOverflow,
    QueueUnderflow,
    /// Malformed command stream.
    DecodeError,
    /// The request needs a capability the block was built without.
    Unsupported,
    InvalidSlot,
    TableFull,
    ReservedAddress,
    /// The transport behind a proxied target failed.
    Link,
}

impl Error {
    #[must_use]
    pub const fn is_nack(&self) -> bool {
        matches!(self, Self::AddressNack | Self::DataNack | Self::DaaNack)
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AddressNack | Self::DaaNack => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Self::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::QueueOverflow => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// Error codes reported in the ERR_STATUS field of a response descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseError {
    None = 0,
    Crc = 1,
    Parity = 2,
    Frame = 3,
    BroadcastNack = 4,
    DaaNack = 5,
    Overflow = 6,
    Aborted = 8,
    I2cNack = 9,
}

impl ResponseError {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::None),
            1 => Some(Self::Crc),
            2 => Some(Self::Parity),
            3 => Some(Self::Frame),
            4 => Some(Self::BroadcastNack),
            5 => Some(Self::DaaNack),
            6 => Some(Self::Overflow),
            8 => Some(Self::Aborted),
            9 => Some(Self::I2cNack),
            _ => None,
        }
    }
}
