// Licensed under the Apache-2.0 license

//! Bit-exact descriptor words exchanged between software and the queue engine.
//!
//! Every descriptor is a newtype over the raw `u32` so it can be written to
//! or read from a queue port unchanged. Field accessors and `with_*`
//! builders are generated by [`register_word!`].

use crate::i3c::error::Error;

/// Declares a `u32` newtype with typed field and flag accessors.
///
/// `field: [lsb; width]` yields `field()` returning the raw bits and
/// `with_field(value)` returning an updated copy. `flag: bit` yields a
/// `bool` getter and a `with_flag(bool)` builder.
macro_rules! register_word {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $field:ident : [$lsb:literal ; $width:literal] ),* $(,)?
        }
        flags { $( $flag:ident : $bit:literal ),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
        pub struct $name(pub u32);

        impl $name {
            #[must_use]
            pub const fn bits(self) -> u32 {
                self.0
            }

            $(
                #[must_use]
                pub const fn $field(self) -> u32 {
                    (self.0 >> $lsb) & ((1u32 << $width) - 1)
                }

                paste::paste! {
                    #[must_use]
                    pub const fn [<with_ $field>](self, value: u32) -> Self {
                        let mask = ((1u32 << $width) - 1) << $lsb;
                        Self((self.0 & !mask) | ((value << $lsb) & mask))
                    }
                }
            )*

            $(
                #[must_use]
                pub const fn $flag(self) -> bool {
                    self.0 & (1u32 << $bit) != 0
                }

                paste::paste! {
                    #[must_use]
                    pub const fn [<with_ $flag>](self, set: bool) -> Self {
                        if set {
                            Self(self.0 | (1u32 << $bit))
                        } else {
                            Self(self.0 & !(1u32 << $bit))
                        }
                    }
                }
            )*
        }

        impl From<u32> for $name {
            fn from(word: u32) -> Self {
                Self(word)
            }
        }

        impl From<$name> for u32 {
            fn from(word: $name) -> u32 {
                word.0
            }
        }
    };
}
pub(crate) use register_word;

/// Discriminant in bits [2:0] of every command-queue word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdAttr {
    TransferCommand = 0,
    TransferArgument = 1,
    ShortDataArgument = 2,
    AddressAssignCommand = 3,
}

impl CmdAttr {
    #[must_use]
    pub const fn of(word: u32) -> Option<Self> {
        match word & 0x7 {
            0 => Some(Self::TransferCommand),
            1 => Some(Self::TransferArgument),
            2 => Some(Self::ShortDataArgument),
            3 => Some(Self::AddressAssignCommand),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self, Self::TransferCommand | Self::AddressAssignCommand)
    }
}

register_word! {
    /// Regular transfer command: private transfer or CCC.
    TransferCommand {
        cmd_attr: [0; 3],
        tid: [3; 4],
        cmd: [7; 8],
        dev_index: [16; 5],
        speed: [21; 3],
    }
    flags {
        cp: 15,
        dbp: 25,
        roc: 26,
        sdap: 27,
        rnw: 28,
        toc: 30,
        pec: 31,
    }
}

register_word! {
    /// Argument carrying the payload length of the following transfer.
    TransferArgument {
        cmd_attr: [0; 3],
        db: [8; 8],
        data_len: [16; 16],
    }
    flags {}
}

register_word! {
    /// Argument carrying up to three immediate payload bytes.
    ShortDataArgument {
        cmd_attr: [0; 3],
        byte_strb: [3; 3],
        byte0: [8; 8],
        byte1: [16; 8],
        byte2: [24; 8],
    }
    flags {}
}

register_word! {
    /// ENTDAA driver command.
    AddressAssignCommand {
        cmd_attr: [0; 3],
        tid: [3; 4],
        cmd: [7; 8],
        dev_index: [16; 5],
        dev_count: [21; 3],
    }
    flags {
        roc: 26,
        toc: 30,
    }
}

register_word! {
    /// Completion record pushed to the response queue.
    ///
    /// `rx_rsp` is only produced in target mode and shares bit 27 with the
    /// top bit of `tid`.
    ResponseDescriptor {
        data_length: [0; 16],
        ccct: [16; 8],
        tid: [24; 4],
        err_status: [28; 4],
    }
    flags {
        rx_rsp: 27,
    }
}

register_word! {
    /// Status header preceding each IBI payload slice in the IBI queue.
    IbiStatus {
        data_length: [0; 8],
        ibi_id: [8; 8],
    }
    flags {
        last: 24,
        error: 30,
        nacked: 31,
    }
}

impl TransferCommand {
    #[must_use]
    pub const fn new() -> Self {
        Self(CmdAttr::TransferCommand as u32)
    }
}

impl TransferArgument {
    #[must_use]
    pub const fn new() -> Self {
        Self(CmdAttr::TransferArgument as u32)
    }
}

impl ShortDataArgument {
    #[must_use]
    pub const fn new() -> Self {
        Self(CmdAttr::ShortDataArgument as u32)
    }

    /// Payload bytes advertised by the byte strobe.
    #[must_use]
    pub const fn strobe_len(self) -> Option<u16> {
        match self.byte_strb() {
            0x7 => Some(3),
            0x3 => Some(2),
            0x1 => Some(1),
            0x0 => Some(0),
            _ => None,
        }
    }

    #[must_use]
    pub const fn byte(self, index: usize) -> u8 {
        let value = match index {
            0 => self.byte0(),
            1 => self.byte1(),
            2 => self.byte2(),
            _ => 0,
        };
        value as u8
    }
}

impl AddressAssignCommand {
    #[must_use]
    pub const fn new() -> Self {
        Self(CmdAttr::AddressAssignCommand as u32)
    }
}

impl IbiStatus {
    /// IBI_ID as seen on the bus: `address << 1 | rnw`.
    #[must_use]
    pub const fn for_request(address: u8, is_recv: bool) -> Self {
        Self(0).with_ibi_id(((address as u32) << 1) | is_recv as u32)
    }

    #[must_use]
    pub const fn address(self) -> u8 {
        (self.ibi_id() >> 1) as u8
    }
}

/// A decoded command-queue word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandDescriptor {
    Transfer(TransferCommand),
    Argument(TransferArgument),
    ShortData(ShortDataArgument),
    AddressAssign(AddressAssignCommand),
}

impl CommandDescriptor {
    /// Decode a raw command-queue word by its attribute field.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecodeError` for attribute values 4 through 7.
    pub fn decode(word: u32) -> Result<Self, Error> {
        match CmdAttr::of(word) {
            Some(CmdAttr::TransferCommand) => Ok(Self::Transfer(TransferCommand(word))),
            Some(CmdAttr::TransferArgument) => Ok(Self::Argument(TransferArgument(word))),
            Some(CmdAttr::ShortDataArgument) => Ok(Self::ShortData(ShortDataArgument(word))),
            Some(CmdAttr::AddressAssignCommand) => {
                Ok(Self::AddressAssign(AddressAssignCommand(word)))
            }
            None => Err(Error::DecodeError),
        }
    }

    #[must_use]
    pub const fn word(self) -> u32 {
        match self {
            Self::Transfer(cmd) => cmd.0,
            Self::Argument(arg) => arg.0,
            Self::ShortData(arg) => arg.0,
            Self::AddressAssign(cmd) => cmd.0,
        }
    }

    /// Bytes the command moves, as counted by the engine.
    #[must_use]
    pub fn payload_len(self) -> u16 {
        match self {
            Self::Argument(arg) => arg.data_len() as u16,
            Self::ShortData(arg) => arg.strobe_len().unwrap_or(0),
            Self::Transfer(_) | Self::AddressAssign(_) => 0,
        }
    }
}
