// Licensed under the Apache-2.0 license

//! Device address table and device characteristic table.
//!
//! The address table maps the DEV_INDEX of a command onto a target address
//! and its per-target IBI policy. The characteristic table records what each
//! target reported during ENTDAA.

use crate::i3c::common::{is_reserved_address, MAX_TABLE_DEPTH};
use crate::i3c::descriptor::register_word;
use crate::i3c::error::Error;

register_word! {
    /// One DEV_ADDR_TABLE_LOC word.
    AddressTableEntry {
        static_address: [0; 7],
        dynamic_address: [16; 8],
    }
    flags {
        ibi_pec_en: 11,
        ibi_with_data: 12,
        sir_reject: 13,
        mr_reject: 14,
        legacy_i2c: 31,
    }
}

impl AddressTableEntry {
    /// An I3C target reached by its dynamic address.
    #[must_use]
    pub const fn i3c(dynamic_address: u8) -> Self {
        Self(0).with_dynamic_address(dynamic_address as u32)
    }

    /// A legacy I2C target reached by its static address.
    #[must_use]
    pub const fn i2c(static_address: u8) -> Self {
        Self(0)
            .with_static_address(static_address as u32)
            .with_legacy_i2c(true)
    }

    /// Address driven on the bus for this slot.
    ///
    /// The dynamic field carries a parity bit in bit 7 which is not part of
    /// the address.
    #[must_use]
    pub const fn target_address(self) -> u8 {
        if self.legacy_i2c() {
            self.static_address() as u8
        } else {
            (self.dynamic_address() & 0x7f) as u8
        }
    }
}

pub struct AddressTable {
    entries: [AddressTableEntry; MAX_TABLE_DEPTH],
    depth: usize,
}

impl AddressTable {
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            entries: [AddressTableEntry(0); MAX_TABLE_DEPTH],
            depth: depth.clamp(1, MAX_TABLE_DEPTH),
        }
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn entry(&self, slot: usize) -> Option<AddressTableEntry> {
        if slot >= self.depth {
            return None;
        }
        self.entries.get(slot).copied()
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidSlot` for a slot beyond the configured depth.
    pub fn set_entry(&mut self, slot: usize, entry: AddressTableEntry) -> Result<(), Error> {
        if slot >= self.depth {
            return Err(Error::InvalidSlot);
        }
        let dst = self.entries.get_mut(slot).ok_or(Error::InvalidSlot)?;
        *dst = entry;
        Ok(())
    }

    /// Target address of a slot, 0 when the slot is out of range.
    #[must_use]
    pub fn target_address(&self, slot: usize) -> u8 {
        self.entry(slot).map_or(0, AddressTableEntry::target_address)
    }

    #[must_use]
    pub fn is_legacy_i2c(&self, slot: usize) -> bool {
        self.entry(slot).is_some_and(AddressTableEntry::legacy_i2c)
    }

    /// First slot whose target address matches.
    #[must_use]
    pub fn slot_of(&self, address: u8) -> Option<usize> {
        (0..self.depth).find(|&slot| self.target_address(slot) == address)
    }

    /// Address a slot hands out during ENTDAA, if it is a legal one.
    ///
    /// # Errors
    ///
    /// `Error::InvalidSlot` for an out-of-range slot, `Error::ReservedAddress`
    /// when the slot's dynamic address is reserved.
    pub fn assignable_address(&self, slot: usize) -> Result<u8, Error> {
        let entry = self.entry(slot).ok_or(Error::InvalidSlot)?;
        let address = entry.target_address();
        if is_reserved_address(address) {
            return Err(Error::ReservedAddress);
        }
        Ok(address)
    }

    pub fn clear(&mut self) {
        self.entries = [AddressTableEntry(0); MAX_TABLE_DEPTH];
    }
}

/// What a target reported about itself during ENTDAA.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCharacteristics {
    pub pid: u64,
    pub bcr: u8,
    pub dcr: u8,
    pub dynamic_address: u8,
}

impl DeviceCharacteristics {
    /// Parse an 8-byte ENTDAA response: PID least significant byte first,
    /// then BCR, then DCR.
    #[must_use]
    pub fn from_entdaa(response: [u8; 8], dynamic_address: u8) -> Self {
        let [p0, p1, p2, p3, p4, p5, bcr, dcr] = response;
        let pid = u64::from_le_bytes([p0, p1, p2, p3, p4, p5, 0, 0]);
        Self {
            pid,
            bcr,
            dcr,
            dynamic_address,
        }
    }

    /// The four DEV_CHAR_TABLE words for this entry.
    #[must_use]
    pub const fn to_words(&self) -> [u32; 4] {
        [
            (self.pid & 0xffff_ffff) as u32,
            ((self.pid >> 32) & 0xffff) as u32,
            (self.dcr as u32) | ((self.bcr as u32) << 8),
            self.dynamic_address as u32,
        ]
    }
}

pub struct CharacteristicTable {
    entries: [DeviceCharacteristics; MAX_TABLE_DEPTH],
    depth: usize,
    present_index: usize,
}

impl CharacteristicTable {
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            entries: [DeviceCharacteristics::default(); MAX_TABLE_DEPTH],
            depth: depth.clamp(1, MAX_TABLE_DEPTH),
            present_index: 0,
        }
    }

    /// Store `entry` at `slot` and advance the present index, wrapping at the
    /// table depth.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSlot` when `slot` is beyond the table.
    pub fn record(&mut self, slot: usize, entry: DeviceCharacteristics) -> Result<(), Error> {
        if slot >= self.depth {
            return Err(Error::InvalidSlot);
        }
        let dst = self.entries.get_mut(slot).ok_or(Error::InvalidSlot)?;
        *dst = entry;
        self.present_index += 1;
        if self.present_index >= self.depth {
            self.present_index = 0;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&DeviceCharacteristics> {
        if slot >= self.depth {
            return None;
        }
        self.entries.get(slot)
    }

    #[must_use]
    pub const fn present_index(&self) -> usize {
        self.present_index
    }

    /// Read one table word by its word offset from the table base.
    #[must_use]
    pub fn read_word(&self, offset: usize) -> u32 {
        self.get(offset / 4)
            .and_then(|entry| entry.to_words().get(offset % 4).copied())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.entries = [DeviceCharacteristics::default(); MAX_TABLE_DEPTH];
        self.present_index = 0;
    }
}
