// Licensed under the Apache-2.0 license

//! Common Command Codes.
//!
//! Broadcast codes live in `0x00..=0x7f`, direct codes have bit 7 set. A
//! direct CCC is sent as a broadcast header plus opcode, followed by a
//! repeated start to the addressed target.

pub const ENEC: u8 = 0x00;
pub const DISEC: u8 = 0x01;
pub const ENTAS0: u8 = 0x02;
pub const ENTAS1: u8 = 0x03;
pub const ENTAS2: u8 = 0x04;
pub const ENTAS3: u8 = 0x05;
pub const RSTDAA: u8 = 0x06;
pub const ENTDAA: u8 = 0x07;
pub const DEFTGTS: u8 = 0x08;
pub const SETMWL: u8 = 0x09;
pub const SETMRL: u8 = 0x0a;
pub const ENTTM: u8 = 0x0b;
pub const SETBUSCON: u8 = 0x0c;
pub const ENDXFER: u8 = 0x12;
pub const ENTHDR0: u8 = 0x20;
pub const ENTHDR1: u8 = 0x21;
pub const ENTHDR2: u8 = 0x22;
pub const ENTHDR3: u8 = 0x23;
pub const ENTHDR4: u8 = 0x24;
pub const ENTHDR5: u8 = 0x25;
pub const ENTHDR6: u8 = 0x26;
pub const ENTHDR7: u8 = 0x27;
pub const SETXTIME: u8 = 0x28;
pub const SETAASA: u8 = 0x29;
pub const RSTACT: u8 = 0x2a;
pub const DEFGRPA: u8 = 0x2b;
pub const RSTGRPA: u8 = 0x2c;
pub const MLANE: u8 = 0x2d;

pub const ENEC_DIRECT: u8 = 0x80;
pub const DISEC_DIRECT: u8 = 0x81;
pub const ENTAS0_DIRECT: u8 = 0x82;
pub const ENTAS1_DIRECT: u8 = 0x83;
pub const ENTAS2_DIRECT: u8 = 0x84;
pub const ENTAS3_DIRECT: u8 = 0x85;
pub const SETDASA: u8 = 0x87;
pub const SETNEWDA: u8 = 0x88;
pub const SETMWL_DIRECT: u8 = 0x89;
pub const SETMRL_DIRECT: u8 = 0x8a;
pub const GETMWL: u8 = 0x8b;
pub const GETMRL: u8 = 0x8c;
pub const GETPID: u8 = 0x8d;
pub const GETBCR: u8 = 0x8e;
pub const GETDCR: u8 = 0x8f;
pub const GETSTATUS: u8 = 0x90;
pub const GETACCCR: u8 = 0x91;
pub const ENDXFER_DIRECT: u8 = 0x92;
pub const SETBRGTGT: u8 = 0x93;
pub const GETMXDS: u8 = 0x94;
pub const GETCAPS: u8 = 0x95;
pub const SETROUTE: u8 = 0x96;
pub const SETXTIME_DIRECT: u8 = 0x98;
pub const GETXTIME: u8 = 0x99;
pub const RSTACT_DIRECT: u8 = 0x9a;
pub const SETGRPA: u8 = 0x9b;
pub const RSTGRPA_DIRECT: u8 = 0x9c;
pub const MLANE_DIRECT: u8 = 0x9d;

/// Event classes carried in the ENEC/DISEC payload byte.
pub mod events {
    /// Target interrupt requests.
    pub const INT: u8 = 0x01;
    /// Controller role requests.
    pub const CR: u8 = 0x02;
    /// Hot-join requests.
    pub const HJ: u8 = 0x08;
    pub const ALL: u8 = INT | CR | HJ;
}

#[must_use]
pub const fn is_direct(ccc: u8) -> bool {
    ccc & 0x80 != 0
}

#[must_use]
pub const fn is_enter_activity_state(ccc: u8) -> bool {
    matches!(ccc, ENTAS0..=ENTAS3 | ENTAS0_DIRECT..=ENTAS3_DIRECT)
}

#[must_use]
pub const fn is_enter_hdr(ccc: u8) -> bool {
    matches!(ccc, ENTHDR0..=ENTHDR7)
}
