// Licensed under the Apache-2.0 license

//! I3C bus protocol stack.
//!
//! A [`bus::Bus`] connects targets (any [`target::TargetDevice`]) to a
//! controller. The controller side is the command/response queue engine in
//! [`controller`]; in-band interrupts are arbitrated by [`ibi`]. Legacy I2C
//! devices share the bus through [`i2c_compat`].

pub mod address_table;
pub mod bus;
pub mod ccc;
pub mod common;
pub mod controller;
#[cfg(feature = "i3c_target")]
pub mod controller_target;
pub mod descriptor;
pub mod devices;
pub mod error;
pub mod i2c_compat;
pub mod ibi;
pub mod queue;
pub mod regs;
pub mod target;
