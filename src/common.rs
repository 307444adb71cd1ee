// Licensed under the Apache-2.0 license

//! Shared helpers used across the driver modules.

use core::fmt;

/// Diagnostic sink threaded through the bus and controller models.
///
/// Implementations decide where messages go (UART, RTT, a test buffer) and
/// whether to render the `fmt::Arguments` at all.
pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger {}

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}
