// Licensed under the Apache-2.0 license

//! Scenario suites that drive whole populations of device models through
//! the bus and the controller. Each suite prints its progress to any
//! `embedded_io::Write` sink.

pub mod bus_tests;
pub mod controller_tests;
pub mod ibi_tests;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::Console;

    fn passed(console: &Console) -> usize {
        console.text.matches("PASSED").count()
    }

    #[test]
    fn bus_suite() {
        let mut console = Console::default();
        bus_tests::run_bus_tests(&mut console);
        assert_eq!(passed(&console), 4);
    }

    #[test]
    fn controller_suite() {
        let mut console = Console::default();
        controller_tests::run_controller_tests(&mut console);
        assert!(console.text.ends_with("=== All Controller Tests Passed ===\r\n"));
    }

    #[test]
    fn ibi_suite() {
        let mut console = Console::default();
        ibi_tests::run_ibi_tests(&mut console);
        assert_eq!(passed(&console), 4);
    }
}
