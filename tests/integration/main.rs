//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  No serial board or telemetry server is
//! required.

mod channel_tests;
mod controller_tests;
mod store_tests;
