//! CatHub coordinator library.
//!
//! Exposes the protocol, control and telemetry layers for the `cathub`
//! binary and for integration testing against simulated boards and
//! sinks.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod protocol;
pub mod safety;
pub mod sensors;
pub mod supervisor;
pub mod telemetry;
