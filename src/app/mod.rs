//! Application core: domain logic behind port traits.
//!
//! This module contains the business rules for the CatHub coordinator:
//! the litterbox controller with its background monitor, and the generic
//! sensor poller.  All interaction with the board, the remote store and
//! the disk happens through **port traits** defined in [`ports`], keeping
//! this layer fully testable with mock adapters.

pub mod commands;
pub mod controller;
pub mod events;
pub mod poller;
pub mod ports;
