//! `sb-domain`: types shared by every Switchboard crate.
//!
//! Holds the configuration tree, the shared error type, the bus message
//! envelopes and the capability declarations produced by tool servers.

pub mod config;
pub mod error;
pub mod message;
pub mod tool;
