//! AOA host tool
//!
//! Switches a phone into accessory mode and echoes whatever it sends.
//! The binary lives in `main.rs`; this library holds the pieces it wires
//! together so they can be tested without hardware.

pub mod config;
pub mod devices;
pub mod echo;

pub use config::HostConfig;
pub use echo::{EchoOptions, EchoStats, run_echo};
