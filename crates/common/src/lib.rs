//! Common utilities for rust-aoa
//!
//! Shared by the binaries in this workspace: logging setup and the
//! application-level error type.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
