//! Common error types

use accessory::AccessoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Accessory error: {0}")]
    Accessory(#[from] AccessoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
