//! Error types for attach, snapshot and configuration failures.

use std::path::PathBuf;

use format_crt::CrtError;
use thiserror::Error;

use crate::cartridge_type::CartridgeType;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("CRT container: {0}")]
    Crt(#[from] CrtError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{cart_type}: unsupported image size {size}")]
    UnsupportedSize { cart_type: CartridgeType, size: usize },
    #[error("{cart_type}: CHIP bank {bank} beyond the {max} banks the hardware decodes")]
    BankOutOfRange {
        cart_type: CartridgeType,
        bank: usize,
        max: usize,
    },
    #[error("{cart_type}: unexpected CHIP at ${load_address:04X} ({size} bytes)")]
    UnexpectedChip {
        cart_type: CartridgeType,
        load_address: u16,
        size: usize,
    },
    #[error("CRT hardware type {0} is not supported")]
    UnknownCrtType(u16),
    #[error("CRT is a {found} image, expected {expected}")]
    CrtTypeMismatch {
        expected: CartridgeType,
        found: CartridgeType,
    },
    #[error("{0}: this source kind is not supported")]
    Unsupported(CartridgeType),
    #[error("{cart_type}: companion image {path}: {source}")]
    CompanionResource {
        cart_type: CartridgeType,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("module {module} version {major}.{minor} is newer than supported {max_major}.{max_minor}")]
    VersionMismatch {
        module: String,
        major: u8,
        minor: u8,
        max_major: u8,
        max_minor: u8,
    },
    #[error("module {0} is truncated")]
    Truncated(String),
    #[error("snapshot container: {0}")]
    BadContainer(String),
    #[error("module {module}: {reason}")]
    Rejected { module: String, reason: String },
    #[error("module {0} is missing")]
    Missing(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}
