//! Error types of the protocol and encoding layer.
//!
//! Decode and dispatch errors are non-fatal and travel next to a degraded result. Transport faults
//! (port closed, I/O failure) are reported as [`std::io::Error`] by the functions that touch the
//! ports and are never folded into these types.

use thiserror::Error;

use super::{data::DataSource, payload::DataFormat};

/// Reasons why a sensor reply could not be decoded.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Wrong or zero frame length.
    #[error("no communication with {sensor}: received {len} bytes")]
    Communication { sensor: DataSource, len: usize },
    /// CRC register did not end at zero.
    #[error("CRC check failed for {sensor}: register 0x{register:04x}")]
    Checksum { sensor: DataSource, register: u16 },
}

/// Reasons why a value cannot be rendered into its fixed-width field.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("value {value} needs {digits} whole digits, too wide for format {format}")]
    Overflow {
        value: f64,
        format: DataFormat,
        digits: usize,
    },
    #[error("value {0} is not finite")]
    NotFinite(f64),
    #[error("negative value {0} has no representation")]
    Negative(f64),
}

/// Malformed `<L>.<T>` format string.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid data format `{0}`, expect `<whole>.<decimal>`")]
pub struct ParseFormatError(pub String);

/// Invalid AT command argument.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("argument is not ASCII: {0:?}")]
    NonAscii(String),
    #[error("argument contains a quote or line break: {0:?}")]
    Unquotable(String),
}

/// A reply line that arrived while no handler was collecting and matched no start marker.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("no handler for reply line {0:?}")]
pub struct DispatchMismatch(pub String);

/// Configuration value that cannot be used.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid config: {0}")]
pub struct ConfigError(pub String);
