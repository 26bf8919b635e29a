//! Serial port settings shared by the gauges and the LoRa modem.

use std::{io::Error as IoError, time::Duration};

use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Device path and line framing of one port.
#[derive(Clone, Debug, PartialEq)]
pub struct PortOptions {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
}

pub const PARITY_VALUES: [&'static str; 3] = ["none", "odd", "even"];

impl PortOptions {
    /// 8N1 framing.
    pub fn new(path: &str, baud_rate: u32) -> Self {
        PortOptions {
            path: path.to_string(),
            baud_rate,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
        }
    }
}

pub fn parse_parity(value: &str) -> Result<Parity, String> {
    match value {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("unknown parity `{}`", value)),
    }
}

pub fn parse_data_bits(value: u8) -> Result<DataBits, String> {
    match value {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("unsupported data bits {}", value)),
    }
}

pub fn parse_stop_bits(value: u8) -> Result<StopBits, String> {
    match value {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("unsupported stop bits {}", value)),
    }
}

/// Open the port with its framing applied.
pub fn open(opts: &PortOptions) -> Result<SerialStream, IoError> {
    Ok(tokio_serial::new(opts.path.as_str(), opts.baud_rate)
        .parity(opts.parity)
        .data_bits(opts.data_bits)
        .stop_bits(opts.stop_bits)
        .timeout(Duration::from_secs(2))
        .open_native_async()?)
}
