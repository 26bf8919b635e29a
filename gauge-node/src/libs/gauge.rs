//! Modbus RTU gauges: request/reply exchange and frame decoding.
//!
//! - DRRG (digital rain gauge): 37-byte reply, two 32-bit floats at `[27,31)` and `[31,35)`.
//! - DSG (digital staff gauge): variable-length reply, water level (cm) in the byte at `[4,5)`.
//!
//! Decode failures never abort a cycle: the reading is returned with absent fields together with
//! the [`DecodeError`]. Only I/O failures of the port are returned as `Err`.

use std::{io::Error as IoError, str::FromStr, time::Duration};

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{self, Instant},
};

use super::{
    crc::crc_check,
    data::{DataSource, RawData, SensorData},
    error::DecodeError,
    payload::{FLOOD_FORMAT, RAIN_ACCU_FORMAT, RAIN_DATA_FORMAT},
};

/// Read 16 holding registers from 0x0000 (rain and accumulated rain).
pub const DRRG_COMM_0: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x10, 0x44, 0x06];
/// Read 2 holding registers from 0x0000 (water level).
pub const DSG_COMM_0: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

pub const DRRG_FRAME_LEN: usize = 37;
const DRRG_RAIN_RANGE: (usize, usize) = (27, 31);
const DRRG_ACCU_RANGE: (usize, usize) = (31, 35);
const DSG_MIN_FRAME_LEN: usize = 5;
const DSG_LEVEL_OFFSET: usize = 4;

/// Silent interval that ends a reply.
const FRAME_GAP_MS: u64 = 50;
/// Upper bound of one reply.
const MAX_FRAME_LEN: usize = 256;

/// How the four bytes of a DRRG float are rearranged before the big-endian conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WordOrder {
    /// `[b2, 0, b0, 0]`: the deployed behavior, which drops bytes 1 and 3.
    #[default]
    Transcribed,
    /// `[b2, b3, b0, b1]`: swap the two 16-bit registers.
    PairSwapped,
}

/// Options of one gauge exchange.
#[derive(Clone, Copy, Debug)]
pub struct PollOptions {
    /// Time to wait for the first byte of the reply.
    pub timeout: Duration,
    pub word_order: WordOrder,
}

/// A reading and the reason it is degraded, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub data: SensorData,
    pub error: Option<DecodeError>,
}

impl FromStr for WordOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcribed" => Ok(WordOrder::Transcribed),
            "pair-swapped" => Ok(WordOrder::PairSwapped),
            _ => Err(format!("unknown word order `{}`", s)),
        }
    }
}

impl Reading {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Rearrange a 4-byte float field into big-endian order.
pub fn reorder_float_bytes(src: [u8; 4], order: WordOrder) -> [u8; 4] {
    match order {
        WordOrder::Transcribed => [src[2], 0, src[0], 0],
        WordOrder::PairSwapped => [src[2], src[3], src[0], src[1]],
    }
}

/// Decode a DRRG frame into `(rain, accumulated rain)`.
pub fn decode_drrg_frame(frame: &[u8], order: WordOrder) -> Result<(f32, f32), DecodeError> {
    if frame.len() != DRRG_FRAME_LEN {
        return Err(DecodeError::Communication {
            sensor: DataSource::RainGauge,
            len: frame.len(),
        });
    }
    let register = crc_check(frame);
    if register != 0 {
        return Err(DecodeError::Checksum {
            sensor: DataSource::RainGauge,
            register,
        });
    }

    Ok((
        float_at(frame, DRRG_RAIN_RANGE, order),
        float_at(frame, DRRG_ACCU_RANGE, order),
    ))
}

/// Decode a DSG frame into the water level in centimeters.
pub fn decode_dsg_frame(frame: &[u8]) -> Result<f64, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::Communication {
            sensor: DataSource::StaffGauge,
            len: 0,
        });
    }
    let register = crc_check(frame);
    if register != 0 {
        return Err(DecodeError::Checksum {
            sensor: DataSource::StaffGauge,
            register,
        });
    }
    if frame.len() < DSG_MIN_FRAME_LEN {
        return Err(DecodeError::Communication {
            sensor: DataSource::StaffGauge,
            len: frame.len(),
        });
    }

    let mut dst = [0u8; 1];
    dst.clone_from_slice(&frame[DSG_LEVEL_OFFSET..DSG_LEVEL_OFFSET + 1]);
    Ok(f64::from(u8::from_be_bytes(dst)))
}

/// Request and decode the rain gauge.
pub async fn get_drrg_data<T>(
    port: &mut T,
    timestamp: NaiveDateTime,
    opts: &PollOptions,
) -> Result<Reading, IoError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    const FN_NAME: &'static str = "get_drrg_data";

    let mut data = SensorData::new(DataSource::RainGauge, timestamp);
    let frame = request(port, &DRRG_COMM_0, opts.timeout).await?;
    debug!("[{}] read {}", FN_NAME, hex::encode(frame.as_slice()));

    match decode_drrg_frame(frame.as_slice(), opts.word_order) {
        Err(e) => {
            warn!("[{}] {}", FN_NAME, e);
            data.append_data(RawData::absent(RAIN_DATA_FORMAT));
            data.append_data(RawData::absent(RAIN_ACCU_FORMAT));
            Ok(Reading {
                data,
                error: Some(e),
            })
        }
        Ok((rain, accu)) => {
            info!("[{}] rain: {}, rain accu: {}", FN_NAME, rain, accu);
            data.append_data(RawData::new(RAIN_DATA_FORMAT, Some(f64::from(rain))));
            data.append_data(RawData::new(RAIN_ACCU_FORMAT, Some(f64::from(accu))));
            Ok(Reading { data, error: None })
        }
    }
}

/// Request and decode the staff gauge.
pub async fn get_dsg_data<T>(
    port: &mut T,
    timestamp: NaiveDateTime,
    opts: &PollOptions,
) -> Result<Reading, IoError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    const FN_NAME: &'static str = "get_dsg_data";

    let mut data = SensorData::new(DataSource::StaffGauge, timestamp);
    let frame = request(port, &DSG_COMM_0, opts.timeout).await?;
    debug!("[{}] read {}", FN_NAME, hex::encode(frame.as_slice()));

    match decode_dsg_frame(frame.as_slice()) {
        Err(e) => {
            warn!("[{}] {}", FN_NAME, e);
            data.append_data(RawData::absent(FLOOD_FORMAT));
            Ok(Reading {
                data,
                error: Some(e),
            })
        }
        Ok(level) => {
            info!("[{}] water level: {} cm", FN_NAME, level);
            data.append_data(RawData::new(FLOOD_FORMAT, Some(level)));
            Ok(Reading { data, error: None })
        }
    }
}

/// Write the request and read the reply.
///
/// The reply ends when the line stays silent for [`FRAME_GAP_MS`] after the first byte, on EOF, or
/// at [`MAX_FRAME_LEN`] bytes. No byte within `timeout` gives an empty reply.
async fn request<T>(port: &mut T, cmd: &[u8], timeout: Duration) -> Result<Vec<u8>, IoError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    port.write_all(cmd).await?;
    port.flush().await?;

    let mut frame = Vec::with_capacity(DRRG_FRAME_LEN);
    let mut buff = [0u8; 64];
    let mut deadline = Instant::now() + timeout;
    while frame.len() < MAX_FRAME_LEN {
        let size = match time::timeout_at(deadline, port.read(&mut buff)).await {
            Err(_) => break,
            Ok(size) => size?,
        };
        if size == 0 {
            break;
        }
        frame.extend_from_slice(&buff[..size]);
        deadline = Instant::now() + Duration::from_millis(FRAME_GAP_MS);
    }
    frame.truncate(MAX_FRAME_LEN);
    Ok(frame)
}

fn float_at(frame: &[u8], range: (usize, usize), order: WordOrder) -> f32 {
    let mut src = [0u8; 4];
    src.clone_from_slice(&frame[range.0..range.1]);
    f32::from_be_bytes(reorder_float_bytes(src, order))
}
