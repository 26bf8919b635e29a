//! CRC-16/Modbus helpers for Modbus RTU frames.

use crc::{CRC_16_MODBUS, Crc};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Run the CRC register over the whole frame, trailing CRC bytes included.
///
/// A frame with a correct trailer leaves the register at `0`, so any non-zero return means the
/// frame is corrupted.
pub fn crc_check(frame: &[u8]) -> u16 {
    CRC_MODBUS.checksum(frame)
}

/// Calculate CRC of the payload (without trailer).
pub fn checksum(payload: &[u8]) -> u16 {
    CRC_MODBUS.checksum(payload)
}

/// Append the CRC trailer (low byte first) to the frame.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = checksum(frame.as_slice());
    frame.extend_from_slice(&crc.to_le_bytes());
}
