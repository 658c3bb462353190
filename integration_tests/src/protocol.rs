//! Protocol definitions matching the firmware.

#![allow(dead_code)]

use crc::{Crc, CRC_8_SMBUS};

/// Header byte
pub const HEADER: u8 = 0x23;

/// Error marker byte, '?'
pub const ERROR_CHAR: u8 = 0x3F;

/// Startup banner sent once after reset
pub const BANNER: &[u8] = b"AD-Converter\n";

/// Command IDs matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    Configure = 0x50,
    ReadShuntVoltage = 0x51,
    ReadBusVoltage = 0x52,
    ReadPower = 0x53,
    ReadCurrent = 0x54,
    Calibrate = 0x55,
    ReadAll = 0x56,
}

impl CommandId {
    /// Number of bytes the device sends back for this command
    pub fn reply_len(self) -> usize {
        match self {
            CommandId::Configure => 7,
            CommandId::Calibrate => 4,
            CommandId::ReadAll => 11,
            _ => 5,
        }
    }
}

/// Error codes matching the firmware protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    ChecksumMismatch = 0x30,
    HeaderMismatch = 0x31,
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x30 => Ok(ErrorCode::ChecksumMismatch),
            0x31 => Ok(ErrorCode::HeaderMismatch),
            _ => Err(value),
        }
    }
}

const CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8 over the first five frame bytes.
pub fn checksum(data: &[u8]) -> u8 {
    CRC.checksum(data)
}

/// Build a 6-byte command frame.
/// Format: [0x23][0x23][cmd][param1][param2][crc8]
pub fn build_frame(cmd_id: u8, params: [u8; 2]) -> [u8; 6] {
    let mut frame = [HEADER, HEADER, cmd_id, params[0], params[1], 0];
    frame[5] = checksum(&frame[..5]);
    frame
}

/// Build a frame for a known command.
pub fn build_command(cmd_id: CommandId, params: [u8; 2]) -> [u8; 6] {
    build_frame(cmd_id as u8, params)
}

/// Parsed reply from the device.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Header, command echo and payload
    Command { cmd_id: u8, payload: Vec<u8> },
    /// `???` followed by an error code
    Error(ErrorCode),
}

/// Parse a raw reply.
pub fn parse_reply(data: &[u8]) -> anyhow::Result<Reply> {
    if data.len() == 4 && data[..3] == [ERROR_CHAR; 3] {
        let code = ErrorCode::try_from(data[3])
            .map_err(|v| anyhow::anyhow!("Unknown error code: {:#04x}", v))?;
        return Ok(Reply::Error(code));
    }

    if data.len() < 3 {
        anyhow::bail!("Reply too short: {} bytes", data.len());
    }
    if data[0] != HEADER || data[1] != HEADER {
        anyhow::bail!("Bad reply header: {:02x?}", &data[..2]);
    }

    let cmd_id = data[2];
    let mut payload = &data[3..];

    // Configure repeats its header before the status byte
    if cmd_id == CommandId::Configure as u8 {
        if payload.len() < 3 || payload[..3] != [HEADER, HEADER, cmd_id] {
            anyhow::bail!("Configure reply missing repeated header: {:02x?}", data);
        }
        payload = &payload[3..];
    }

    Ok(Reply::Command {
        cmd_id,
        payload: payload.to_vec(),
    })
}
