// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! Control-channel commands (spec.md §4.5): 1-5 byte inbound writes from
//! the phone.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ControlCommand {
    RequestUpload,
    AckChunk { ts: u32 },
    Abort,
    /// First byte not recognized. Accepted for forward compatibility
    /// (spec.md §4.5): logged and ignored by the session controller, not
    /// treated as a parse failure.
    Unknown(u8),
}

/// Only a genuinely empty write is rejected; the wireless link's own
/// contract (spec.md §6) is to answer a length-0 write with an
/// "invalid length" error response.
#[derive(Error, Copy, Clone, Eq, PartialEq, Debug)]
pub enum ControlParseError {
    #[error("zero-length control write")]
    EmptyWrite,
    #[error("ACK_CHUNK body must be 4 bytes, got {0}")]
    WrongAckLength(usize),
}

pub fn parse_control(bytes: &[u8]) -> Result<ControlCommand, ControlParseError> {
    let (&cmd, body) = bytes.split_first().ok_or(ControlParseError::EmptyWrite)?;
    match cmd {
        0x01 => Ok(ControlCommand::RequestUpload),
        0x02 => {
            if body.len() != 4 {
                return Err(ControlParseError::WrongAckLength(body.len()));
            }
            Ok(ControlCommand::AckChunk {
                ts: LittleEndian::read_u32(body),
            })
        }
        0x03 => Ok(ControlCommand::Abort),
        other => Ok(ControlCommand::Unknown(other)),
    }
}
