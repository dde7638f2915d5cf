// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! The on-disk chunk file format (spec.md §6): a 17-byte header followed by
//! a body of length-prefixed Opus frames.
//!
//! Grounded on the teacher's `db::coding` module (small, freestanding
//! binary encode/decode helpers used by the recording writer), adapted from
//! varint/zigzag encoding to the fixed little-endian layout this format
//! actually uses.

use byteorder::{ByteOrder, LittleEndian};
use reclo_base::{Error, ErrorKind};

pub const MAGIC: [u8; 4] = *b"RCLO";
pub const HEADER_LEN: usize = 17;

/// `data_size` lives at header offset 13 so it can be back-filled after the
/// body has been streamed to disk (spec.md §4.3 rotation step 2).
pub const DATA_SIZE_OFFSET: usize = 13;

/// `ts` lives at header offset 4 so the retimestamper can patch it in place
/// (spec.md §4.4).
pub const TS_OFFSET: usize = 4;

/// The fixed 17-byte chunk header, decoded from or about to be encoded to
/// the first bytes of a chunk file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    pub ts: u32,
    pub codec_id: u8,
    pub sample_rate: u32,
    pub data_size: u32,
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.ts);
        buf[8] = self.codec_id;
        LittleEndian::write_u32(&mut buf[9..13], self.sample_rate);
        LittleEndian::write_u32(&mut buf[13..17], self.data_size);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::new(ErrorKind::CorruptHeader));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::new(ErrorKind::CorruptHeader));
        }
        Ok(ChunkHeader {
            ts: LittleEndian::read_u32(&buf[4..8]),
            codec_id: buf[8],
            sample_rate: LittleEndian::read_u32(&buf[9..13]),
            data_size: LittleEndian::read_u32(&buf[13..17]),
        })
    }
}

/// Encodes one frame as `[len u16 LE][bytes]`, appending to `out`.
///
/// Returns `Overflow` without touching `out` if `frame` is empty or longer
/// than a `u16` can address; spec.md §3 bounds frames to `1..=65535` bytes
/// and §4.3 says oversize/empty frames are dropped, not errors that abort
/// the chunk.
pub fn encode_frame(out: &mut Vec<u8>, frame: &[u8]) -> Result<(), Error> {
    if frame.is_empty() || frame.len() > u16::MAX as usize {
        return Err(Error::new(ErrorKind::Overflow));
    }
    let mut prefix = [0u8; 2];
    LittleEndian::write_u16(&mut prefix, frame.len() as u16);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(frame);
    Ok(())
}

/// Iterates `[len u16 LE][bytes]` frames out of a chunk body, stopping
/// cleanly at the end. A truncated trailing record (fewer bytes remaining
/// than the declared length) is treated as the end of valid data, since
/// this is the shape an interrupted streaming-variant flush leaves behind.
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FrameReader { buf, pos: 0 }
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos + 2 > self.buf.len() {
            return None;
        }
        let len = LittleEndian::read_u16(&self.buf[self.pos..self.pos + 2]) as usize;
        let start = self.pos + 2;
        if start + len > self.buf.len() {
            return None;
        }
        self.pos = start + len;
        Some(&self.buf[start..start + len])
    }
}
