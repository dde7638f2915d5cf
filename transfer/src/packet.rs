// This file is part of RecLo, the offline-recording core of a wearable audio capture device.
// Copyright (c) 2026 RecLo Authors; see LICENSE.txt.
// SPDX-License-Identifier: MIT
//! The 244-byte data-channel packet format (spec.md §4.5).
//!
//! Grounded on the packet-framing idiom in `denizetkar-walkie-talkie-app`
//! (fixed-size wire packets, `byteorder` LE encode/decode, a trait boundary
//! for the transport) rather than anything in the teacher, which has no
//! wire protocol of this shape.

use byteorder::{ByteOrder, LittleEndian};
use reclo_base::{Error, ErrorKind};

pub const PACKET_LEN: usize = 244;
pub const PAYLOAD_LEN: usize = 229;
pub const CHUNK_HEADER_META_LEN: usize = 13;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PacketType {
    Header,
    Data,
    Done,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Header => 0x01,
            PacketType::Data => 0x02,
            PacketType::Done => 0x03,
        }
    }

    fn from_byte(b: u8) -> Result<Self, Error> {
        match b {
            0x01 => Ok(PacketType::Header),
            0x02 => Ok(PacketType::Data),
            0x03 => Ok(PacketType::Done),
            _ => Err(Error::new(ErrorKind::InvalidArgument)),
        }
    }
}

/// One outbound data-channel packet, fixed at [`PACKET_LEN`] bytes on the
/// wire. Short payloads are zero-padded; `payload_len` records the used
/// length.
#[derive(Clone, Debug)]
pub struct DataPacket {
    pub pkt_type: PacketType,
    pub chunk_ts: u32,
    pub chunk_idx: u16,
    pub total_chunks: u16,
    pub seq: u16,
    pub total_seqs: u16,
    pub payload: Vec<u8>,
}

impl DataPacket {
    pub fn encode(&self) -> Result<[u8; PACKET_LEN], Error> {
        if self.payload.len() > PAYLOAD_LEN {
            return Err(Error::new(ErrorKind::Overflow));
        }
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = self.pkt_type.to_byte();
        LittleEndian::write_u32(&mut buf[1..5], self.chunk_ts);
        LittleEndian::write_u16(&mut buf[5..7], self.chunk_idx);
        LittleEndian::write_u16(&mut buf[7..9], self.total_chunks);
        LittleEndian::write_u16(&mut buf[9..11], self.seq);
        LittleEndian::write_u16(&mut buf[11..13], self.total_seqs);
        LittleEndian::write_u16(&mut buf[13..15], self.payload.len() as u16);
        buf[15..15 + self.payload.len()].copy_from_slice(&self.payload);
        Ok(buf)
    }

    pub fn decode(buf: &[u8; PACKET_LEN]) -> Result<Self, Error> {
        let pkt_type = PacketType::from_byte(buf[0])?;
        let chunk_ts = LittleEndian::read_u32(&buf[1..5]);
        let chunk_idx = LittleEndian::read_u16(&buf[5..7]);
        let total_chunks = LittleEndian::read_u16(&buf[7..9]);
        let seq = LittleEndian::read_u16(&buf[9..11]);
        let total_seqs = LittleEndian::read_u16(&buf[11..13]);
        let payload_len = LittleEndian::read_u16(&buf[13..15]) as usize;
        if payload_len > PAYLOAD_LEN {
            return Err(Error::new(ErrorKind::CorruptHeader));
        }
        Ok(DataPacket {
            pkt_type,
            chunk_ts,
            chunk_idx,
            total_chunks,
            seq,
            total_seqs,
            payload: buf[15..15 + payload_len].to_vec(),
        })
    }
}

/// The 13-byte meta payload carried by the `CHUNK_HEADER` packet.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ChunkHeaderMeta {
    pub data_size: u32,
    pub codec_id: u8,
    pub sample_rate: u32,
    pub crc32: u32,
}

impl ChunkHeaderMeta {
    pub fn encode(&self) -> [u8; CHUNK_HEADER_META_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_META_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.data_size);
        buf[4] = self.codec_id;
        LittleEndian::write_u32(&mut buf[5..9], self.sample_rate);
        LittleEndian::write_u32(&mut buf[9..13], self.crc32);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < CHUNK_HEADER_META_LEN {
            return Err(Error::new(ErrorKind::CorruptHeader));
        }
        Ok(ChunkHeaderMeta {
            data_size: LittleEndian::read_u32(&buf[0..4]),
            codec_id: buf[4],
            sample_rate: LittleEndian::read_u32(&buf[5..9]),
            crc32: LittleEndian::read_u32(&buf[9..13]),
        })
    }
}
