// Speex header packet
//
// 80-byte header, all integers 32-bit little-endian:
// - "Speex   " (8)
// - Version string, NUL padded (20)
// - version id, header size, rate, mode, mode bitstream version,
//   channels, bitrate, frame size, vbr, frames per packet,
//   extra headers, two reserved words

use serde::Serialize;

use crate::error::{Error, Result};
use crate::utils::encoding::{decode_fixed, Charset};
use crate::utils::{le_uint, sint_from_bytes, Endian};

pub const SPEEX_SIGNATURE: &[u8; 8] = b"Speex   ";
pub const SPEEX_HEADER_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeexHeader {
    pub version: String,
    pub version_id: u32,
    pub header_size: u32,
    pub sample_rate: u32,
    pub mode: u32,
    pub mode_bitstream_version: u32,
    pub channels: u32,
    /// -1 when the encoder did not state one
    pub bitrate: i32,
    pub frame_size: u32,
    pub vbr: bool,
    pub frames_per_packet: u32,
    pub extra_headers: u32,
}

impl SpeexHeader {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if !packet.starts_with(SPEEX_SIGNATURE) {
            return Err(Error::invalid("not a Speex header"));
        }
        if packet.len() < SPEEX_HEADER_LEN {
            return Err(Error::truncated("Speex header", SPEEX_HEADER_LEN, packet.len()));
        }
        let word = |at: usize| le_uint(packet, at, 4) as u32;
        Ok(SpeexHeader {
            version: decode_fixed(&packet[8..28], Charset::Latin1),
            version_id: word(28),
            header_size: word(32),
            sample_rate: word(36),
            mode: word(40),
            mode_bitstream_version: word(44),
            channels: word(48),
            bitrate: sint_from_bytes(&packet[52..56], Endian::Little, 4)? as i32,
            frame_size: word(56),
            vbr: word(60) != 0,
            frames_per_packet: word(64),
            extra_headers: word(68),
        })
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            0 => "narrowband",
            1 => "wideband",
            2 => "ultra-wideband",
            _ => "unknown",
        }
    }
}
