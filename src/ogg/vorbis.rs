// Ogg Vorbis header packets
//
// Vorbis Structure:
// 1. Identification header (first packet)
// 2. Comment header (second packet) - contains the Vorbis comment
// 3. Setup header (third packet)
// 4. Audio packets

use serde::Serialize;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::record::BitrateMode;
use crate::utils::{le_uint, sint_from_bytes, Endian};

pub use crate::flac::vorbis::VorbisComment;

pub const IDENTIFICATION_PREFIX: &[u8; 7] = b"\x01vorbis";
pub const COMMENT_PREFIX: &[u8; 7] = b"\x03vorbis";
pub const IDENTIFICATION_LEN: usize = 30;

/// Vorbis identification header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VorbisIdentification {
    pub version: u32,
    pub channels: u8,
    pub sample_rate: u32,
    /// Bitrate hints in bits per second; zero or negative means unset
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub blocksize_short: u16,
    pub blocksize_long: u16,
    pub framing: bool,
}

impl VorbisIdentification {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if !packet.starts_with(IDENTIFICATION_PREFIX) {
            return Err(Error::invalid("not a Vorbis identification header"));
        }
        if packet.len() < IDENTIFICATION_LEN {
            return Err(Error::truncated(
                "Vorbis identification header",
                IDENTIFICATION_LEN,
                packet.len(),
            ));
        }
        let bitrate = |at: usize| -> Result<i32> { Ok(sint_from_bytes(&packet[at..at + 4], Endian::Little, 4)? as i32) };
        let blocksizes = packet[28];
        Ok(VorbisIdentification {
            version: le_uint(packet, 7, 4) as u32,
            channels: packet[11],
            sample_rate: le_uint(packet, 12, 4) as u32,
            bitrate_maximum: bitrate(16)?,
            bitrate_nominal: bitrate(20)?,
            bitrate_minimum: bitrate(24)?,
            blocksize_short: 1 << (blocksizes & 0x0F).min(15),
            blocksize_long: 1 << (blocksizes >> 4).min(15),
            framing: packet[29] & 0x01 != 0,
        })
    }

    pub fn nominal_bitrate(&self) -> Option<f64> {
        (self.bitrate_nominal > 0).then_some(f64::from(self.bitrate_nominal))
    }

    /// Equal maximum, nominal and minimum hints mean a constant bitrate
    pub fn bitrate_mode(&self) -> BitrateMode {
        if self.bitrate_nominal > 0
            && self.bitrate_maximum == self.bitrate_nominal
            && self.bitrate_minimum == self.bitrate_nominal
        {
            BitrateMode::Cbr
        } else {
            BitrateMode::Vbr
        }
    }
}

/// Decode a `\x03vorbis` comment packet.
///
/// Returns the comment and whether the trailing framing bit was set.
pub fn parse_comment_packet(packet: &[u8]) -> Result<(VorbisComment, bool)> {
    let Some(body) = packet.strip_prefix(COMMENT_PREFIX) else {
        return Err(Error::invalid("not a Vorbis comment header"));
    };
    let mut cursor = Cursor::new(body);
    let comment = VorbisComment::read(&mut cursor)?;
    let framing = body
        .get(cursor.position() as usize)
        .is_some_and(|byte| byte & 0x01 != 0);
    Ok((comment, framing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification() -> Vec<u8> {
        let mut packet = IDENTIFICATION_PREFIX.to_vec();
        packet.extend_from_slice(&0u32.to_le_bytes());
        packet.push(2);
        packet.extend_from_slice(&44_100u32.to_le_bytes());
        packet.extend_from_slice(&(-1i32).to_le_bytes());
        packet.extend_from_slice(&128_000i32.to_le_bytes());
        packet.extend_from_slice(&(-1i32).to_le_bytes());
        packet.push(0xB8);
        packet.push(1);
        packet
    }

    #[test]
    fn test_identification() {
        let id = VorbisIdentification::parse(&identification()).unwrap();
        assert_eq!(id.channels, 2);
        assert_eq!(id.sample_rate, 44_100);
        assert_eq!(id.bitrate_maximum, -1);
        assert_eq!(id.nominal_bitrate(), Some(128_000.0));
        assert_eq!(id.bitrate_mode(), BitrateMode::Vbr);
        assert_eq!((id.blocksize_short, id.blocksize_long), (256, 2048));
        assert!(id.framing);
    }

    #[test]
    fn test_short_identification() {
        let packet = identification();
        assert!(matches!(
            VorbisIdentification::parse(&packet[..20]),
            Err(Error::Truncated { need: 30, have: 20, .. })
        ));
    }

    #[test]
    fn test_comment_packet_framing() {
        let mut comment = VorbisComment::new("enc");
        comment.set("TITLE", "x");
        let mut packet = COMMENT_PREFIX.to_vec();
        packet.extend(comment.to_bytes());

        let (decoded, framing) = parse_comment_packet(&packet).unwrap();
        assert_eq!(decoded, comment);
        assert!(!framing);

        packet.push(1);
        assert!(parse_comment_packet(&packet).unwrap().1);
        assert!(parse_comment_packet(b"OpusTags").is_err());
    }
}
