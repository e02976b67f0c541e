// Opus header packets (in Ogg container)
//
// Opus File Structure:
// - Identification header: "OpusHead" (first packet, alone on its page)
// - Comment header: "OpusTags" followed by a Vorbis comment
// - Audio packets
//
// Granule positions always count 48 kHz samples, whatever the input rate.
//
// Reference:
// - RFC 7845: Ogg Encapsulation for the Opus Audio Codec

use serde::Serialize;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::flac::vorbis::VorbisComment;
use crate::utils::{le_uint, sint_from_bytes, Endian};

pub const OPUS_SIGNATURE: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS: &[u8; 8] = b"OpusTags";

/// Granule clock rate of every Opus stream
pub const OPUS_GRANULE_RATE: u32 = 48_000;

const OPUS_HEAD_LEN: usize = 19;

/// Channel mapping table, present for mapping families other than 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMapping {
    pub stream_count: u8,
    pub coupled_count: u8,
    pub mapping: Vec<u8>,
}

/// OpusHead identification header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    /// Samples at 48 kHz to discard from the decoder output
    pub pre_skip: u16,
    /// Sample rate of the original input, informational only
    pub input_sample_rate: u32,
    /// Q7.8 gain in dB
    pub output_gain: i16,
    pub mapping_family: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_mapping: Option<ChannelMapping>,
}

impl OpusHead {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if !packet.starts_with(OPUS_SIGNATURE) {
            return Err(Error::invalid("not an OpusHead packet"));
        }
        if packet.len() < OPUS_HEAD_LEN {
            return Err(Error::truncated("OpusHead", OPUS_HEAD_LEN, packet.len()));
        }
        let version = packet[8];
        // Only the major version nibble breaks compatibility
        if version >> 4 != 0 {
            return Err(Error::invalid(format!("unsupported Opus version {version}")));
        }
        let channels = packet[9];
        if channels == 0 {
            return Err(Error::invalid("OpusHead declares zero channels"));
        }
        let mapping_family = packet[18];

        let channel_mapping = if mapping_family == 0 {
            None
        } else {
            let need = OPUS_HEAD_LEN + 2 + usize::from(channels);
            if packet.len() < need {
                return Err(Error::truncated("OpusHead channel mapping", need, packet.len()));
            }
            Some(ChannelMapping {
                stream_count: packet[19],
                coupled_count: packet[20],
                mapping: packet[21..need].to_vec(),
            })
        };

        Ok(OpusHead {
            version,
            channels,
            pre_skip: le_uint(packet, 10, 2) as u16,
            input_sample_rate: le_uint(packet, 12, 4) as u32,
            output_gain: sint_from_bytes(&packet[16..18], Endian::Little, 2)? as i16,
            mapping_family,
            channel_mapping,
        })
    }

    pub fn output_gain_db(&self) -> f64 {
        f64::from(self.output_gain) / 256.0
    }

    /// Samples at 48 kHz a granule position stands for once pre-skip is dropped
    pub fn playable_samples(&self, granule: i64) -> i64 {
        granule.saturating_sub(i64::from(self.pre_skip))
    }
}

/// Decode an `OpusTags` packet.
///
/// Bytes after the comment list are padding or private data and are ignored.
pub fn parse_tags_packet(packet: &[u8]) -> Result<VorbisComment> {
    let Some(body) = packet.strip_prefix(OPUS_TAGS) else {
        return Err(Error::invalid("not an OpusTags packet"));
    };
    Ok(VorbisComment::read(&mut Cursor::new(body))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(channels: u8, family: u8) -> Vec<u8> {
        let mut packet = OPUS_SIGNATURE.to_vec();
        packet.push(1);
        packet.push(channels);
        packet.extend_from_slice(&312u16.to_le_bytes());
        packet.extend_from_slice(&44_100u32.to_le_bytes());
        packet.extend_from_slice(&(-512i16).to_le_bytes());
        packet.push(family);
        packet
    }

    #[test]
    fn test_parse_head() {
        let head = OpusHead::parse(&head(2, 0)).unwrap();
        assert_eq!(head.channels, 2);
        assert_eq!(head.pre_skip, 312);
        assert_eq!(head.input_sample_rate, 44_100);
        assert_eq!(head.output_gain_db(), -2.0);
        assert!(head.channel_mapping.is_none());
        assert_eq!(head.playable_samples(48_312), 48_000);
        assert_eq!(head.playable_samples(100), -212);
        assert_eq!(head.playable_samples(i64::MIN), i64::MIN);
    }

    #[test]
    fn test_mapping_family_one() {
        let mut packet = head(3, 1);
        assert!(OpusHead::parse(&packet).is_err());
        packet.extend_from_slice(&[2, 1, 0, 1, 2]);
        let mapping = OpusHead::parse(&packet).unwrap().channel_mapping.unwrap();
        assert_eq!(mapping.stream_count, 2);
        assert_eq!(mapping.mapping, vec![0, 1, 2]);
    }

    #[test]
    fn test_rejects_major_version() {
        let mut packet = head(2, 0);
        packet[8] = 0x10;
        assert!(OpusHead::parse(&packet).is_err());
    }

    #[test]
    fn test_tags_packet() {
        let mut comment = VorbisComment::new("libopus 1.3");
        comment.set("ARTIST", "someone");
        let mut packet = OPUS_TAGS.to_vec();
        packet.extend(comment.to_bytes());
        packet.extend_from_slice(&[0, 0, 0]);
        assert_eq!(parse_tags_packet(&packet).unwrap(), comment);
    }
}
