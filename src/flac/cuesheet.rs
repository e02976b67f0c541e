// CUESHEET block implementation

use serde::Serialize;
use std::io::{self, Cursor, Read};

use crate::utils::encoding::{decode_fixed, Charset};
use crate::utils::io::{read_be_u64, read_bytes, read_u8};

/// Index point inside a cue sheet track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CueIndex {
    /// Offset in samples relative to the track offset
    pub offset: u64,
    pub number: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CueTrack {
    /// Offset in samples from the start of the stream
    pub offset: u64,
    pub number: u8,
    pub isrc: String,
    pub is_audio: bool,
    pub pre_emphasis: bool,
    pub indices: Vec<CueIndex>,
}

/// CUESHEET block structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CueSheet {
    pub media_catalog_number: String,
    pub lead_in_samples: u64,
    pub is_cd: bool,
    pub tracks: Vec<CueTrack>,
}

impl CueSheet {
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        let catalog = read_bytes(&mut cursor, 128)?;
        let lead_in_samples = read_be_u64(&mut cursor)?;
        let flags = read_u8(&mut cursor)?;
        // 7 flag bits + 258 reserved bytes
        read_bytes(&mut cursor, 258)?;
        let track_count = read_u8(&mut cursor)?;

        let mut tracks = Vec::with_capacity(track_count as usize);
        for _ in 0..track_count {
            tracks.push(read_track(&mut cursor)?);
        }

        Ok(CueSheet {
            media_catalog_number: decode_fixed(&catalog, Charset::Latin1),
            lead_in_samples,
            is_cd: flags & 0x80 != 0,
            tracks,
        })
    }
}

fn read_track<R: Read>(reader: &mut R) -> io::Result<CueTrack> {
    let offset = read_be_u64(reader)?;
    let number = read_u8(reader)?;
    let isrc = read_bytes(reader, 12)?;
    let flags = read_u8(reader)?;
    read_bytes(reader, 13)?;
    let index_count = read_u8(reader)?;

    let mut indices = Vec::with_capacity(index_count as usize);
    for _ in 0..index_count {
        let offset = read_be_u64(reader)?;
        let number = read_u8(reader)?;
        read_bytes(reader, 3)?;
        indices.push(CueIndex { offset, number });
    }

    Ok(CueTrack {
        offset,
        number,
        isrc: decode_fixed(&isrc, Charset::Latin1),
        is_audio: flags & 0x80 == 0,
        pre_emphasis: flags & 0x40 != 0,
        indices,
    })
}
