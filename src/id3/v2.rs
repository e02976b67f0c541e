// ID3v2 tag implementation
//
// Header (10 bytes): "ID3", major version, revision, flags, synchsafe size.
// The size excludes the header and the optional 10-byte footer.

use serde::Serialize;
use tracing::debug;

use super::frames::{comment_key, decode_comment_frame, decode_text_frame, decode_user_text_frame};
use crate::record::{Comments, Diagnostics};
use crate::utils::{be_uint, uint_from_bytes, Endian};

pub const ID3V2_HEADER_LEN: usize = 10;
const ID3V2_ID: &[u8; 3] = b"ID3";

const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

/// ID3v2 header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Id3v2Header {
    pub major_version: u8,
    pub revision: u8,
    pub flags: u8,
    /// Tag size after the header, footer excluded
    pub size: u32,
}

impl Id3v2Header {
    /// Parse the 10-byte header; `None` unless it starts with "ID3"
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ID3V2_HEADER_LEN || &bytes[..3] != ID3V2_ID {
            return None;
        }
        // A set high bit makes the size non-synchsafe, so not a real tag
        if bytes[6..10].iter().any(|&b| b & 0x80 != 0) {
            return None;
        }
        let size = uint_from_bytes(&bytes[6..10], Endian::Big, 4, true).ok()? as u32;
        Some(Id3v2Header {
            major_version: bytes[3],
            revision: bytes[4],
            flags: bytes[5],
            size,
        })
    }

    pub fn has_footer(&self) -> bool {
        self.flags & FLAG_FOOTER != 0
    }

    /// Bytes occupied by the whole tag, header and footer included
    pub fn total_size(&self) -> u64 {
        let footer = if self.has_footer() { ID3V2_HEADER_LEN } else { 0 };
        (ID3V2_HEADER_LEN + footer) as u64 + u64::from(self.size)
    }
}

/// ID3v2 frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id3Frame {
    pub frame_id: String,
    pub flags: u16,
    pub data: Vec<u8>,
}

/// ID3v2 tag structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id3v2Tag {
    pub header: Id3v2Header,
    pub frames: Vec<Id3Frame>,
}

impl Id3v2Tag {
    /// Parse a tag from its header and the `size` bytes following it.
    ///
    /// Frame parsing stops at padding or at the first frame that does not
    /// fit; only ID3v2.3 and ID3v2.4 frames are read.
    pub fn parse(header: Id3v2Header, body: &[u8], diagnostics: &mut Diagnostics) -> Self {
        let mut tag = Id3v2Tag {
            header,
            frames: Vec::new(),
        };
        if !matches!(header.major_version, 3 | 4) {
            diagnostics.warn(format!(
                "ID3v2.{} frames are not decoded",
                header.major_version
            ));
            return tag;
        }

        let body = if header.flags & FLAG_UNSYNCHRONISATION != 0 && header.major_version == 3 {
            resynchronise(body)
        } else {
            body.to_vec()
        };
        let mut pos = 0;
        if header.flags & FLAG_EXTENDED_HEADER != 0 {
            let len = be_uint(&body, 0, 4) as usize;
            pos = if header.major_version == 4 {
                uint_from_bytes(body.get(..4).unwrap_or_default(), Endian::Big, 4, true).unwrap_or(0) as usize
            } else {
                len + 4
            };
        }

        while pos + ID3V2_HEADER_LEN <= body.len() {
            let frame_header = &body[pos..pos + ID3V2_HEADER_LEN];
            if frame_header[0] == 0 {
                break;
            }
            let frame_id = String::from_utf8_lossy(&frame_header[..4]).into_owned();
            let size = if header.major_version == 4 {
                uint_from_bytes(&frame_header[4..8], Endian::Big, 4, true).unwrap_or(0)
            } else {
                be_uint(frame_header, 4, 4)
            } as usize;
            let start = pos + ID3V2_HEADER_LEN;
            let Some(data) = body.get(start..start + size) else {
                diagnostics.warn(format!("ID3v2 frame {frame_id} extends past end of tag"));
                break;
            };
            tag.frames.push(Id3Frame {
                frame_id,
                flags: be_uint(frame_header, 8, 2) as u16,
                data: data.to_vec(),
            });
            pos = start + size;
        }
        debug!(frames = tag.frames.len(), "ID3v2 tag parsed");
        tag
    }

    /// Text and comment frames as comments
    pub fn to_comments(&self) -> Comments {
        let mut comments = Comments::new();
        for frame in &self.frames {
            let id = frame.frame_id.as_str();
            let (key, values) = match id {
                "COMM" => (comment_key(id), decode_comment_frame(&frame.data).into_iter().collect()),
                "TXXX" => match decode_user_text_frame(&frame.data) {
                    Some((description, values)) if !description.is_empty() => {
                        (description.to_lowercase(), values)
                    }
                    _ => continue,
                },
                _ if id.starts_with('T') => (comment_key(id), decode_text_frame(&frame.data)),
                _ => continue,
            };
            if !values.is_empty() {
                comments.entry(key).or_default().extend(values);
            }
        }
        comments
    }
}

/// Undo ID3v2.3 whole-tag unsynchronisation (FF 00 becomes FF)
fn resynchronise(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut previous = 0u8;
    for &byte in data {
        if !(previous == 0xFF && byte == 0x00) {
            out.push(byte);
        }
        previous = byte;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, data: &[u8]) -> Vec<u8> {
        let mut out = id.as_bytes().to_vec();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_header() {
        let header = Id3v2Header::parse(b"ID3\x04\x00\x10\x00\x00\x02\x01").unwrap();
        assert_eq!(header.size, 257);
        assert!(header.has_footer());
        assert_eq!(header.total_size(), 277);
        assert!(Id3v2Header::parse(b"ID3\x04\x00\x00\x00\x00\x80\x00").is_none());
        assert!(Id3v2Header::parse(b"ID").is_none());
    }

    #[test]
    fn test_frames_to_comments() {
        let mut body = frame("TIT2", b"\x00Song");
        body.extend(frame("TPE1", b"\x00Band"));
        body.extend(frame("COMM", b"\x00eng\x00nice"));
        body.extend(frame("APIC", b"\x00image/png\x00\x03\x00"));
        body.extend_from_slice(&[0; 16]);
        let header = Id3v2Header {
            major_version: 3,
            revision: 0,
            flags: 0,
            size: body.len() as u32,
        };
        let mut diagnostics = Diagnostics::default();
        let tag = Id3v2Tag::parse(header, &body, &mut diagnostics);
        assert_eq!(tag.frames.len(), 4);
        let comments = tag.to_comments();
        assert_eq!(comments["title"], vec!["Song"]);
        assert_eq!(comments["artist"], vec!["Band"]);
        assert_eq!(comments["comment"], vec!["nice"]);
        assert_eq!(comments.len(), 3);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_resynchronise() {
        assert_eq!(resynchronise(&[0xFF, 0x00, 0xE0, 0x00]), vec![0xFF, 0xE0, 0x00]);
    }
}
