// Vorbis comment block, shared by native FLAC and every Ogg codec

use serde::Serialize;
use std::io::{self, Cursor, Read};

use crate::record::Comments;
use crate::utils::io::{read_bytes, read_le_string, read_le_u32};

/// Comment key carrying a base64 encoded FLAC PICTURE block
pub const METADATA_BLOCK_PICTURE: &str = "METADATA_BLOCK_PICTURE";

/// Vorbis comment structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VorbisComment {
    pub vendor_string: String,
    /// `(FIELD, value)` pairs in stream order
    pub comments: Vec<(String, String)>,
    /// Entries without a `=` separator
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
}

impl VorbisComment {
    pub fn new(vendor_string: impl Into<String>) -> Self {
        VorbisComment {
            vendor_string: vendor_string.into(),
            ..Default::default()
        }
    }

    /// Read Vorbis comment from reader
    ///
    /// All lengths are 32-bit little-endian. Reading stops right after the
    /// last comment; framing bits belong to the caller.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let vendor_string = read_le_string(reader)?;
        let count = read_le_u32(reader)? as usize;

        // Every entry needs at least its 4-byte length, so cap the reservation
        let mut comment = VorbisComment {
            vendor_string,
            comments: Vec::with_capacity(count.min(1024)),
            invalid: Vec::new(),
        };
        for _ in 0..count {
            let len = read_le_u32(reader)? as usize;
            let entry = read_bytes(reader, len)?;
            let entry = String::from_utf8_lossy(&entry);
            match entry.split_once('=') {
                Some((field, value)) => comment.comments.push((field.to_string(), value.to_string())),
                None => comment.invalid.push(entry.into_owned()),
            }
        }
        Ok(comment)
    }

    /// Parse a comment from an in-memory payload
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        Self::read(&mut Cursor::new(data))
    }

    /// Get the first value of a field, case-insensitively
    pub fn get(&self, field: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a field, in stream order
    pub fn get_all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.comments
            .iter()
            .filter(move |(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every value of `field` with `value`
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.remove(field);
        self.comments.push((field.to_ascii_uppercase(), value.into()));
    }

    pub fn remove(&mut self, field: &str) {
        self.comments.retain(|(f, _)| !f.eq_ignore_ascii_case(field));
    }

    /// Comments keyed by lower-cased field name, excluding embedded pictures
    pub fn to_comments(&self) -> Comments {
        let mut out = Comments::new();
        for (field, value) in &self.comments {
            if field.eq_ignore_ascii_case(METADATA_BLOCK_PICTURE) {
                continue;
            }
            out.entry(field.to_lowercase()).or_default().push(value.clone());
        }
        out
    }

    /// Encode to the block payload layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_string(&mut out, self.vendor_string.as_bytes());
        out.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for (field, value) in &self.comments {
            push_string(&mut out, format!("{field}={value}").as_bytes());
        }
        out
    }
}

fn push_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> VorbisComment {
        let mut comment = VorbisComment::new("testenc");
        comment.comments.push(("TITLE".into(), "Sample".into()));
        comment.comments.push(("Artist".into(), "One".into()));
        comment.comments.push(("ARTIST".into(), "Two".into()));
        comment
    }

    #[test]
    fn test_read_back() {
        let parsed = VorbisComment::parse(&sample().to_bytes()).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let comment = sample();
        assert_eq!(comment.get("title"), Some("Sample"));
        assert_eq!(comment.get_all("artist").collect::<Vec<_>>(), vec!["One", "Two"]);
        assert_eq!(comment.get("album"), None);

        let comments = comment.to_comments();
        assert_eq!(comments["artist"], vec!["One".to_string(), "Two".to_string()]);
    }

    #[test]
    fn test_invalid_entries_kept() {
        let mut data = Vec::new();
        push_string(&mut data, b"v");
        data.extend_from_slice(&2u32.to_le_bytes());
        push_string(&mut data, b"NOSEPARATOR");
        push_string(&mut data, b"KEY=a=b");
        let parsed = VorbisComment::parse(&data).unwrap();
        assert_eq!(parsed.invalid, vec!["NOSEPARATOR".to_string()]);
        assert_eq!(parsed.get("key"), Some("a=b"));
    }

    #[test]
    fn test_huge_count_is_truncation_not_allocation() {
        let mut data = Vec::new();
        push_string(&mut data, b"v");
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(VorbisComment::parse(&data).is_err());
    }

    #[test]
    fn test_set_and_remove() {
        let mut comment = sample();
        comment.set("artist", "Three");
        assert_eq!(comment.get_all("ARTIST").collect::<Vec<_>>(), vec!["Three"]);
        comment.remove("title");
        assert_eq!(comment.get("title"), None);
    }
}
