// ID3v2 frame decoding

use crate::utils::encoding::Charset;

/// Text encoding byte that starts every text frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Iso8859_1 = 0,
    Utf16 = 1,
    Utf16BE = 2,
    Utf8 = 3,
}

impl TextEncoding {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => TextEncoding::Utf16,
            2 => TextEncoding::Utf16BE,
            3 => TextEncoding::Utf8,
            _ => TextEncoding::Iso8859_1,
        }
    }

    pub fn charset(self) -> Charset {
        match self {
            TextEncoding::Iso8859_1 => Charset::Latin1,
            TextEncoding::Utf16 => Charset::Utf16,
            TextEncoding::Utf16BE => Charset::Utf16Be,
            TextEncoding::Utf8 => Charset::Utf8,
        }
    }

    fn terminator_len(self) -> usize {
        match self {
            TextEncoding::Utf16 | TextEncoding::Utf16BE => 2,
            _ => 1,
        }
    }
}

/// Frame identifiers mapped to the comment keys used across formats
const FRAME_KEYS: &[(&str, &str)] = &[
    ("TIT2", "title"),
    ("TPE1", "artist"),
    ("TPE2", "albumartist"),
    ("TALB", "album"),
    ("TYER", "year"),
    ("TDRC", "date"),
    ("TRCK", "tracknumber"),
    ("TPOS", "discnumber"),
    ("TCON", "genre"),
    ("TCOM", "composer"),
    ("TENC", "encodedby"),
    ("TSSE", "encodersettings"),
    ("TCOP", "copyright"),
    ("TPUB", "publisher"),
    ("TBPM", "bpm"),
    ("TSRC", "isrc"),
    ("COMM", "comment"),
];

/// Comment key for a frame id; unknown frames use the lower-cased id
pub fn comment_key(frame_id: &str) -> String {
    FRAME_KEYS
        .iter()
        .find(|(id, _)| *id == frame_id)
        .map_or_else(|| frame_id.to_ascii_lowercase(), |(_, key)| (*key).to_string())
}

/// Split `data` on encoding-aware NUL terminators
fn split_terminated(data: &[u8], encoding: TextEncoding) -> Vec<&[u8]> {
    let step = encoding.terminator_len();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while index + step <= data.len() {
        if data[index..index + step].iter().all(|&b| b == 0) {
            parts.push(&data[start..index]);
            start = index + step;
        }
        index += step;
    }
    if start < data.len() {
        parts.push(&data[start..]);
    }
    parts
}

/// Decode a text frame into its values.
///
/// ID3v2.4 separates multiple values with NUL; empty values are dropped.
pub fn decode_text_frame(data: &[u8]) -> Vec<String> {
    let Some((&first, text)) = data.split_first() else {
        return Vec::new();
    };
    let encoding = TextEncoding::from_byte(first);
    split_terminated(text, encoding)
        .into_iter()
        .map(|part| encoding.charset().decode(part).trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Decode a user text frame into `(description, values)`
pub fn decode_user_text_frame(data: &[u8]) -> Option<(String, Vec<String>)> {
    let (&first, text) = data.split_first()?;
    let encoding = TextEncoding::from_byte(first);
    let parts = split_terminated(text, encoding);
    let (description, values) = parts.split_first()?;
    let values = values
        .iter()
        .map(|part| encoding.charset().decode(part).trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    Some((encoding.charset().decode(description).trim().to_string(), values))
}

/// Decode a COMM frame: encoding, 3-byte language, description, text
pub fn decode_comment_frame(data: &[u8]) -> Option<String> {
    let (&first, rest) = data.split_first()?;
    let encoding = TextEncoding::from_byte(first);
    let body = rest.get(3..)?;
    let parts = split_terminated(body, encoding);
    let text = parts.get(1).copied().unwrap_or_default();
    let text = encoding.charset().decode(text).trim().to_string();
    (!text.is_empty()).then_some(text)
}
