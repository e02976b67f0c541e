// Text transcoding fallbacks

use encoding_rs::{mem, Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// Character sets understood by the fallback transcoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Strict ISO-8859-1: every byte is the code point of the same value
    Latin1,
    Utf8,
    /// UTF-16 with byte-order mark; little-endian when the mark is missing
    Utf16,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    /// Decode `data`, replacing malformed sequences with U+FFFD.
    pub fn decode(self, data: &[u8]) -> String {
        match self {
            Charset::Latin1 => mem::decode_latin1(data).into_owned(),
            Charset::Utf8 => decode_with(UTF_8, data),
            Charset::Utf16 => match data {
                [0xFE, 0xFF, rest @ ..] => decode_with(UTF_16BE, rest),
                [0xFF, 0xFE, rest @ ..] => decode_with(UTF_16LE, rest),
                _ => decode_with(UTF_16LE, data),
            },
            Charset::Utf16Le => decode_with(UTF_16LE, data),
            Charset::Utf16Be => decode_with(UTF_16BE, data),
        }
    }
}

fn decode_with(encoding: &'static Encoding, data: &[u8]) -> String {
    encoding.decode_with_bom_removal(data).0.into_owned()
}

/// Encode `text` into `charset`.
///
/// `bom` prepends a byte-order mark for the Unicode charsets; [`Charset::Utf16`]
/// always carries one. Characters Latin-1 cannot represent become `?`.
pub fn encode(text: &str, charset: Charset, bom: bool) -> Vec<u8> {
    match charset {
        Charset::Latin1 => text.chars().map(latin1_byte).collect(),
        Charset::Utf8 => {
            let mut out = if bom { vec![0xEF, 0xBB, 0xBF] } else { Vec::new() };
            out.extend_from_slice(text.as_bytes());
            out
        }
        Charset::Utf16 | Charset::Utf16Le => {
            let mark = bom || charset == Charset::Utf16;
            let mut out = if mark { vec![0xFF, 0xFE] } else { Vec::new() };
            out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
            out
        }
        Charset::Utf16Be => {
            let mut out = if bom { vec![0xFE, 0xFF] } else { Vec::new() };
            out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            out
        }
    }
}

fn latin1_byte(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(b'?')
}

/// Decode from one charset and re-encode into another.
pub fn transcode(data: &[u8], from: Charset, to: Charset, bom: bool) -> Vec<u8> {
    encode(&from.decode(data), to, bom)
}

/// Decode a fixed-width field, stopping at the first NUL and trimming spaces.
pub fn decode_fixed(data: &[u8], charset: Charset) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    charset.decode(&data[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1() {
        assert_eq!(Charset::Latin1.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");
        assert_eq!(encode("café", Charset::Latin1, false), vec![0x63, 0x61, 0x66, 0xE9]);
        assert_eq!(encode("a€b", Charset::Latin1, false), b"a?b".to_vec());
        // C1 controls map straight through, no windows-1252 punctuation
        assert_eq!(Charset::Latin1.decode(&[0x80, 0x9F]), "\u{0080}\u{009F}");
        assert_eq!(encode("\u{0080}", Charset::Latin1, false), vec![0x80]);
        assert_eq!(encode("日本", Charset::Latin1, false), b"??".to_vec());
    }

    #[test]
    fn test_utf16_bom_detection() {
        assert_eq!(Charset::Utf16.decode(&[0xFF, 0xFE, 0x41, 0x00]), "A");
        assert_eq!(Charset::Utf16.decode(&[0xFE, 0xFF, 0x00, 0x41]), "A");
        assert_eq!(Charset::Utf16.decode(&[0x41, 0x00]), "A");
    }

    #[test]
    fn test_encode_utf16() {
        assert_eq!(encode("A", Charset::Utf16, false), vec![0xFF, 0xFE, 0x41, 0x00]);
        assert_eq!(encode("A", Charset::Utf16Be, false), vec![0x00, 0x41]);
        assert_eq!(encode("A", Charset::Utf16Be, true), vec![0xFE, 0xFF, 0x00, 0x41]);
        // Surrogate pair
        assert_eq!(encode("\u{1F3B5}", Charset::Utf16Le, false), vec![0x3C, 0xD8, 0xB5, 0xDF]);
    }

    #[test]
    fn test_transcode() {
        let utf16 = transcode("Señor".as_bytes(), Charset::Utf8, Charset::Utf16Be, false);
        assert_eq!(Charset::Utf16Be.decode(&utf16), "Señor");
        let latin = transcode(&utf16, Charset::Utf16Be, Charset::Latin1, false);
        assert_eq!(latin, vec![0x53, 0x65, 0xF1, 0x6F, 0x72]);
    }

    #[test]
    fn test_utf8_bom_removed() {
        assert_eq!(Charset::Utf8.decode(&[0xEF, 0xBB, 0xBF, b'h', b'i']), "hi");
        assert_eq!(encode("hi", Charset::Utf8, true), vec![0xEF, 0xBB, 0xBF, b'h', b'i']);
    }

    #[test]
    fn test_decode_fixed() {
        assert_eq!(decode_fixed(b"Title  \0garbage", Charset::Latin1), "Title");
    }
}
