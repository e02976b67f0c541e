// ID3v1 tag implementation
//
// 128-byte trailer: "TAG", title (30), artist (30), album (30), year (4),
// comment (30), genre (1). ID3v1.1 stores the track number in the last
// comment byte when the one before it is zero.

use serde::Serialize;

use crate::record::Comments;
use crate::utils::encoding::{decode_fixed, Charset};

pub const ID3V1_TAG_LEN: usize = 128;
const ID3V1_ID: &[u8; 3] = b"TAG";

/// Genre names by ID3v1 genre byte, Winamp extensions included
pub const GENRES: [&str; 148] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop",
    "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap",
    "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska", "Death Metal", "Pranks",
    "Soundtrack", "Euro-Techno", "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance",
    "Classical", "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise",
    "Alt. Rock", "Bass", "Soul", "Punk", "Space", "Meditative", "Instrumental Pop", "Instrumental Rock",
    "Ethnic", "Gothic", "Darkwave", "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream",
    "Southern Rock", "Comedy", "Cult", "Gangsta Rap", "Top 40", "Christian Rap", "Pop/Funk", "Jungle",
    "Native American", "Cabaret", "New Wave", "Psychedelic", "Rave", "Showtunes", "Trailer", "Lo-Fi",
    "Tribal", "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical", "Rock & Roll", "Hard Rock",
    "Folk", "Folk/Rock", "National Folk", "Swing", "Fast-Fusion", "Bebob", "Latin", "Revival",
    "Celtic", "Bluegrass", "Avantgarde", "Gothic Rock", "Progressive Rock", "Psychedelic Rock", "Symphonic Rock", "Slow Rock",
    "Big Band", "Chorus", "Easy Listening", "Acoustic", "Humour", "Speech", "Chanson", "Opera",
    "Chamber Music", "Sonata", "Symphony", "Booty Bass", "Primus", "Porn Groove", "Satire", "Slow Jam",
    "Club", "Tango", "Samba", "Folklore", "Ballad", "Power Ballad", "Rhythmic Soul", "Freestyle",
    "Duet", "Punk Rock", "Drum Solo", "A Cappella", "Euro-House", "Dance Hall", "Goa", "Drum & Bass",
    "Club-House", "Hardcore", "Terror", "Indie", "BritPop", "Negerpunk", "Polsk Punk", "Beat",
    "Christian Gangsta Rap", "Heavy Metal", "Black Metal", "Crossover", "Contemporary Christian", "Christian Rock", "Merengue", "Salsa",
    "Thrash Metal", "Anime", "JPop", "Synthpop",
];

/// Name for an ID3v1 genre byte; 255 means unset
pub fn genre_name(genre: u8) -> Option<&'static str> {
    GENRES.get(usize::from(genre)).copied()
}

/// ID3v1 tag structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u8>,
    pub genre_id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl Id3v1Tag {
    /// Parse the trailing 128 bytes; `None` unless they start with "TAG"
    pub fn parse(buffer: &[u8]) -> Option<Self> {
        if buffer.len() != ID3V1_TAG_LEN || &buffer[..3] != ID3V1_ID {
            return None;
        }
        let field = |range: std::ops::Range<usize>| decode_fixed(&buffer[range], Charset::Latin1);

        let (comment, track) = if buffer[125] == 0 && buffer[126] != 0 {
            (field(97..125), Some(buffer[126]))
        } else {
            (field(97..127), None)
        };
        let genre_id = buffer[127];

        Some(Id3v1Tag {
            title: field(3..33),
            artist: field(33..63),
            album: field(63..93),
            year: field(93..97),
            comment,
            track,
            genre_id,
            genre: genre_name(genre_id).map(str::to_string),
        })
    }

    pub fn to_comments(&self) -> Comments {
        let mut comments = Comments::new();
        let track = self.track.map(|track| track.to_string());
        let fields = [
            ("title", Some(&self.title)),
            ("artist", Some(&self.artist)),
            ("album", Some(&self.album)),
            ("year", Some(&self.year)),
            ("comment", Some(&self.comment)),
            ("tracknumber", track.as_ref()),
            ("genre", self.genre.as_ref()),
        ];
        for (key, value) in fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                comments.insert(key.to_string(), vec![value.clone()]);
            }
        }
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(track: Option<u8>) -> Vec<u8> {
        let mut buffer = vec![0u8; ID3V1_TAG_LEN];
        buffer[..3].copy_from_slice(b"TAG");
        buffer[3..8].copy_from_slice(b"Title");
        buffer[33..39].copy_from_slice(b"Artist");
        buffer[93..97].copy_from_slice(b"1999");
        buffer[97..104].copy_from_slice(b"Comment");
        if let Some(track) = track {
            buffer[126] = track;
        } else {
            buffer[126] = b'!';
            buffer[125] = b'!';
        }
        buffer[127] = 17;
        buffer
    }

    #[test]
    fn test_v11_track() {
        let parsed = Id3v1Tag::parse(&tag(Some(7))).unwrap();
        assert_eq!(parsed.title, "Title");
        assert_eq!(parsed.track, Some(7));
        assert_eq!(parsed.comment, "Comment");
        assert_eq!(parsed.genre.as_deref(), Some("Rock"));

        let comments = parsed.to_comments();
        assert_eq!(comments["tracknumber"], vec!["7"]);
        assert!(!comments.contains_key("album"));
    }

    #[test]
    fn test_v10_comment_keeps_last_bytes() {
        let parsed = Id3v1Tag::parse(&tag(None)).unwrap();
        assert_eq!(parsed.track, None);
        assert!(parsed.comment.ends_with("!!"));
    }

    #[test]
    fn test_genre_table() {
        assert_eq!(GENRES.len(), 148);
        assert_eq!(genre_name(0), Some("Blues"));
        assert_eq!(genre_name(147), Some("Synthpop"));
        assert_eq!(genre_name(255), None);
    }

    #[test]
    fn test_rejects_other_trailers() {
        assert!(Id3v1Tag::parse(&[0u8; 128]).is_none());
        assert!(Id3v1Tag::parse(b"TAG").is_none());
    }
}
