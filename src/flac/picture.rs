// FLAC PICTURE block implementation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use std::io::{self, Cursor};

use super::vorbis::{VorbisComment, METADATA_BLOCK_PICTURE};
use crate::record::Diagnostics;
use crate::utils::io::{read_be_string, read_be_u32, read_bytes};

/// Picture types according to FLAC specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PictureType {
    Other = 0,
    FileIcon = 1,
    OtherFileIcon = 2,
    CoverFront = 3,
    CoverBack = 4,
    LeafletPage = 5,
    Media = 6,
    LeadArtist = 7,
    Artist = 8,
    Conductor = 9,
    Band = 10,
    Composer = 11,
    Lyricist = 12,
    RecordingLocation = 13,
    DuringRecording = 14,
    DuringPerformance = 15,
    VideoScreenCapture = 16,
    BrightColouredFish = 17,
    Illustration = 18,
    BandLogo = 19,
    PublisherLogo = 20,
}

impl PictureType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => PictureType::FileIcon,
            2 => PictureType::OtherFileIcon,
            3 => PictureType::CoverFront,
            4 => PictureType::CoverBack,
            5 => PictureType::LeafletPage,
            6 => PictureType::Media,
            7 => PictureType::LeadArtist,
            8 => PictureType::Artist,
            9 => PictureType::Conductor,
            10 => PictureType::Band,
            11 => PictureType::Composer,
            12 => PictureType::Lyricist,
            13 => PictureType::RecordingLocation,
            14 => PictureType::DuringRecording,
            15 => PictureType::DuringPerformance,
            16 => PictureType::VideoScreenCapture,
            17 => PictureType::BrightColouredFish,
            18 => PictureType::Illustration,
            19 => PictureType::BandLogo,
            20 => PictureType::PublisherLogo,
            _ => PictureType::Other,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PictureType::Other => "Other",
            PictureType::FileIcon => "File Icon",
            PictureType::OtherFileIcon => "Other File Icon",
            PictureType::CoverFront => "Cover (front)",
            PictureType::CoverBack => "Cover (back)",
            PictureType::LeafletPage => "Leaflet page",
            PictureType::Media => "Media",
            PictureType::LeadArtist => "Lead artist",
            PictureType::Artist => "Artist",
            PictureType::Conductor => "Conductor",
            PictureType::Band => "Band",
            PictureType::Composer => "Composer",
            PictureType::Lyricist => "Lyricist",
            PictureType::RecordingLocation => "Recording Location",
            PictureType::DuringRecording => "During recording",
            PictureType::DuringPerformance => "During performance",
            PictureType::VideoScreenCapture => "Video screen capture",
            PictureType::BrightColouredFish => "Bright coloured fish",
            PictureType::Illustration => "Illustration",
            PictureType::BandLogo => "Band logo",
            PictureType::PublisherLogo => "Publisher logo",
        }
    }
}

pub(crate) fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

/// PICTURE block, native or carried in a `METADATA_BLOCK_PICTURE` comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Picture {
    pub picture_type: PictureType,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub colors: u32,
    /// Declared length of the image data, kept when the data itself is dropped
    pub data_len: usize,
    #[serde(serialize_with = "serialize_base64", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl Picture {
    /// Read a PICTURE block payload
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);

        let picture_type = PictureType::from_u32(read_be_u32(&mut cursor)?);
        let mime_type = read_be_string(&mut cursor)?;
        let description = read_be_string(&mut cursor)?;
        let width = read_be_u32(&mut cursor)?;
        let height = read_be_u32(&mut cursor)?;
        let depth = read_be_u32(&mut cursor)?;
        let colors = read_be_u32(&mut cursor)?;
        let data_len = read_be_u32(&mut cursor)? as usize;
        let data = read_bytes(&mut cursor, data_len)?;

        Ok(Picture {
            picture_type,
            mime_type,
            description,
            width,
            height,
            depth,
            colors,
            data_len,
            data,
        })
    }

    /// Decode the value of a `METADATA_BLOCK_PICTURE` comment
    pub fn from_base64(value: &str) -> io::Result<Self> {
        let raw = STANDARD
            .decode(value.trim())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Self::parse(&raw)
    }

    /// Get file extension based on MIME type
    pub fn get_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "bin",
        }
    }

    /// Encode to the block payload layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.mime_type.len() + self.description.len() + self.data.len());
        out.extend_from_slice(&(self.picture_type as u32).to_be_bytes());
        out.extend_from_slice(&(self.mime_type.len() as u32).to_be_bytes());
        out.extend_from_slice(self.mime_type.as_bytes());
        out.extend_from_slice(&(self.description.len() as u32).to_be_bytes());
        out.extend_from_slice(self.description.as_bytes());
        for value in [self.width, self.height, self.depth, self.colors] {
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Create a front cover picture from image data
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, description: impl Into<String>) -> Self {
        Picture {
            picture_type: PictureType::CoverFront,
            mime_type: mime_type.into(),
            description: description.into(),
            width: 0,
            height: 0,
            depth: 0,
            colors: 0,
            data_len: data.len(),
            data,
        }
    }
}

/// Decode every `METADATA_BLOCK_PICTURE` entry of a comment block
pub(crate) fn pictures_from_comment(
    comment: &VorbisComment,
    keep_data: bool,
    diagnostics: &mut Diagnostics,
) -> Vec<Picture> {
    let mut pictures = Vec::new();
    for value in comment.get_all(METADATA_BLOCK_PICTURE) {
        match Picture::from_base64(value) {
            Ok(mut picture) => {
                if !keep_data {
                    picture.data = Vec::new();
                }
                pictures.push(picture);
            }
            Err(err) => diagnostics.warn(format!("undecodable {METADATA_BLOCK_PICTURE} comment: {err}")),
        }
    }
    pictures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block() {
        let mut picture = Picture::new(vec![0x89, b'P', b'N', b'G'], "image/png", "front");
        picture.width = 300;
        picture.height = 200;
        let parsed = Picture::parse(&picture.to_bytes()).unwrap();
        assert_eq!(parsed, picture);
        assert_eq!(parsed.get_extension(), "png");
        assert_eq!(parsed.picture_type.description(), "Cover (front)");
    }

    #[test]
    fn test_from_base64_comment() {
        let picture = Picture::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg", "");
        let encoded = STANDARD.encode(picture.to_bytes());
        assert_eq!(Picture::from_base64(&encoded).unwrap().data, vec![0xFF, 0xD8, 0xFF]);
        assert!(Picture::from_base64("!!not base64!!").is_err());
    }

    #[test]
    fn test_data_serializes_as_base64() {
        let picture = Picture::new(vec![1, 2, 3], "image/png", "");
        let json = serde_json::to_value(&picture).unwrap();
        assert_eq!(json["data"], "AQID");
        assert_eq!(json["picture_type"], "CoverFront");
    }
}
