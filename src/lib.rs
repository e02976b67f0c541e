// Sonde - container demultiplexing and media metadata extraction
//
// Feed any seekable input to `analyze` and get a `MetadataRecord` back:
// format, audio properties, tags and the errors and warnings found on the
// way. Ogg streams are walked page by page and packet by packet, FLAC
// streams block by block. Other media, image and archive formats are
// identified by signature only.

pub mod dispatch;
pub mod error;
pub mod flac;
pub mod id3;
pub mod ogg;
pub mod options;
pub mod opus;
pub mod record;
pub mod source;
pub mod utils;

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

pub use dispatch::{analyze_embedded, detect, Context, FormatKind};
pub use error::{Error, Result};
pub use flac::{Picture, PictureType, VorbisComment};
pub use options::AnalyzeOptions;
pub use record::{AudioInfo, Diagnostic, MetadataRecord};
pub use source::ByteSource;

use id3::{Id3v2Header, ID3V2_HEADER_LEN};

/// Analyze a seekable input with the given options
pub fn analyze<R: Read + Seek>(reader: R, length_hint: Option<u64>, options: &AnalyzeOptions) -> MetadataRecord {
    dispatch::analyze(reader, length_hint, options)
}

/// Analyze an in-memory buffer
pub fn analyze_bytes(bytes: &[u8], options: &AnalyzeOptions) -> MetadataRecord {
    let len = bytes.len() as u64;
    dispatch::analyze(Cursor::new(bytes), Some(len), options)
}

/// Analyze a file with default options
pub fn analyze_file(path: impl AsRef<Path>) -> Result<MetadataRecord> {
    MediaFile::open(path)?.analyze()
}

/// A media file on disk
#[derive(Debug, Clone)]
pub struct MediaFile {
    path: PathBuf,
    options: AnalyzeOptions,
}

impl MediaFile {
    /// Open a file for analysis; fails when it cannot be read
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::open(&path)?;
        Ok(MediaFile {
            path,
            options: AnalyzeOptions::default(),
        })
    }

    pub fn with_options(mut self, options: AnalyzeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn source(&self) -> Result<ByteSource<BufReader<File>>> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        Ok(ByteSource::new(BufReader::new(file), Some(len))?)
    }

    /// Identify the format from its signature, looking past a leading ID3v2 tag
    pub fn detect(&self) -> Result<Option<FormatKind>> {
        let mut source = self.source()?;
        let header = source.peek(ID3V2_HEADER_LEN)?;
        if let Some(tag) = Id3v2Header::parse(&header) {
            source.seek(tag.total_size());
        }
        let prefix = source.peek(dispatch::PREFIX_LEN)?;
        Ok(detect(&prefix).map(|probe| probe.kind))
    }

    /// Run a full analysis
    pub fn analyze(&self) -> Result<MetadataRecord> {
        let source = self.source()?;
        let len = source.total_len();
        Ok(analyze(source.into_inner(), Some(len), &self.options))
    }

    /// Current Vorbis comment, from a FLAC block or an Ogg comment header
    pub fn read_comment(&self) -> Result<Option<VorbisComment>> {
        let record = self.analyze()?;
        let from_flac = record.flac.and_then(|flac| flac.vorbis_comment);
        Ok(from_flac.or_else(|| record.ogg.and_then(|ogg| ogg.comment)))
    }

    /// Front cover if present, otherwise the first embedded picture
    pub fn extract_cover(&self) -> Result<Option<Picture>> {
        let options = AnalyzeOptions {
            keep_picture_data: true,
            ..self.options.clone()
        };
        let record = self.clone().with_options(options).analyze()?;
        let mut pictures: Vec<Picture> = record.flac.map(|flac| flac.pictures).unwrap_or_default();
        pictures.extend(record.ogg.map(|ogg| ogg.pictures).unwrap_or_default());

        let front = pictures
            .iter()
            .position(|picture| picture.picture_type == PictureType::CoverFront)
            .unwrap_or(0);
        Ok((front < pictures.len()).then(|| pictures.swap_remove(front)))
    }

    /// Replace the Vorbis comment of a native FLAC file
    pub fn write_comments(&self, comment: &VorbisComment) -> Result<()> {
        flac::write::write_vorbis_comment(&self.path, comment)
    }
}
