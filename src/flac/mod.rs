// Native FLAC streams
//
// The `fLaC` marker, a chain of metadata blocks, then audio frames. Only the
// chain is decoded; the audio region is measured, never parsed. FLAC-in-Ogg
// reuses the same chain reader through an embedded buffer.

pub mod cuesheet;
pub mod metadata;
pub mod picture;
pub mod seektable;
pub mod streaminfo;
pub mod vorbis;
pub mod write;

use serde::Serialize;
use std::io::{Read, Seek};
use tracing::debug;

use crate::dispatch::Context;
use crate::error::{Error, Result};
use crate::record::{BitrateMode, Diagnostics, Fragment};
use crate::source::ByteSource;

pub use cuesheet::CueSheet;
pub use metadata::{BlockChain, BlockHeader, BlockType, MetadataBlock, FLAC_SIGNATURE};
pub use picture::{Picture, PictureType};
pub use seektable::{SeekPoint, SeekTable};
pub use streaminfo::StreamInfo;
pub use vorbis::VorbisComment;

/// APPLICATION block summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    /// Registered 4-byte application id
    pub id: String,
    pub offset: u64,
    pub data_len: usize,
}

/// Block with a reserved or invalid type, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownBlock {
    pub type_code: u8,
    pub offset: u64,
    #[serde(serialize_with = "picture::serialize_base64")]
    pub data: Vec<u8>,
}

/// Everything decoded from a FLAC metadata chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlacInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaminfo: Option<StreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seektable: Option<SeekTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vorbis_comment: Option<VorbisComment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuesheet: Option<CueSheet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pictures: Vec<Picture>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<Application>,
    /// Total bytes of PADDING blocks
    pub padding: u64,
    /// Chain summary in stream order
    pub blocks: Vec<BlockHeader>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_blocks: Vec<UnknownBlock>,
    /// First byte after the metadata chain, when the chain terminated properly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_offset: Option<u64>,
}

/// Analyze a native FLAC stream starting at the cursor
pub fn analyze<R: Read + Seek>(source: &mut ByteSource<R>, ctx: &Context) -> Fragment {
    let mut fragment = Fragment::default();
    match read_metadata(source, ctx, &mut fragment.diagnostics) {
        Ok(Some(info)) => summarize(info, &mut fragment),
        Ok(None) => {}
        Err(err) => fragment
            .diagnostics
            .error(format!("failed to read FLAC metadata: {err}")),
    }
    fragment
}

/// Read the marker and the whole metadata chain.
///
/// Returns `Ok(None)` when the marker is missing. A broken chain is reported
/// and whatever was decoded before the break is kept.
pub fn read_metadata<R: Read + Seek>(
    source: &mut ByteSource<R>,
    ctx: &Context,
    diagnostics: &mut Diagnostics,
) -> Result<Option<FlacInfo>> {
    let start = source.position();
    let magic = source.read(FLAC_SIGNATURE.len())?;
    if magic != FLAC_SIGNATURE {
        diagnostics.error_at(
            start,
            format!("expecting \"fLaC\", found \"{}\"", String::from_utf8_lossy(&magic)),
        );
        return Ok(None);
    }

    let mut info = FlacInfo::default();
    let mut chain = BlockChain::new(source);
    while let Some(block) = chain.next() {
        match block {
            Ok(block) => decode_block(block, &mut info, ctx, diagnostics),
            Err(Error::Io(err)) => return Err(err.into()),
            Err(err) => {
                diagnostics.error_at(chain.position(), format!("metadata block chain broken: {err}"));
                break;
            }
        }
    }
    if chain.terminated() {
        info.audio_offset = Some(chain.position());
    }
    Ok(Some(info))
}

fn decode_block(block: MetadataBlock, info: &mut FlacInfo, ctx: &Context, diagnostics: &mut Diagnostics) {
    let MetadataBlock { header, data } = block;
    let offset = header.offset;
    debug!(offset, block = header.block_type.name(), length = header.length, "decoding metadata block");
    info.blocks.push(header);

    match header.block_type {
        BlockType::StreamInfo => match StreamInfo::parse(&data) {
            Ok(_) if info.streaminfo.is_some() => {
                diagnostics.warn_at(offset, "duplicate STREAMINFO block ignored")
            }
            Ok(streaminfo) => info.streaminfo = Some(streaminfo),
            Err(err) => diagnostics.error_at(offset, format!("invalid STREAMINFO block: {err}")),
        },
        BlockType::Padding => info.padding += u64::from(header.length),
        BlockType::Application => match data.get(..4) {
            Some(id) => info.applications.push(Application {
                id: String::from_utf8_lossy(id).into_owned(),
                offset,
                data_len: data.len() - 4,
            }),
            None => diagnostics.warn_at(offset, "APPLICATION block shorter than its id"),
        },
        BlockType::SeekTable => {
            let table = SeekTable::parse(&data);
            if table.trailing_bytes > 0 {
                diagnostics.warn_at(
                    offset,
                    format!("SEEKTABLE has {} trailing bytes after the last seek point", table.trailing_bytes),
                );
            }
            info.seektable = Some(table);
        }
        BlockType::VorbisComment => match VorbisComment::parse(&data) {
            Ok(comment) => {
                for entry in &comment.invalid {
                    diagnostics.warn_at(offset, format!("comment entry without '=' ignored: {entry:?}"));
                }
                info.pictures.extend(picture::pictures_from_comment(
                    &comment,
                    ctx.options.keep_picture_data,
                    diagnostics,
                ));
                if info.vorbis_comment.is_some() {
                    diagnostics.warn_at(offset, "duplicate VORBIS_COMMENT block ignored");
                } else {
                    info.vorbis_comment = Some(comment);
                }
            }
            Err(err) => diagnostics.error_at(offset, format!("invalid VORBIS_COMMENT block: {err}")),
        },
        BlockType::CueSheet => match CueSheet::parse(&data) {
            Ok(cuesheet) => info.cuesheet = Some(cuesheet),
            Err(err) => diagnostics.error_at(offset, format!("invalid CUESHEET block: {err}")),
        },
        BlockType::Picture => match Picture::parse(&data) {
            Ok(mut picture) => {
                if !ctx.options.keep_picture_data {
                    picture.data = Vec::new();
                }
                info.pictures.push(picture);
            }
            Err(err) => diagnostics.error_at(offset, format!("invalid PICTURE block: {err}")),
        },
        BlockType::Reserved(_) | BlockType::Invalid => {
            let type_code = header.block_type.to_byte();
            diagnostics.warn_at(
                offset,
                format!("unrecognized metadata block type {type_code}, {} bytes skipped", header.length),
            );
            info.unknown_blocks.push(UnknownBlock { type_code, offset, data });
        }
    }
}

/// Fill the cross-format namespaces of `fragment` from decoded metadata
pub(crate) fn summarize(info: FlacInfo, fragment: &mut Fragment) {
    let diagnostics = &mut fragment.diagnostics;
    let audio = &mut fragment.audio;
    audio.dataformat = Some("flac".to_string());
    audio.lossless = true;
    audio.bitrate_mode = Some(BitrateMode::Vbr);
    fragment.avdataoffset = info.audio_offset;

    match &info.streaminfo {
        None => diagnostics.error("STREAMINFO block missing, duration and bitrate cannot be derived"),
        Some(streaminfo) if streaminfo.sample_rate == 0 => {
            diagnostics.error("STREAMINFO sample rate is zero, duration and bitrate cannot be derived")
        }
        Some(streaminfo) => {
            audio.sample_rate = Some(streaminfo.sample_rate);
            audio.channels = Some(streaminfo.channels);
            audio.bits_per_sample = Some(streaminfo.bits_per_sample);
            fragment.playtime_seconds = streaminfo.duration();
            if fragment.playtime_seconds.is_none() {
                diagnostics.warn("total sample count not set in STREAMINFO, duration undetermined");
            }
            if streaminfo.md5.is_none() {
                diagnostics.warn("STREAMINFO MD5 signature is not set");
            }
        }
    }
    if let Some(first) = info.blocks.first() {
        if first.block_type != BlockType::StreamInfo {
            diagnostics.warn_at(first.offset, "first metadata block is not STREAMINFO");
        }
    }

    if let Some(comment) = &info.vorbis_comment {
        audio.encoder = Some(comment.vendor_string.clone());
        let comments = comment.to_comments();
        if !comments.is_empty() {
            fragment.tags.insert("vorbiscomment".to_string(), comments);
        }
    }
    fragment.flac = Some(info);
}
