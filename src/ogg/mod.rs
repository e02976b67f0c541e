// Ogg container support
//
// OGG File Structure:
// - Pages: "OggS" header, segment table, payload (see `page`)
// - Packets: segments joined across pages (see `packet`)
// - The first packet identifies the codec; the following header packets
//   carry the Vorbis comment and codec setup
// - Audio packets
//
// The last page's granule position gives the total sample count.

pub mod crc;
pub mod packet;
pub mod page;
pub mod speex;
pub mod vorbis;

use serde::Serialize;
use std::io::{self, Read, Seek};
use tracing::debug;

use crate::dispatch::{analyze_embedded, Context};
use crate::flac::metadata::{BLOCK_HEADER_LEN, FLAC_SIGNATURE};
use crate::flac::picture::pictures_from_comment;
use crate::flac::{Picture, VorbisComment};
use crate::opus::{self, OpusHead, OPUS_GRANULE_RATE, OPUS_SIGNATURE};
use crate::record::{BitrateMode, Fragment};
use crate::source::ByteSource;
use crate::utils::be_uint;

pub use packet::{Packet, PacketReader};
pub use page::{find_last_page, Page, PageFlags, PageHeader, PageReader, OGG_SIGNATURE};
pub use speex::SpeexHeader;
pub use vorbis::VorbisIdentification;

/// First bytes of a FLAC-in-Ogg mapping header
pub const FLAC_MAPPING_PREFIX: &[u8; 5] = b"\x7FFLAC";
const FLAC_MAPPING_HEADER_LEN: usize = 9;
const VORBIS_SETUP_PREFIX: &[u8; 7] = b"\x05vorbis";
const LAST_BLOCK_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OggCodec {
    Vorbis,
    Opus,
    Flac,
    Speex,
}

impl OggCodec {
    /// Identify the codec from the first packet of a logical stream
    pub fn identify(packet: &[u8]) -> Option<Self> {
        if packet.starts_with(vorbis::IDENTIFICATION_PREFIX) {
            Some(OggCodec::Vorbis)
        } else if packet.starts_with(OPUS_SIGNATURE) {
            Some(OggCodec::Opus)
        } else if packet.starts_with(FLAC_MAPPING_PREFIX) {
            Some(OggCodec::Flac)
        } else if packet.starts_with(speex::SPEEX_SIGNATURE) {
            Some(OggCodec::Speex)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OggCodec::Vorbis => "vorbis",
            OggCodec::Opus => "opus",
            OggCodec::Flac => "flac",
            OggCodec::Speex => "speex",
        }
    }
}

/// FLAC-in-Ogg mapping header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlacMapping {
    pub major_version: u8,
    pub minor_version: u8,
    /// Header packets after the first one; 0 means unknown
    pub header_packets: u16,
}

/// What the Ogg handler learned about the first logical stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OggInfo {
    pub codec: OggCodec,
    pub serial: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vorbis: Option<VorbisIdentification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opus: Option<OpusHead>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speex: Option<SpeexHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flac_mapping: Option<FlacMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<VorbisComment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pictures: Vec<Picture>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_granule: Option<i64>,
    /// Playable samples at the codec's granule rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
    /// Leading page headers, for diagnostics
    pub page_headers: Vec<PageHeader>,
}

impl OggInfo {
    fn new(codec: OggCodec, serial: u32) -> Self {
        OggInfo {
            codec,
            serial,
            vorbis: None,
            opus: None,
            speex: None,
            flac_mapping: None,
            comment: None,
            pictures: Vec::new(),
            final_granule: None,
            samples: None,
            page_headers: Vec::new(),
        }
    }
}

/// Analyze an Ogg stream starting at the cursor
pub fn analyze<R: Read + Seek>(source: &mut ByteSource<R>, ctx: &Context) -> Fragment {
    let mut fragment = Fragment::default();
    if let Err(err) = read_stream(source, ctx, &mut fragment) {
        fragment
            .diagnostics
            .error(format!("failed to read Ogg stream: {err}"));
    }
    fragment
}

fn read_stream<R: Read + Seek>(source: &mut ByteSource<R>, ctx: &Context, fragment: &mut Fragment) -> io::Result<()> {
    let start = source.position();
    let mut reader = PacketReader::new(source, ctx.options);
    let Some(first) = reader.next_packet(&mut fragment.diagnostics)? else {
        fragment.diagnostics.error_at(start, "no Ogg page found");
        return Ok(());
    };
    let Some(codec) = OggCodec::identify(&first.data) else {
        let head = &first.data[..first.data.len().min(8)];
        fragment.diagnostics.error_at(
            first.offset(),
            format!("unsupported Ogg codec, first packet starts with {:?}", String::from_utf8_lossy(head)),
        );
        return Ok(());
    };
    if let Some(page) = reader.page_headers().first() {
        if !page.flags.first_page {
            fragment
                .diagnostics
                .warn_at(page.offset, "first Ogg page lacks the beginning-of-stream flag");
        }
    }
    let serial = reader.serial().unwrap_or_default();
    debug!(codec = codec.name(), serial, "Ogg logical stream");

    let mut info = OggInfo::new(codec, serial);
    let mut fallback_playtime = None;
    let parsed = match codec {
        OggCodec::Vorbis => read_vorbis(&mut reader, &first, &mut info, ctx, fragment)?,
        OggCodec::Opus => read_opus(&mut reader, &first, &mut info, ctx, fragment)?,
        OggCodec::Speex => read_speex(&mut reader, &first, &mut info, ctx, fragment)?,
        OggCodec::Flac => {
            fallback_playtime = read_flac(&mut reader, &first, &mut info, ctx, fragment)?;
            info.flac_mapping.is_some()
        }
    };
    fragment.avdataoffset = Some(reader.position());
    info.page_headers = reader.into_page_headers();

    if parsed {
        read_duration(source, ctx, &mut info, fragment)?;
        if fragment.playtime_seconds.is_none() {
            fragment.playtime_seconds = fallback_playtime;
        }
    }
    fragment.ogg = Some(info);
    Ok(())
}

/// Record a decoded comment header in the fragment
fn adopt_comment(comment: VorbisComment, offset: u64, info: &mut OggInfo, ctx: &Context, fragment: &mut Fragment) {
    let diagnostics = &mut fragment.diagnostics;
    for entry in &comment.invalid {
        diagnostics.warn_at(offset, format!("comment entry without '=' ignored: {entry:?}"));
    }
    info.pictures = pictures_from_comment(&comment, ctx.options.keep_picture_data, diagnostics);
    fragment.audio.encoder = Some(comment.vendor_string.clone());
    let comments = comment.to_comments();
    if !comments.is_empty() {
        fragment.tags.insert("vorbiscomment".to_string(), comments);
    }
    info.comment = Some(comment);
}

/// Next header packet, reporting a missing or truncated one
fn header_packet<R: Read + Seek>(
    reader: &mut PacketReader<'_, R>,
    what: &str,
    fragment: &mut Fragment,
) -> io::Result<Option<Packet>> {
    let position = reader.position();
    match reader.next_packet(&mut fragment.diagnostics)? {
        Some(packet) if packet.complete => Ok(Some(packet)),
        Some(packet) => {
            fragment
                .diagnostics
                .error_at(packet.offset(), format!("{what} packet truncated at end of data"));
            Ok(None)
        }
        None => {
            fragment.diagnostics.warn_at(position, format!("{what} packet missing"));
            Ok(None)
        }
    }
}

fn read_vorbis<R: Read + Seek>(
    reader: &mut PacketReader<'_, R>,
    first: &Packet,
    info: &mut OggInfo,
    ctx: &Context,
    fragment: &mut Fragment,
) -> io::Result<bool> {
    let id = match VorbisIdentification::parse(&first.data) {
        Ok(id) => id,
        Err(err) => {
            fragment.diagnostics.error_at(first.offset(), format!("invalid Vorbis identification header: {err}"));
            return Ok(false);
        }
    };
    let diagnostics = &mut fragment.diagnostics;
    if id.version != 0 {
        diagnostics.warn_at(first.offset(), format!("unexpected Vorbis version {}", id.version));
    }
    if !id.framing {
        diagnostics.warn_at(first.offset(), "Vorbis identification header framing bit not set");
    }
    if id.sample_rate == 0 {
        diagnostics.error_at(first.offset(), "Vorbis sample rate is zero");
    }
    let audio = &mut fragment.audio;
    audio.dataformat = Some("vorbis".to_string());
    audio.sample_rate = (id.sample_rate > 0).then_some(id.sample_rate);
    audio.channels = Some(id.channels);
    audio.bitrate = id.nominal_bitrate();
    audio.bitrate_mode = Some(id.bitrate_mode());
    info.vorbis = Some(id);

    if let Some(packet) = header_packet(reader, "Vorbis comment", fragment)? {
        match vorbis::parse_comment_packet(&packet.data) {
            Ok((comment, framing)) => {
                if !framing {
                    fragment
                        .diagnostics
                        .warn_at(packet.offset(), "Vorbis comment header framing bit not set");
                }
                adopt_comment(comment, packet.offset(), info, ctx, fragment);
            }
            Err(err) => fragment
                .diagnostics
                .error_at(packet.offset(), format!("invalid Vorbis comment header: {err}")),
        }
    }
    if let Some(packet) = header_packet(reader, "Vorbis setup", fragment)? {
        if !packet.data.starts_with(VORBIS_SETUP_PREFIX) {
            fragment
                .diagnostics
                .warn_at(packet.offset(), "third Vorbis packet is not a setup header");
        }
    }
    Ok(true)
}

fn read_opus<R: Read + Seek>(
    reader: &mut PacketReader<'_, R>,
    first: &Packet,
    info: &mut OggInfo,
    ctx: &Context,
    fragment: &mut Fragment,
) -> io::Result<bool> {
    let head = match OpusHead::parse(&first.data) {
        Ok(head) => head,
        Err(err) => {
            fragment.diagnostics.error_at(first.offset(), format!("invalid OpusHead: {err}"));
            return Ok(false);
        }
    };
    let audio = &mut fragment.audio;
    audio.dataformat = Some("opus".to_string());
    audio.sample_rate = Some(OPUS_GRANULE_RATE);
    audio.channels = Some(head.channels);
    audio.bitrate_mode = Some(BitrateMode::Vbr);
    info.opus = Some(head);

    if let Some(packet) = header_packet(reader, "OpusTags", fragment)? {
        match opus::parse_tags_packet(&packet.data) {
            Ok(comment) => adopt_comment(comment, packet.offset(), info, ctx, fragment),
            Err(err) => fragment
                .diagnostics
                .error_at(packet.offset(), format!("invalid OpusTags packet: {err}")),
        }
    }
    Ok(true)
}

fn read_speex<R: Read + Seek>(
    reader: &mut PacketReader<'_, R>,
    first: &Packet,
    info: &mut OggInfo,
    ctx: &Context,
    fragment: &mut Fragment,
) -> io::Result<bool> {
    let header = match SpeexHeader::parse(&first.data) {
        Ok(header) => header,
        Err(err) => {
            fragment.diagnostics.error_at(first.offset(), format!("invalid Speex header: {err}"));
            return Ok(false);
        }
    };
    let audio = &mut fragment.audio;
    audio.dataformat = Some("speex".to_string());
    audio.encoder = Some(format!("Speex {}", header.version));
    audio.sample_rate = (header.sample_rate > 0).then_some(header.sample_rate);
    audio.channels = u8::try_from(header.channels).ok();
    audio.bitrate = (header.bitrate > 0).then(|| f64::from(header.bitrate));
    audio.bitrate_mode = Some(if header.vbr { BitrateMode::Vbr } else { BitrateMode::Cbr });
    let extra_headers = header.extra_headers;
    info.speex = Some(header);

    if let Some(packet) = header_packet(reader, "Speex comment", fragment)? {
        match VorbisComment::parse(&packet.data) {
            Ok(comment) => adopt_comment(comment, packet.offset(), info, ctx, fragment),
            Err(err) => fragment
                .diagnostics
                .error_at(packet.offset(), format!("invalid Speex comment packet: {err}")),
        }
    }
    for _ in 0..extra_headers {
        if header_packet(reader, "Speex extra header", fragment)?.is_none() {
            break;
        }
    }
    Ok(true)
}

/// Rebuild the native FLAC metadata chain from the mapping's header packets
/// and analyze it as an embedded stream. Returns the embedded STREAMINFO
/// duration for use when the granule position gives none.
fn read_flac<R: Read + Seek>(
    reader: &mut PacketReader<'_, R>,
    first: &Packet,
    info: &mut OggInfo,
    ctx: &Context,
    fragment: &mut Fragment,
) -> io::Result<Option<f64>> {
    let data = &first.data;
    let chain_start = FLAC_MAPPING_HEADER_LEN + FLAC_SIGNATURE.len();
    if data.len() < chain_start + BLOCK_HEADER_LEN || &data[FLAC_MAPPING_HEADER_LEN..chain_start] != FLAC_SIGNATURE {
        fragment
            .diagnostics
            .error_at(first.offset(), "invalid FLAC-in-Ogg mapping header");
        return Ok(None);
    }
    let mapping = FlacMapping {
        major_version: data[5],
        minor_version: data[6],
        header_packets: be_uint(data, 7, 2) as u16,
    };
    if mapping.major_version != 1 {
        fragment.diagnostics.warn_at(
            first.offset(),
            format!("unexpected FLAC-in-Ogg mapping version {}.{}", mapping.major_version, mapping.minor_version),
        );
    }
    info.flac_mapping = Some(mapping);

    let mut buffer = data[FLAC_MAPPING_HEADER_LEN..].to_vec();
    let mut last_header_at = FLAC_SIGNATURE.len();
    let mut terminated = buffer[last_header_at] & LAST_BLOCK_FLAG != 0;
    let mut read = 0u16;
    while !terminated && (mapping.header_packets == 0 || read < mapping.header_packets) {
        let Some(packet) = header_packet(reader, "FLAC metadata", fragment)? else {
            break;
        };
        read += 1;
        let Some(&first_byte) = packet.data.first() else {
            continue;
        };
        last_header_at = buffer.len();
        terminated = first_byte & LAST_BLOCK_FLAG != 0;
        buffer.extend_from_slice(&packet.data);
    }
    if !terminated {
        fragment
            .diagnostics
            .warn("FLAC-in-Ogg header packets end without a last-metadata-block flag");
        buffer[last_header_at] |= LAST_BLOCK_FLAG;
    }

    let nested = analyze_embedded(buffer, ctx);
    fragment
        .diagnostics
        .extend_prefixed("embedded FLAC: ", &nested.errors, &nested.warnings);
    fragment.audio = nested.audio;
    fragment.tags.extend(nested.tags);
    if let Some(mut flac) = nested.flac {
        // Audio frames live in Ogg pages, not after the rebuilt chain
        flac.audio_offset = None;
        fragment.flac = Some(flac);
    }
    Ok(nested.playtime_seconds)
}

/// Total samples from the last page's granule position
fn read_duration<R: Read + Seek>(
    source: &mut ByteSource<R>,
    ctx: &Context,
    info: &mut OggInfo,
    fragment: &mut Fragment,
) -> io::Result<()> {
    let window = ctx.options.eos_scan_window;
    let Some(last) = find_last_page(source, window, Some(info.serial))? else {
        fragment.diagnostics.warn(format!(
            "last Ogg page not found in the final {window} bytes, duration undetermined"
        ));
        return Ok(());
    };
    if !last.flags.last_page {
        fragment
            .diagnostics
            .warn_at(last.offset, "last Ogg page lacks the end-of-stream flag");
    }
    let granule = last.granule_position;
    info.final_granule = Some(granule);

    let (samples, rate) = match &info.opus {
        Some(head) => (head.playable_samples(granule), Some(OPUS_GRANULE_RATE)),
        None => (granule, fragment.audio.sample_rate),
    };
    if samples <= 0 {
        fragment.diagnostics.warn_at(
            last.offset,
            format!("final granule position {granule} gives no samples, duration undetermined"),
        );
        return Ok(());
    }
    info.samples = Some(samples as u64);
    if let Some(rate) = rate.filter(|rate| *rate > 0) {
        fragment.playtime_seconds = Some(samples as f64 / f64::from(rate));
    }
    Ok(())
}
