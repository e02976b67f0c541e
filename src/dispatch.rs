// Format detection and handler dispatch
//
// The data region is narrowed around ID3 tags, a bounded prefix is matched
// against the signature table, and the detected format's handler output is
// folded into the record. Embedded streams re-enter the same path.

use serde::Serialize;
use std::fmt;
use std::io::{self, Read, Seek};
use tracing::debug;

use crate::flac;
use crate::id3::{Id3v1Tag, Id3v2Header, Id3v2Tag, ID3V1_TAG_LEN, ID3V2_HEADER_LEN};
use crate::ogg;
use crate::options::AnalyzeOptions;
use crate::record::{Diagnostics, MetadataRecord};
use crate::source::ByteSource;

/// Bytes read for signature matching; covers the ISO-9660 marker at 32 769
pub const PREFIX_LEN: usize = 32_774;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    // Audio
    Ac3,
    Adif,
    Adts,
    Au,
    Avr,
    Bonk,
    Dss,
    Dts,
    Flac,
    La,
    Lpac,
    Midi,
    Mac,
    It,
    Xm,
    S3m,
    Mpc,
    Mp3,
    Ofr,
    Rkau,
    Shn,
    Tta,
    Voc,
    Vqf,
    Wv,
    // Audio-video
    Asf,
    Bink,
    Flv,
    Matroska,
    Mpeg,
    Nsv,
    Ogg,
    Quicktime,
    Riff,
    Real,
    Swf,
    // Graphic
    Bmp,
    Gif,
    Jpeg,
    Pcd,
    Png,
    Svg,
    Tiff,
    // Archive and misc
    Iso9660,
    Rar,
    Szip,
    Tar,
    Gzip,
    Zip,
    Par2,
    Pdf,
    MsOffice,
}

impl FormatKind {
    pub fn name(self) -> &'static str {
        match self {
            FormatKind::Ac3 => "ac3",
            FormatKind::Adif => "adif",
            FormatKind::Adts => "adts",
            FormatKind::Au => "au",
            FormatKind::Avr => "avr",
            FormatKind::Bonk => "bonk",
            FormatKind::Dss => "dss",
            FormatKind::Dts => "dts",
            FormatKind::Flac => "flac",
            FormatKind::La => "la",
            FormatKind::Lpac => "lpac",
            FormatKind::Midi => "midi",
            FormatKind::Mac => "mac",
            FormatKind::It => "it",
            FormatKind::Xm => "xm",
            FormatKind::S3m => "s3m",
            FormatKind::Mpc => "mpc",
            FormatKind::Mp3 => "mp3",
            FormatKind::Ofr => "ofr",
            FormatKind::Rkau => "rkau",
            FormatKind::Shn => "shn",
            FormatKind::Tta => "tta",
            FormatKind::Voc => "voc",
            FormatKind::Vqf => "vqf",
            FormatKind::Wv => "wv",
            FormatKind::Asf => "asf",
            FormatKind::Bink => "bink",
            FormatKind::Flv => "flv",
            FormatKind::Matroska => "matroska",
            FormatKind::Mpeg => "mpeg",
            FormatKind::Nsv => "nsv",
            FormatKind::Ogg => "ogg",
            FormatKind::Quicktime => "quicktime",
            FormatKind::Riff => "riff",
            FormatKind::Real => "real",
            FormatKind::Swf => "swf",
            FormatKind::Bmp => "bmp",
            FormatKind::Gif => "gif",
            FormatKind::Jpeg => "jpeg",
            FormatKind::Pcd => "pcd",
            FormatKind::Png => "png",
            FormatKind::Svg => "svg",
            FormatKind::Tiff => "tiff",
            FormatKind::Iso9660 => "iso9660",
            FormatKind::Rar => "rar",
            FormatKind::Szip => "szip",
            FormatKind::Tar => "tar",
            FormatKind::Gzip => "gzip",
            FormatKind::Zip => "zip",
            FormatKind::Par2 => "par2",
            FormatKind::Pdf => "pdf",
            FormatKind::MsOffice => "msoffice",
        }
    }

    /// Whether this crate decodes the format's structure
    pub fn has_analyzer(self) -> bool {
        matches!(self, FormatKind::Flac | FormatKind::Ogg)
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do when ID3 tags surround a format that should not carry them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Id3Policy {
    Allow,
    Warn,
    Reject,
}

/// Accepted values for one byte of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    Is(u8),
    /// Any byte inside one of the inclusive ranges
    In(&'static [(u8, u8)]),
}

impl ByteClass {
    pub fn matches(self, byte: u8) -> bool {
        match self {
            ByteClass::Is(value) => byte == value,
            ByteClass::In(ranges) => ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&byte)),
        }
    }
}

/// What a probe looks for, starting at its offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Bytes(&'static [u8]),
    Classes(&'static [ByteClass]),
    /// The bytes anywhere from the offset to the end of the prefix
    Anywhere(&'static [u8]),
}

impl Pattern {
    /// The pattern as plain bytes, when it is anchored and exact
    pub fn literal(self) -> Option<&'static [u8]> {
        match self {
            Pattern::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn matches(self, data: &[u8]) -> bool {
        match self {
            Pattern::Bytes(bytes) => data.starts_with(bytes),
            Pattern::Classes(classes) => {
                data.len() >= classes.len() && classes.iter().zip(data).all(|(class, &byte)| class.matches(byte))
            }
            Pattern::Anywhere(bytes) => data.windows(bytes.len()).any(|w| w == bytes),
        }
    }
}

/// One signature: `pattern` must match at `offset` in the prefix
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub offset: usize,
    pub pattern: Pattern,
    pub kind: FormatKind,
    pub mime: &'static str,
    pub id3_policy: Id3Policy,
}

impl Probe {
    pub fn matches(&self, prefix: &[u8]) -> bool {
        prefix.get(self.offset..).is_some_and(|data| self.pattern.matches(data))
    }
}

const fn probe(offset: usize, pattern: Pattern, kind: FormatKind, mime: &'static str, id3_policy: Id3Policy) -> Probe {
    Probe {
        offset,
        pattern,
        kind,
        mime,
        id3_policy,
    }
}

use ByteClass::{In, Is};
use FormatKind as K;
use Id3Policy::{Allow, Reject, Warn};
use Pattern::{Anywhere, Bytes, Classes};

const OCTET: &str = "application/octet-stream";

/// MPEG audio frame sync: layer and version bits, then a usable bitrate index
const MP3_SYNC: &[ByteClass] = &[
    Is(0xFF),
    In(&[(0xE2, 0xE7), (0xF2, 0xF7), (0xFA, 0xFF)]),
    In(&[(0x00, 0xEB)]),
];

const ADTS_SYNC: &[ByteClass] = &[Is(0xFF), In(&[(0xF0, 0xF1), (0xF8, 0xF9)])];

/// Musepack SV7 and earlier have no magic, only a plausible first header word
const MPC_OLD: &[ByteClass] = &[
    In(&[
        (0x00, 0x01),
        (0x10, 0x11),
        (0x40, 0x41),
        (0x50, 0x51),
        (0x80, 0x81),
        (0x90, 0x91),
        (0xC0, 0xC1),
        (0xD0, 0xD1),
    ]),
    In(&[(0x20, 0x37)]),
    In(&[
        (0x00, 0x00),
        (0x20, 0x20),
        (0x40, 0x40),
        (0x60, 0x60),
        (0x80, 0x80),
        (0xA0, 0xA0),
        (0xC0, 0xC0),
        (0xE0, 0xE0),
    ]),
];

const LA_VERSION: &[ByteClass] = &[Is(b'L'), Is(b'A'), Is(b'0'), In(&[(b'2', b'4')])];
const NSV_MAGIC: &[ByteClass] = &[Is(b'N'), Is(b'S'), Is(b'V'), In(&[(b's', b's'), (b'f', b'f')])];

const OCTAL: ByteClass = In(&[(b'0', b'9'), (b' ', b' ')]);
const OCTAL_OR_NUL: ByteClass = In(&[(b'0', b'9'), (b' ', b' '), (0, 0)]);

/// ustar/v7 header from byte 100: mode, uid and gid as NUL-terminated
/// octal, then size and mtime
const TAR_FIELDS: [ByteClass; 48] = tar_fields();

const fn tar_fields() -> [ByteClass; 48] {
    let mut fields = [OCTAL; 48];
    fields[7] = Is(0);
    fields[15] = Is(0);
    fields[23] = Is(0);
    let mut i = 24;
    while i < 48 {
        fields[i] = OCTAL_OR_NUL;
        i += 1;
    }
    fields
}

/// Signature table, first match wins.
///
/// A pattern that another pattern at the same offset starts with must come
/// after it.
pub const PROBES: &[Probe] = &[
    // Audio
    probe(0, Bytes(b"\x0B\x77"), K::Ac3, "audio/ac3", Allow),
    probe(0, Bytes(b"ADIF"), K::Adif, OCTET, Allow),
    probe(0, Classes(ADTS_SYNC), K::Adts, OCTET, Allow),
    probe(0, Bytes(b".snd"), K::Au, "audio/basic", Allow),
    probe(0, Bytes(b"2BIT"), K::Avr, OCTET, Allow),
    probe(0, Bytes(b"\x00BONK"), K::Bonk, "audio/xmms-bonk", Allow),
    probe(0, Bytes(b"\x00INFO"), K::Bonk, "audio/xmms-bonk", Allow),
    probe(0, Bytes(b"\x00META"), K::Bonk, "audio/xmms-bonk", Allow),
    probe(0, Bytes(b"\x00 ID3"), K::Bonk, "audio/xmms-bonk", Allow),
    probe(0, Bytes(b"\x02dss"), K::Dss, OCTET, Allow),
    probe(0, Bytes(b"\x7F\xFE\x80\x01"), K::Dts, "audio/dts", Allow),
    probe(0, Bytes(b"fLaC"), K::Flac, "audio/x-flac", Allow),
    probe(0, Classes(LA_VERSION), K::La, OCTET, Allow),
    probe(0, Bytes(b"LPAC"), K::Lpac, OCTET, Allow),
    probe(0, Bytes(b"MThd"), K::Midi, "audio/midi", Allow),
    probe(0, Bytes(b"MAC "), K::Mac, OCTET, Allow),
    probe(0, Bytes(b"IMPM"), K::It, "audio/it", Allow),
    probe(0, Bytes(b"Extended Module"), K::Xm, "audio/xm", Allow),
    probe(44, Bytes(b"SCRM"), K::S3m, "audio/s3m", Allow),
    probe(0, Bytes(b"MPCK"), K::Mpc, "audio/x-musepack", Allow),
    probe(0, Bytes(b"MP+"), K::Mpc, "audio/x-musepack", Allow),
    probe(0, Classes(MPC_OLD), K::Mpc, "audio/x-musepack", Allow),
    probe(0, Classes(MP3_SYNC), K::Mp3, "audio/mpeg", Allow),
    probe(0, Bytes(b"*RIFF"), K::Ofr, OCTET, Allow),
    probe(0, Bytes(b"OFR"), K::Ofr, OCTET, Allow),
    probe(0, Bytes(b"RKA"), K::Rkau, OCTET, Allow),
    probe(0, Bytes(b"ajkg"), K::Shn, "audio/xmms-shn", Reject),
    probe(0, Bytes(b"TTA"), K::Tta, OCTET, Allow),
    probe(0, Bytes(b"Creative Voice File"), K::Voc, "audio/voc", Allow),
    probe(0, Bytes(b"TWIN"), K::Vqf, OCTET, Allow),
    probe(0, Bytes(b"wvpk"), K::Wv, OCTET, Allow),
    // Audio-video
    probe(
        0,
        Bytes(b"\x30\x26\xB2\x75\x8E\x66\xCF\x11\xA6\xD9\x00\xAA\x00\x62\xCE\x6C"),
        K::Asf,
        "video/x-ms-asf",
        Allow,
    ),
    probe(0, Bytes(b"BIK"), K::Bink, OCTET, Allow),
    probe(0, Bytes(b"SMK"), K::Bink, OCTET, Allow),
    probe(0, Bytes(b"FLV\x01"), K::Flv, "video/x-flv", Allow),
    probe(0, Bytes(b"\x1A\x45\xDF\xA3"), K::Matroska, "video/x-matroska", Allow),
    probe(0, Bytes(b"\x00\x00\x01\xBA"), K::Mpeg, "video/mpeg", Allow),
    probe(0, Bytes(b"\x00\x00\x01\xB3"), K::Mpeg, "video/mpeg", Allow),
    probe(0, Classes(NSV_MAGIC), K::Nsv, OCTET, Allow),
    probe(0, Bytes(b"OggS"), K::Ogg, "application/ogg", Warn),
    probe(4, Bytes(b"cmov"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"free"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"ftyp"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"mdat"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"moov"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"pnot"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"skip"), K::Quicktime, "video/quicktime", Allow),
    probe(4, Bytes(b"wide"), K::Quicktime, "video/quicktime", Allow),
    probe(0, Bytes(b"RIFF"), K::Riff, "audio/x-wave", Allow),
    probe(0, Bytes(b"SDSS"), K::Riff, "audio/x-wave", Allow),
    probe(0, Bytes(b"FORM"), K::Riff, "audio/x-wave", Allow),
    probe(0, Bytes(b".RMF"), K::Real, "audio/x-realaudio", Allow),
    probe(0, Bytes(b".ra"), K::Real, "audio/x-realaudio", Allow),
    probe(0, Bytes(b"FWS"), K::Swf, "application/x-shockwave-flash", Allow),
    probe(0, Bytes(b"CWS"), K::Swf, "application/x-shockwave-flash", Allow),
    // Graphic
    probe(0, Bytes(b"BM"), K::Bmp, "image/bmp", Reject),
    probe(0, Bytes(b"GIF"), K::Gif, "image/gif", Reject),
    probe(0, Bytes(b"\xFF\xD8\xFF"), K::Jpeg, "image/jpeg", Reject),
    probe(2048, Bytes(b"PCD_IPI\x00"), K::Pcd, "image/x-photo-cd", Reject),
    probe(0, Bytes(b"\x89PNG\x0D\x0A\x1A\x0A"), K::Png, "image/png", Reject),
    probe(0, Anywhere(b"<!DOCTYPE svg PUBLIC "), K::Svg, "image/svg+xml", Reject),
    probe(0, Bytes(b"II\x2A\x00"), K::Tiff, "image/tiff", Reject),
    probe(0, Bytes(b"MM\x00\x2A"), K::Tiff, "image/tiff", Reject),
    // Archive and misc
    probe(32_769, Bytes(b"CD001"), K::Iso9660, OCTET, Reject),
    probe(0, Bytes(b"Rar!"), K::Rar, OCTET, Reject),
    probe(0, Bytes(b"SZ\x0A\x04"), K::Szip, OCTET, Reject),
    probe(100, Classes(&TAR_FIELDS), K::Tar, "application/x-tar", Reject),
    probe(0, Bytes(b"\x1F\x8B\x08"), K::Gzip, "application/x-gzip", Reject),
    probe(0, Bytes(b"PK\x03\x04"), K::Zip, "application/zip", Reject),
    probe(0, Bytes(b"PAR2\x00PKT"), K::Par2, OCTET, Reject),
    probe(0, Bytes(b"%PDF"), K::Pdf, "application/pdf", Reject),
    probe(0, Bytes(b"\xD0\xCF\x11\xE0"), K::MsOffice, OCTET, Reject),
];

/// Match a data prefix against [`PROBES`]
pub fn detect(prefix: &[u8]) -> Option<&'static Probe> {
    PROBES.iter().find(|probe| probe.matches(prefix))
}

/// Per-call analysis state handed to every handler
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub options: &'a AnalyzeOptions,
    /// 0 for the outermost input
    pub depth: usize,
}

impl<'a> Context<'a> {
    pub fn new(options: &'a AnalyzeOptions) -> Self {
        Context { options, depth: 0 }
    }

    pub fn nested(&self) -> Self {
        Context {
            options: self.options,
            depth: self.depth + 1,
        }
    }
}

/// Analyze a seekable input.
///
/// Never fails: problems reading or decoding the input end up in the
/// record's `errors` and `warnings` next to whatever was extracted.
pub fn analyze<R: Read + Seek>(reader: R, length_hint: Option<u64>, options: &AnalyzeOptions) -> MetadataRecord {
    match ByteSource::new(reader, length_hint) {
        Ok(mut source) => analyze_source(&mut source, &Context::new(options)),
        Err(err) => failed(format!("unable to open input: {err}")),
    }
}

/// Re-dispatch an embedded payload as a stream of its own
pub fn analyze_embedded(bytes: Vec<u8>, ctx: &Context) -> MetadataRecord {
    let nested = ctx.nested();
    if nested.depth > ctx.options.max_nesting_depth {
        return failed(format!(
            "embedded stream nested deeper than {} levels",
            ctx.options.max_nesting_depth
        ));
    }
    debug!(depth = nested.depth, len = bytes.len(), "analyzing embedded stream");
    let mut source = ByteSource::from_bytes(bytes);
    analyze_source(&mut source, &nested)
}

/// Analyze from the source's current data region
pub fn analyze_source<R: Read + Seek>(source: &mut ByteSource<R>, ctx: &Context) -> MetadataRecord {
    let mut record = MetadataRecord {
        filesize: source.total_len(),
        avdataoffset: source.data_start(),
        avdataend: source.data_end(),
        ..Default::default()
    };
    let mut diagnostics = Diagnostics::default();
    if let Err(err) = run(source, ctx, &mut record, &mut diagnostics) {
        diagnostics.error(format!("read failed: {err}"));
    }
    // The source shrinks if the reader ended before the hinted length
    record.filesize = source.total_len();
    record.avdataend = record.avdataend.min(source.data_end());
    record.avdataoffset = record.avdataoffset.min(record.avdataend);
    record.finalize(diagnostics);
    record
}

fn failed(message: String) -> MetadataRecord {
    let mut diagnostics = Diagnostics::default();
    diagnostics.error(message);
    let mut record = MetadataRecord::default();
    record.finalize(diagnostics);
    record
}

fn run<R: Read + Seek>(
    source: &mut ByteSource<R>,
    ctx: &Context,
    record: &mut MetadataRecord,
    diagnostics: &mut Diagnostics,
) -> io::Result<()> {
    let mut id3_present = false;
    if ctx.depth == 0 {
        if ctx.options.tag_id3v2 {
            id3_present |= read_id3v2(source, record, diagnostics)?;
        }
        if ctx.options.tag_id3v1 {
            id3_present |= read_id3v1(source, record)?;
        }
    }
    record.avdataoffset = source.data_start();
    record.avdataend = source.data_end();
    source.seek(source.data_start());

    let prefix = source.peek(PREFIX_LEN)?;
    let Some(probe) = detect(&prefix) else {
        diagnostics.error("unable to determine file format");
        return Ok(());
    };
    debug!(format = %probe.kind, depth = ctx.depth, "format detected");
    record.format = Some(probe.kind);
    record.mime_type = Some(probe.mime.to_string());

    if id3_present {
        match probe.id3_policy {
            Id3Policy::Allow => {}
            Id3Policy::Warn => diagnostics.warn("ID3 tags not allowed on this file type"),
            Id3Policy::Reject => {
                diagnostics.error("ID3 tags not allowed on this file type");
                return Ok(());
            }
        }
    }

    let fragment = match probe.kind {
        FormatKind::Flac => flac::analyze(source, ctx),
        FormatKind::Ogg => ogg::analyze(source, ctx),
        other => {
            diagnostics.warn(format!("no structural analyzer for {other} data"));
            return Ok(());
        }
    };
    record.merge(fragment, diagnostics);
    Ok(())
}

/// Leading ID3v2 tag: record it and move `data_start` past it
fn read_id3v2<R: Read + Seek>(
    source: &mut ByteSource<R>,
    record: &mut MetadataRecord,
    diagnostics: &mut Diagnostics,
) -> io::Result<bool> {
    let start = source.data_start();
    let bytes = source.read_at(start, ID3V2_HEADER_LEN)?;
    let Some(header) = Id3v2Header::parse(&bytes) else {
        return Ok(false);
    };
    let end = start + header.total_size();
    if end > source.data_end() {
        diagnostics.warn_at(start, "ID3v2 tag extends past end of data");
    }
    let body = source.read_at(start + ID3V2_HEADER_LEN as u64, header.size as usize)?;
    let tag = Id3v2Tag::parse(header, &body, diagnostics);
    let comments = tag.to_comments();
    if !comments.is_empty() {
        record.tags.insert("id3v2".to_string(), comments);
    }
    debug!(size = header.total_size(), "ID3v2 tag");
    record.id3v2 = Some(header);
    source.narrow(end, source.data_end());
    Ok(true)
}

/// Trailing ID3v1 tag: record it and move `data_end` before it
fn read_id3v1<R: Read + Seek>(source: &mut ByteSource<R>, record: &mut MetadataRecord) -> io::Result<bool> {
    let (start, end) = (source.data_start(), source.data_end());
    if end - start < ID3V1_TAG_LEN as u64 {
        return Ok(false);
    }
    let tag_start = end - ID3V1_TAG_LEN as u64;
    let bytes = source.read_at(tag_start, ID3V1_TAG_LEN)?;
    let Some(tag) = Id3v1Tag::parse(&bytes) else {
        return Ok(false);
    };
    let comments = tag.to_comments();
    if !comments.is_empty() {
        record.tags.insert("id3v1".to_string(), comments);
    }
    record.id3v1 = Some(tag);
    source.narrow(start, tag_start);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(detect(b"fLaC\x00").map(|p| p.kind), Some(FormatKind::Flac));
        assert_eq!(detect(b"\x00\x00\x00\x20ftypM4A ").map(|p| p.kind), Some(FormatKind::Quicktime));
        assert_eq!(detect(b"BM\x00\x00").map(|p| p.mime), Some("image/bmp"));
        assert!(detect(b"fLa").is_none());
        assert!(detect(&[]).is_none());
    }

    #[test]
    fn test_byte_classes() {
        let class = ByteClass::In(&[(0x10, 0x1F), (0xF0, 0xFF)]);
        assert!(class.matches(0x10) && class.matches(0x1F) && class.matches(0xFF));
        assert!(!class.matches(0x20) && !class.matches(0x0F));
        assert!(Pattern::Anywhere(b"svg").matches(b"<!-- svg -->"));
        assert!(!Pattern::Classes(&[ByteClass::Is(1), ByteClass::Is(2)]).matches(&[1]));
    }

    #[test]
    fn test_iso_marker_needs_full_prefix() {
        let mut prefix = vec![0u8; PREFIX_LEN];
        prefix[32_769..32_774].copy_from_slice(b"CD001");
        assert_eq!(detect(&prefix).map(|p| p.kind), Some(FormatKind::Iso9660));
        assert!(detect(&prefix[..32_770]).is_none());
    }

    #[test]
    fn test_nesting_limit() {
        let options = AnalyzeOptions {
            max_nesting_depth: 0,
            ..Default::default()
        };
        let record = analyze_embedded(b"fLaC".to_vec(), &Context::new(&options));
        assert_eq!(record.errors.len(), 1);
        assert!(record.format.is_none());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(FormatKind::MsOffice.to_string(), "msoffice");
        assert_eq!(serde_json::to_value(FormatKind::Iso9660).unwrap(), "iso9660");
    }
}
