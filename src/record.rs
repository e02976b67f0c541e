// The metadata record produced by an analysis
//
// Handlers return a `Fragment` with their own namespaces and diagnostics;
// the dispatcher merges it into the record and runs the shared
// post-processing in `MetadataRecord::finalize`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::dispatch::FormatKind;
use crate::flac::FlacInfo;
use crate::id3::{Id3v1Tag, Id3v2Header};
use crate::ogg::OggInfo;

/// Lower-cased comment key to its ordered values.
pub type Comments = BTreeMap<String, Vec<String>>;

/// A single error or warning, tagged with the absolute offset it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at offset {})", self.message, offset),
            None => f.write_str(&self.message),
        }
    }
}

/// The two-severity diagnostic channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn error(&mut self, message: impl Into<String>) {
        self.push_error(None, message.into());
    }

    pub fn error_at(&mut self, offset: u64, message: impl Into<String>) {
        self.push_error(Some(offset), message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push_warning(None, message.into());
    }

    pub fn warn_at(&mut self, offset: u64, message: impl Into<String>) {
        self.push_warning(Some(offset), message.into());
    }

    fn push_error(&mut self, offset: Option<u64>, message: String) {
        warn!(?offset, "{message}");
        self.errors.push(Diagnostic { offset, message });
    }

    fn push_warning(&mut self, offset: Option<u64>, message: String) {
        debug!(?offset, "{message}");
        self.warnings.push(Diagnostic { offset, message });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Append another channel, keeping its order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Append another channel with every message prefixed.
    ///
    /// Used when a nested analysis reports back: its offsets are relative to
    /// the embedded buffer, so they are dropped.
    pub fn extend_prefixed(&mut self, prefix: &str, errors: &[Diagnostic], warnings: &[Diagnostic]) {
        for diagnostic in errors {
            self.error(format!("{prefix}{diagnostic}"));
        }
        for diagnostic in warnings {
            self.warn(format!("{prefix}{diagnostic}"));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Mono,
    Stereo,
    Multichannel,
}

impl ChannelMode {
    pub fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            0 => None,
            1 => Some(ChannelMode::Mono),
            2 => Some(ChannelMode::Stereo),
            _ => Some(ChannelMode::Multichannel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateMode {
    Cbr,
    Vbr,
    Abr,
}

/// Normalised cross-format audio fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioInfo {
    /// Codec identifier such as `vorbis`, `opus` or `flac`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataformat: Option<String>,
    /// Encoder or vendor string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channelmode: Option<ChannelMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_mode: Option<BitrateMode>,
    pub lossless: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
}

/// Output of one format handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub audio: AudioInfo,
    /// Start of the audio payload once the handler has read past its headers
    pub avdataoffset: Option<u64>,
    pub playtime_seconds: Option<f64>,
    /// Tag store name (e.g. `vorbiscomment`) to its comments
    pub tags: BTreeMap<String, Comments>,
    pub flac: Option<FlacInfo>,
    pub ogg: Option<OggInfo>,
    pub diagnostics: Diagnostics,
}

/// Tag stores in the order their values are copied into `comments`.
const TAG_PRIORITY: &[&str] = &["vorbiscomment", "id3v2", "id3v1"];

/// Everything an analysis learned about one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub filesize: u64,
    /// First byte of the audio/video data region
    pub avdataoffset: u64,
    /// One past the last byte of the data region
    pub avdataend: u64,
    pub audio: AudioInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playtime_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playtime_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Comments>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub comments: Comments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id3v1: Option<Id3v1Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id3v2: Option<Id3v2Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flac: Option<FlacInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ogg: Option<OggInfo>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl MetadataRecord {
    /// Encoder/vendor string, if any handler found one.
    pub fn vendor(&self) -> Option<&str> {
        self.audio.encoder.as_deref()
    }

    /// Merged comment values for `key`, looked up case-insensitively.
    pub fn comment(&self, key: &str) -> Option<&[String]> {
        self.comments.get(&key.to_lowercase()).map(Vec::as_slice)
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold a handler's fragment into the record.
    pub(crate) fn merge(&mut self, fragment: Fragment, diagnostics: &mut Diagnostics) {
        self.audio = fragment.audio;
        if let Some(offset) = fragment.avdataoffset {
            self.avdataoffset = offset.clamp(self.avdataoffset, self.avdataend);
        }
        self.playtime_seconds = fragment.playtime_seconds;
        self.tags.extend(fragment.tags);
        self.flac = fragment.flac;
        self.ogg = fragment.ogg;
        diagnostics.extend(fragment.diagnostics);
    }

    /// Derive the cross-format fields and attach the diagnostics.
    pub(crate) fn finalize(&mut self, diagnostics: Diagnostics) {
        let data_len = self.avdataend.saturating_sub(self.avdataoffset) as f64;
        let playtime = self.playtime_seconds.filter(|p| *p > 0.0);

        if let Some(channels) = self.audio.channels {
            self.audio.channelmode = self.audio.channelmode.or(ChannelMode::from_channels(channels));
        }

        if self.bitrate.is_none() {
            self.bitrate = match playtime {
                Some(playtime) if data_len > 0.0 => Some(data_len * 8.0 / playtime),
                _ => self.audio.bitrate,
            };
        }
        if self.audio.bitrate.is_none() {
            self.audio.bitrate = self.bitrate;
        }
        if self.playtime_seconds.is_none() && data_len > 0.0 {
            if let Some(bitrate) = self.bitrate.filter(|b| *b > 0.0) {
                self.playtime_seconds = Some(data_len * 8.0 / bitrate);
            }
        }
        self.playtime_string = self.playtime_seconds.map(playtime_string);

        if let (Some(bitrate), Some(channels), Some(rate)) =
            (self.audio.bitrate, self.audio.channels, self.audio.sample_rate)
        {
            let depth = self.audio.bits_per_sample.unwrap_or(16);
            let raw = f64::from(channels) * f64::from(rate) * f64::from(depth);
            if raw > 0.0 {
                self.audio.compression_ratio = Some(bitrate / raw);
            }
        }

        self.copy_tags_to_comments();
        self.errors = diagnostics.errors;
        self.warnings = diagnostics.warnings;
    }

    fn copy_tags_to_comments(&mut self) {
        let mut stores: Vec<&String> = TAG_PRIORITY
            .iter()
            .filter_map(|name| self.tags.get_key_value(*name).map(|(key, _)| key))
            .collect();
        stores.extend(self.tags.keys().filter(|key| !TAG_PRIORITY.contains(&key.as_str())));

        let mut merged = Comments::new();
        for store in stores {
            for (key, values) in &self.tags[store] {
                for value in values {
                    let value = value.trim();
                    if value.is_empty() {
                        continue;
                    }
                    let slot = merged.entry(key.to_lowercase()).or_default();
                    if !slot.iter().any(|existing| existing == value) {
                        slot.push(value.to_string());
                    }
                }
            }
        }
        merged.retain(|_, values| !values.is_empty());
        self.comments = merged;
    }
}

/// Render seconds as `m:ss`, or `h:mm:ss` from one hour up.
pub fn playtime_string(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
