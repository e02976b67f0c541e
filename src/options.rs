// Analysis options

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Largest possible Ogg page: 27-byte header, 255 lacing values, 255 * 255 payload bytes.
pub const MAX_OGG_PAGE_LEN: u64 = 27 + 255 + 255 * 255;

/// Knobs for a single analysis call.
///
/// Every field has a default, so a JSON options file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    /// Look for a leading ID3v2 tag and exclude it from the data region
    pub tag_id3v2: bool,
    /// Look for a trailing ID3v1 tag and exclude it from the data region
    pub tag_id3v1: bool,
    /// Verify the CRC of every Ogg page that is read
    pub verify_page_checksums: bool,
    /// Forward search budget when looking for the next Ogg page marker
    pub page_scan_window: u64,
    /// Backward search budget when looking for the last Ogg page
    pub eos_scan_window: u64,
    /// Nested container re-dispatch limit
    pub max_nesting_depth: usize,
    /// Keep embedded picture bytes in the record
    pub keep_picture_data: bool,
    /// How many page headers to keep in the record for diagnostics
    pub max_page_headers: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            tag_id3v2: true,
            tag_id3v1: true,
            verify_page_checksums: true,
            page_scan_window: 65_536,
            eos_scan_window: MAX_OGG_PAGE_LEN,
            max_nesting_depth: 4,
            keep_picture_data: true,
            max_page_headers: 16,
        }
    }
}

impl AnalyzeOptions {
    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
