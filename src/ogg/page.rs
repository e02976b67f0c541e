// Ogg page framing
//
// Page header layout (27 bytes, little-endian):
// - Capture pattern "OggS" (4)
// - Version, always 0 (1)
// - Header type: 1=continuation, 2=bos, 4=eos (1)
// - Granule position (8)
// - Bitstream serial number (4)
// - Page sequence number (4)
// - CRC checksum (4)
// - Number of page segments (1)
// followed by the segment table, one lacing value per segment.

use serde::Serialize;
use std::io::{self, Read, Seek};
use tracing::{debug, trace};

use super::crc::page_checksum;
use crate::options::AnalyzeOptions;
use crate::record::Diagnostics;
use crate::source::ByteSource;
use crate::utils::le_uint;

pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";
pub const PAGE_HEADER_LEN: usize = 27;

const FLAG_CONTINUATION: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// Header type flags. Unassigned bits are kept in `reserved`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageFlags {
    pub continuation: bool,
    pub first_page: bool,
    pub last_page: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub reserved: u8,
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

impl PageFlags {
    pub fn from_byte(byte: u8) -> Self {
        PageFlags {
            continuation: byte & FLAG_CONTINUATION != 0,
            first_page: byte & FLAG_BOS != 0,
            last_page: byte & FLAG_EOS != 0,
            reserved: byte & !(FLAG_CONTINUATION | FLAG_BOS | FLAG_EOS),
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.reserved;
        if self.continuation {
            byte |= FLAG_CONTINUATION;
        }
        if self.first_page {
            byte |= FLAG_BOS;
        }
        if self.last_page {
            byte |= FLAG_EOS;
        }
        byte
    }
}

/// Ogg page header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHeader {
    /// Absolute offset of the capture pattern
    pub offset: u64,
    pub version: u8,
    pub flags: PageFlags,
    /// -1 when no packet finishes on this page
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    #[serde(skip)]
    pub segment_table: Vec<u8>,
    pub header_len: usize,
    pub payload_len: usize,
}

impl PageHeader {
    /// Decode the fixed 27-byte prefix; the segment table is filled in later
    pub fn parse_fixed(bytes: &[u8], offset: u64) -> Option<Self> {
        if bytes.len() < PAGE_HEADER_LEN || &bytes[..4] != OGG_SIGNATURE {
            return None;
        }
        let granule = le_uint(bytes, 6, 8) as i64;
        let segments = usize::from(bytes[26]);
        Some(PageHeader {
            offset,
            version: bytes[4],
            flags: PageFlags::from_byte(bytes[5]),
            granule_position: granule,
            serial: le_uint(bytes, 14, 4) as u32,
            sequence: le_uint(bytes, 18, 4) as u32,
            checksum: le_uint(bytes, 22, 4) as u32,
            segment_table: Vec::new(),
            header_len: PAGE_HEADER_LEN + segments,
            payload_len: 0,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.header_len - PAGE_HEADER_LEN
    }

    /// Offset of the first payload byte
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_len as u64
    }

    /// Offset of the first byte after the page
    pub fn end(&self) -> u64 {
        self.payload_offset() + self.payload_len as u64
    }

    /// Whether at least one packet finishes on this page
    pub fn has_granule(&self) -> bool {
        self.granule_position != -1
    }

    /// Serialize the header and segment table with the stored checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_len);
        out.extend_from_slice(OGG_SIGNATURE);
        out.push(self.version);
        out.push(self.flags.to_byte());
        out.extend_from_slice(&self.granule_position.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
        out.push(self.segment_table.len() as u8);
        out.extend_from_slice(&self.segment_table);
        out
    }
}

/// Ogg page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub payload: Vec<u8>,
}

enum PageState {
    Scanning,
    HeaderRead(PageHeader),
    SegmentsRead(PageHeader),
    PayloadReady(Page),
    NotFound,
}

/// Forward page reader with bounded marker search and resynchronisation.
///
/// Each call to [`next_page`](PageReader::next_page) walks the states
/// `Scanning -> HeaderRead -> SegmentsRead -> PayloadReady`. A structurally
/// broken page is reported as an error and scanning resumes one byte past
/// its capture pattern. Once the marker search fails the reader stays in
/// `NotFound`.
pub struct PageReader<'a, R> {
    source: &'a mut ByteSource<R>,
    scan_window: u64,
    verify_checksums: bool,
    exhausted: bool,
}

impl<'a, R: Read + Seek> PageReader<'a, R> {
    pub fn new(source: &'a mut ByteSource<R>, options: &AnalyzeOptions) -> Self {
        PageReader {
            source,
            scan_window: options.page_scan_window,
            verify_checksums: options.verify_page_checksums,
            exhausted: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.source.position()
    }

    pub fn next_page(&mut self, diagnostics: &mut Diagnostics) -> io::Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut state = PageState::Scanning;
        loop {
            state = match state {
                PageState::Scanning => self.scan(diagnostics)?,
                PageState::HeaderRead(header) => self.read_segments(header, diagnostics)?,
                PageState::SegmentsRead(header) => self.read_payload(header, diagnostics)?,
                PageState::PayloadReady(page) => {
                    trace!(
                        offset = page.header.offset,
                        sequence = page.header.sequence,
                        granule = page.header.granule_position,
                        "page ready"
                    );
                    return Ok(Some(page));
                }
                PageState::NotFound => {
                    self.exhausted = true;
                    return Ok(None);
                }
            };
        }
    }

    fn resync(&mut self, header: &PageHeader) -> PageState {
        debug!(offset = header.offset, "resynchronising after bad page");
        self.source.seek(header.offset + 1);
        PageState::Scanning
    }

    fn scan(&mut self, diagnostics: &mut Diagnostics) -> io::Result<PageState> {
        let start = self.source.position();
        let available = self.source.remaining();
        if available == 0 {
            return Ok(PageState::NotFound);
        }

        let Some(offset) = self.find_marker(start)? else {
            if available >= PAGE_HEADER_LEN as u64 {
                diagnostics.warn_at(
                    start,
                    format!("no Ogg page found within {} bytes", self.scan_window),
                );
            }
            return Ok(PageState::NotFound);
        };
        if offset > start {
            diagnostics.warn_at(start, format!("skipped {} bytes before next Ogg page", offset - start));
        }

        let bytes = self.source.read_at(offset, PAGE_HEADER_LEN)?;
        let Some(header) = PageHeader::parse_fixed(&bytes, offset) else {
            diagnostics.error_at(offset, "truncated Ogg page header");
            return Ok(PageState::NotFound);
        };
        if header.version != 0 {
            diagnostics.error_at(offset, format!("unsupported Ogg page version {}", header.version));
            return Ok(self.resync(&header));
        }
        Ok(PageState::HeaderRead(header))
    }

    /// Offset of the next capture pattern within the scan window
    fn find_marker(&mut self, start: u64) -> io::Result<Option<u64>> {
        let quick = self.source.read_at(start, OGG_SIGNATURE.len())?;
        if quick == OGG_SIGNATURE {
            return Ok(Some(start));
        }
        let window = (self.scan_window as usize).saturating_add(OGG_SIGNATURE.len() - 1);
        let haystack = self.source.read_at(start, window)?;
        Ok(haystack
            .windows(OGG_SIGNATURE.len())
            .position(|w| w == OGG_SIGNATURE)
            .map(|i| start + i as u64))
    }

    fn read_segments(&mut self, mut header: PageHeader, diagnostics: &mut Diagnostics) -> io::Result<PageState> {
        let count = header.segment_count();
        let table = self.source.read(count)?;
        if table.len() < count {
            diagnostics.error_at(header.offset, "Ogg segment table extends past end of data");
            return Ok(self.resync(&header));
        }
        header.payload_len = table.iter().map(|&len| usize::from(len)).sum();
        header.segment_table = table;
        Ok(PageState::SegmentsRead(header))
    }

    fn read_payload(&mut self, header: PageHeader, diagnostics: &mut Diagnostics) -> io::Result<PageState> {
        if header.end() > self.source.data_end() {
            diagnostics.error_at(
                header.offset,
                format!(
                    "Ogg page payload of {} bytes extends past end of data",
                    header.payload_len
                ),
            );
            return Ok(self.resync(&header));
        }
        let payload = self.source.read(header.payload_len)?;
        if payload.len() < header.payload_len {
            diagnostics.error_at(
                header.offset,
                format!(
                    "Ogg page payload truncated: {} of {} bytes present",
                    payload.len(),
                    header.payload_len
                ),
            );
            return Ok(PageState::NotFound);
        }
        if self.verify_checksums {
            let computed = page_checksum(&header.to_bytes(), &payload);
            if computed != header.checksum {
                diagnostics.warn_at(
                    header.offset,
                    format!(
                        "Ogg page {} checksum mismatch: stored {:08X}, computed {:08X}",
                        header.sequence, header.checksum, computed
                    ),
                );
            }
        }
        Ok(PageState::PayloadReady(Page { header, payload }))
    }
}

/// Find the last page of the data region by scanning backwards.
///
/// Only the final `window` bytes are searched. With `serial` set, pages of
/// other logical streams are passed over, as are pages on which no packet
/// finishes. The returned header has its segment table filled in.
pub fn find_last_page<R: Read + Seek>(
    source: &mut ByteSource<R>,
    window: u64,
    serial: Option<u32>,
) -> io::Result<Option<PageHeader>> {
    let end = source.data_end();
    let start = end.saturating_sub(window).max(source.data_start());
    let region = source.read_at(start, (end - start) as usize)?;

    let mut search_end = region.len();
    while let Some(index) = region[..search_end]
        .windows(OGG_SIGNATURE.len())
        .rposition(|w| w == OGG_SIGNATURE)
    {
        search_end = index + OGG_SIGNATURE.len() - 1;
        let bytes = &region[index..];
        let Some(mut header) = PageHeader::parse_fixed(bytes, start + index as u64) else {
            continue;
        };
        let Some(table) = bytes.get(PAGE_HEADER_LEN..header.header_len) else {
            continue;
        };
        if header.version != 0 || serial.is_some_and(|s| s != header.serial) || !header.has_granule() {
            continue;
        }
        header.segment_table = table.to_vec();
        header.payload_len = table.iter().map(|&len| usize::from(len)).sum();
        trace!(offset = header.offset, granule = header.granule_position, "last page");
        return Ok(Some(header));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::crc::page_checksum;

    fn page(sequence: u32, flags: u8, granule: i64, segments: &[u8], fill: u8) -> Vec<u8> {
        let mut header = PageHeader {
            offset: 0,
            version: 0,
            flags: PageFlags::from_byte(flags),
            granule_position: granule,
            serial: 7,
            sequence,
            checksum: 0,
            segment_table: segments.to_vec(),
            header_len: PAGE_HEADER_LEN + segments.len(),
            payload_len: 0,
        };
        let payload = vec![fill; segments.iter().map(|&s| s as usize).sum()];
        header.checksum = page_checksum(&header.to_bytes(), &payload);
        let mut out = header.to_bytes();
        out.extend(payload);
        out
    }

    #[test]
    fn test_flags_roundtrip_reserved_bits() {
        let flags = PageFlags::from_byte(0x8D);
        assert!(flags.continuation && flags.last_page && !flags.first_page);
        assert_eq!(flags.reserved, 0x88);
        assert_eq!(flags.to_byte(), 0x8D);
    }

    #[test]
    fn test_reads_pages_in_order() {
        let mut data = page(0, FLAG_BOS, 0, &[30], 1);
        data.extend(page(1, FLAG_EOS, 1000, &[255, 10], 2));
        let mut source = ByteSource::from_bytes(data);
        let options = AnalyzeOptions::default();
        let mut diagnostics = Diagnostics::default();
        let mut reader = PageReader::new(&mut source, &options);

        let first = reader.next_page(&mut diagnostics).unwrap().unwrap();
        assert!(first.header.flags.first_page);
        assert_eq!(first.payload.len(), 30);
        let second = reader.next_page(&mut diagnostics).unwrap().unwrap();
        assert_eq!(second.header.offset, 58);
        assert_eq!(second.header.payload_len, 265);
        assert_eq!(second.header.granule_position, 1000);
        assert!(reader.next_page(&mut diagnostics).unwrap().is_none());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_is_warning() {
        let mut data = page(0, FLAG_BOS, 0, &[4], 1);
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let mut source = ByteSource::from_bytes(data);
        let options = AnalyzeOptions::default();
        let mut diagnostics = Diagnostics::default();

        let page = PageReader::new(&mut source, &options).next_page(&mut diagnostics).unwrap();
        assert!(page.is_some());
        assert!(diagnostics.errors.is_empty());
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_resync_after_bad_version() {
        let mut data = page(0, FLAG_BOS, 0, &[4], 1);
        data[4] = 1;
        data.extend(page(1, 0, 0, &[4], 2));
        let mut source = ByteSource::from_bytes(data);
        let options = AnalyzeOptions {
            verify_page_checksums: false,
            ..Default::default()
        };
        let mut diagnostics = Diagnostics::default();

        let page = PageReader::new(&mut source, &options)
            .next_page(&mut diagnostics)
            .unwrap()
            .unwrap();
        assert_eq!(page.header.sequence, 1);
        assert_eq!(diagnostics.errors.len(), 1);
        assert_eq!(diagnostics.errors[0].offset, Some(0));
    }

    #[test]
    fn test_marker_outside_window() {
        let mut data = vec![0u8; 100];
        data.extend(page(0, FLAG_BOS, 0, &[4], 1));
        let mut source = ByteSource::from_bytes(data);
        let options = AnalyzeOptions {
            page_scan_window: 50,
            ..Default::default()
        };
        let mut diagnostics = Diagnostics::default();
        let mut reader = PageReader::new(&mut source, &options);
        assert!(reader.next_page(&mut diagnostics).unwrap().is_none());
        assert!(reader.next_page(&mut diagnostics).unwrap().is_none());
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_find_last_page() {
        let mut data = page(0, FLAG_BOS, 0, &[4], 1);
        data.extend(page(1, 0, 4410, &[4], 2));
        data.extend(page(2, FLAG_EOS, -1, &[255], 3));
        let mut source = ByteSource::from_bytes(data);

        let last = find_last_page(&mut source, 65_307, Some(7)).unwrap().unwrap();
        assert_eq!(last.sequence, 1);
        assert_eq!(last.granule_position, 4410);
        assert!(find_last_page(&mut source, 65_307, Some(8)).unwrap().is_none());
    }
}
