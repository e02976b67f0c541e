// Ogg packet reassembly
//
// A packet is the concatenation of consecutive segments up to and including
// the first segment shorter than 255 bytes. Packets may start mid-page and
// may span any number of pages.

use std::io::{self, Read, Seek};
use tracing::trace;

use super::page::{Page, PageHeader, PageReader};
use crate::options::AnalyzeOptions;
use crate::record::Diagnostics;
use crate::source::ByteSource;

const CONTINUED_SEGMENT: u8 = 255;

/// Contiguous run of packet bytes taken from one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Absolute offset of the first byte
    pub offset: u64,
    pub len: usize,
}

/// One logical packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Where each piece of `data` came from, in order
    pub spans: Vec<Span>,
    pub first_sequence: u32,
    pub last_sequence: u32,
    /// False when the data ran out before the terminating segment
    pub complete: bool,
    /// Granule position of the page the packet finished on, -1 if unfinished
    pub granule_position: i64,
}

impl Packet {
    /// Absolute offset of the first byte
    pub fn offset(&self) -> u64 {
        self.spans.first().map_or(0, |span| span.offset)
    }

    pub fn page_count(&self) -> usize {
        self.spans.len()
    }

    /// Absolute offset of `data[index]`
    pub fn absolute_offset(&self, index: usize) -> Option<u64> {
        let mut base = 0;
        for span in &self.spans {
            if index < base + span.len {
                return Some(span.offset + (index - base) as u64);
            }
            base += span.len;
        }
        None
    }

    fn push(&mut self, offset: u64, bytes: &[u8]) {
        match self.spans.last_mut() {
            Some(last) if last.offset + last.len as u64 == offset => last.len += bytes.len(),
            _ => self.spans.push(Span { offset, len: bytes.len() }),
        }
        self.data.extend_from_slice(bytes);
    }
}

/// Pulls packets of a single logical stream out of a page sequence.
///
/// The reader locks onto the serial number of the first page it sees
/// (or the one given to [`with_serial`](PacketReader::with_serial)).
pub struct PacketReader<'a, R> {
    pages: PageReader<'a, R>,
    serial: Option<u32>,
    current: Option<Page>,
    segment: usize,
    cursor: usize,
    last_sequence: Option<u32>,
    foreign_reported: bool,
    headers: Vec<PageHeader>,
    max_headers: usize,
}

impl<'a, R: Read + Seek> PacketReader<'a, R> {
    pub fn new(source: &'a mut ByteSource<R>, options: &AnalyzeOptions) -> Self {
        PacketReader {
            pages: PageReader::new(source, options),
            serial: None,
            current: None,
            segment: 0,
            cursor: 0,
            last_sequence: None,
            foreign_reported: false,
            headers: Vec::new(),
            max_headers: options.max_page_headers,
        }
    }

    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Serial number of the stream being read, once known
    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    /// Offset just past the last page read
    pub fn position(&self) -> u64 {
        self.pages.position()
    }

    /// Header of the page currently being consumed
    pub fn current_page(&self) -> Option<&PageHeader> {
        self.current.as_ref().map(|page| &page.header)
    }

    /// Headers of the pages read so far, capped at `max_page_headers`
    pub fn page_headers(&self) -> &[PageHeader] {
        &self.headers
    }

    pub fn into_page_headers(self) -> Vec<PageHeader> {
        self.headers
    }

    fn page_exhausted(&self) -> bool {
        self.current
            .as_ref()
            .map_or(true, |page| self.segment >= page.header.segment_table.len())
    }

    /// Next packet of the stream.
    ///
    /// Returns `Ok(None)` once no further page can be found. A packet cut
    /// short by the end of data is returned with `complete == false`.
    pub fn next_packet(&mut self, diagnostics: &mut Diagnostics) -> io::Result<Option<Packet>> {
        let mut packet: Option<Packet> = None;
        loop {
            if self.page_exhausted() {
                if !self.advance(&mut packet, diagnostics)? {
                    return Ok(packet);
                }
                continue;
            }
            let Some(page) = self.current.as_ref() else {
                continue;
            };
            let header = &page.header;
            let len = header.segment_table[self.segment];
            let start = self.cursor;
            let end = start + usize::from(len);

            let building = packet.get_or_insert_with(|| Packet {
                data: Vec::new(),
                spans: Vec::new(),
                first_sequence: header.sequence,
                last_sequence: header.sequence,
                complete: false,
                granule_position: -1,
            });
            building.last_sequence = header.sequence;
            building.push(header.payload_offset() + start as u64, &page.payload[start..end]);
            let granule = header.granule_position;
            self.segment += 1;
            self.cursor = end;

            if len < CONTINUED_SEGMENT {
                building.complete = true;
                building.granule_position = granule;
                trace!(
                    offset = building.offset(),
                    len = building.data.len(),
                    pages = building.page_count(),
                    "packet complete"
                );
                return Ok(packet.take());
            }
        }
    }

    /// Move to the next page of our stream, checking continuity.
    fn advance(&mut self, packet: &mut Option<Packet>, diagnostics: &mut Diagnostics) -> io::Result<bool> {
        let page = loop {
            let Some(page) = self.pages.next_page(diagnostics)? else {
                self.current = None;
                return Ok(false);
            };
            let serial = *self.serial.get_or_insert(page.header.serial);
            if page.header.serial == serial {
                break page;
            }
            if !self.foreign_reported {
                self.foreign_reported = true;
                diagnostics.warn_at(
                    page.header.offset,
                    format!("pages of other logical stream {:08X} skipped", page.header.serial),
                );
            }
        };
        if self.headers.len() < self.max_headers {
            self.headers.push(page.header.clone());
        }

        let header = &page.header;
        let continued = header.flags.continuation;
        let expected = self.last_sequence.map(|sequence| sequence.wrapping_add(1));
        self.last_sequence = Some(header.sequence);
        let mut skip_leading = false;

        match expected {
            Some(expected) if expected != header.sequence => {
                let dropped = packet.take().is_some();
                diagnostics.warn_at(
                    header.offset,
                    format!(
                        "Ogg page sequence jumps from {} to {}{}",
                        expected.wrapping_sub(1),
                        header.sequence,
                        if dropped { ", partial packet discarded" } else { "" }
                    ),
                );
                skip_leading = continued;
            }
            _ if packet.is_some() && !continued => {
                *packet = None;
                diagnostics.warn_at(
                    header.offset,
                    "Ogg page without continuation flag inside a packet, partial packet discarded",
                );
            }
            _ if packet.is_none() && continued => {
                diagnostics.warn_at(header.offset, "Ogg page continues a packet whose start is missing");
                skip_leading = true;
            }
            _ => {}
        }

        self.current = Some(page);
        self.segment = 0;
        self.cursor = 0;
        if skip_leading {
            self.skip_continued();
        }
        Ok(true)
    }

    /// Drop the segments that finish a packet begun on a page we never saw
    fn skip_continued(&mut self) {
        let Some(page) = self.current.as_ref() else {
            return;
        };
        for &len in &page.header.segment_table {
            self.segment += 1;
            self.cursor += usize::from(len);
            if len < CONTINUED_SEGMENT {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::crc::page_checksum;
    use crate::ogg::page::{PageFlags, PAGE_HEADER_LEN};

    fn page(serial: u32, sequence: u32, flags: u8, segments: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut header = PageHeader {
            offset: 0,
            version: 0,
            flags: PageFlags::from_byte(flags),
            granule_position: 0,
            serial,
            sequence,
            checksum: 0,
            segment_table: segments.to_vec(),
            header_len: PAGE_HEADER_LEN + segments.len(),
            payload_len: payload.len(),
        };
        header.checksum = page_checksum(&header.to_bytes(), payload);
        let mut out = header.to_bytes();
        out.extend_from_slice(payload);
        out
    }

    fn read_all(data: Vec<u8>) -> (Vec<Packet>, Diagnostics) {
        let mut source = ByteSource::from_bytes(data);
        let options = AnalyzeOptions::default();
        let mut diagnostics = Diagnostics::default();
        let mut reader = PacketReader::new(&mut source, &options);
        let mut packets = Vec::new();
        while let Some(packet) = reader.next_packet(&mut diagnostics).unwrap() {
            packets.push(packet);
        }
        (packets, diagnostics)
    }

    #[test]
    fn test_two_packets_on_one_page() {
        let payload: Vec<u8> = (0..15).collect();
        let (packets, diagnostics) = read_all(page(1, 0, 0x02, &[10, 5], &payload));
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data, &payload[..10]);
        assert_eq!(packets[1].data, &payload[10..]);
        assert_eq!(packets[1].offset(), 29 + 10);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_packet_across_pages_keeps_offsets() {
        let body: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut data = page(1, 0, 0x02, &[255], &body[..255]);
        let second_start = data.len() as u64;
        data.extend(page(1, 1, 0x01, &[45], &body[255..]));

        let (packets, diagnostics) = read_all(data);
        assert!(diagnostics.is_empty());
        let packet = &packets[0];
        assert!(packet.complete);
        assert_eq!(packet.data, body);
        assert_eq!(packet.page_count(), 2);
        assert_eq!(packet.absolute_offset(0), Some(28));
        assert_eq!(packet.absolute_offset(255), Some(second_start + 28));
        assert_eq!(packet.absolute_offset(300), None);
    }

    #[test]
    fn test_truncated_packet_is_incomplete() {
        let (packets, _) = read_all(page(1, 0, 0x02, &[255], &[7; 255]));
        assert_eq!(packets.len(), 1);
        assert!(!packets[0].complete);
        assert_eq!(packets[0].granule_position, -1);
    }

    #[test]
    fn test_sequence_gap_discards_partial() {
        let mut data = page(1, 0, 0x02, &[255], &[1; 255]);
        data.extend(page(1, 2, 0x01, &[10, 3], &[2; 13]));
        let (packets, diagnostics) = read_all(data);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, vec![2; 3]);
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].message.contains("discarded"));
    }

    #[test]
    fn test_leading_continuation_skipped() {
        let (packets, diagnostics) = read_all(page(1, 5, 0x01, &[255, 4, 2], &[9; 261]));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data.len(), 2);
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_other_serials_skipped_once() {
        let mut data = page(1, 0, 0x02, &[3], b"abc");
        data.extend(page(2, 0, 0x02, &[3], b"xyz"));
        data.extend(page(2, 1, 0x00, &[3], b"uvw"));
        data.extend(page(1, 1, 0x00, &[3], b"def"));
        let (packets, diagnostics) = read_all(data);
        let bodies: Vec<_> = packets.iter().map(|p| p.data.clone()).collect();
        assert_eq!(bodies, vec![b"abc".to_vec(), b"def".to_vec()]);
        assert_eq!(diagnostics.warnings.len(), 1);
    }
}
