// Synthetic stream builders shared by the integration tests
#![allow(dead_code)]

use sonde::ogg::crc::page_checksum;

pub const CONTINUED: u8 = 0x01;
pub const BOS: u8 = 0x02;
pub const EOS: u8 = 0x04;

/// One Ogg page under construction
#[derive(Debug, Clone)]
pub struct OggPage {
    pub flags: u8,
    pub granule: i64,
    pub serial: u32,
    pub sequence: u32,
    pub version: u8,
    segments: Vec<u8>,
    payload: Vec<u8>,
}

impl OggPage {
    pub fn new(serial: u32, sequence: u32) -> Self {
        OggPage {
            flags: 0,
            granule: -1,
            serial,
            sequence,
            version: 0,
            segments: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    /// Append a packet that ends on this page
    pub fn packet(mut self, data: &[u8]) -> Self {
        let mut left = data.len();
        while left >= 255 {
            self.segments.push(255);
            left -= 255;
        }
        self.segments.push(left as u8);
        self.payload.extend_from_slice(data);
        self
    }

    /// Append a packet piece that continues on the next page; its length
    /// must be a multiple of 255
    pub fn partial(mut self, data: &[u8]) -> Self {
        assert_eq!(data.len() % 255, 0);
        self.segments.extend(std::iter::repeat(255).take(data.len() / 255));
        self.payload.extend_from_slice(data);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = b"OggS".to_vec();
        header.push(self.version);
        header.push(self.flags);
        header.extend_from_slice(&self.granule.to_le_bytes());
        header.extend_from_slice(&self.serial.to_le_bytes());
        header.extend_from_slice(&self.sequence.to_le_bytes());
        header.extend_from_slice(&[0; 4]);
        header.push(self.segments.len() as u8);
        header.extend_from_slice(&self.segments);

        let crc = page_checksum(&header, &self.payload);
        header[22..26].copy_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&self.payload);
        header
    }
}

pub fn concat(pages: &[OggPage]) -> Vec<u8> {
    pages.iter().flat_map(OggPage::to_bytes).collect()
}

/// Vorbis comment payload without any codec framing
pub fn comment_body(vendor: &str, entries: &[&str]) -> Vec<u8> {
    let mut out = (vendor.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        out.extend_from_slice(entry.as_bytes());
    }
    out
}

pub fn vorbis_identification(channels: u8, sample_rate: u32, nominal: i32) -> Vec<u8> {
    let mut packet = b"\x01vorbis".to_vec();
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&sample_rate.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.extend_from_slice(&nominal.to_le_bytes());
    packet.extend_from_slice(&0i32.to_le_bytes());
    packet.push(0xB8);
    packet.push(1);
    packet
}

pub fn vorbis_comment(vendor: &str, entries: &[&str]) -> Vec<u8> {
    let mut packet = b"\x03vorbis".to_vec();
    packet.extend(comment_body(vendor, entries));
    packet.push(1);
    packet
}

pub fn vorbis_setup() -> Vec<u8> {
    let mut packet = b"\x05vorbis".to_vec();
    packet.extend_from_slice(&[0x42; 32]);
    packet
}

pub fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut packet = b"OpusHead".to_vec();
    packet.push(1);
    packet.push(channels);
    packet.extend_from_slice(&pre_skip.to_le_bytes());
    packet.extend_from_slice(&48_000u32.to_le_bytes());
    packet.extend_from_slice(&0i16.to_le_bytes());
    packet.push(0);
    packet
}

pub fn opus_tags(vendor: &str, entries: &[&str]) -> Vec<u8> {
    let mut packet = b"OpusTags".to_vec();
    packet.extend(comment_body(vendor, entries));
    packet
}

/// A complete Vorbis stream: three header pages and `audio_pages` audio pages
pub fn vorbis_stream(serial: u32, entries: &[&str], audio_pages: u32, samples_per_page: i64) -> Vec<u8> {
    let mut pages = vec![
        OggPage::new(serial, 0).flags(BOS).granule(0).packet(&vorbis_identification(2, 44_100, 128_000)),
        OggPage::new(serial, 1)
            .granule(0)
            .packet(&vorbis_comment("testenc", entries))
            .packet(&vorbis_setup()),
    ];
    for index in 0..audio_pages {
        let mut page = OggPage::new(serial, 2 + index)
            .granule(samples_per_page * i64::from(index + 1))
            .packet(&[0xAA; 100]);
        if index + 1 == audio_pages {
            page = page.flags(EOS);
        }
        pages.push(page);
    }
    concat(&pages)
}

/// FLAC metadata block with header
pub fn flac_block(is_last: bool, type_code: u8, data: &[u8]) -> Vec<u8> {
    let len = (data.len() as u32).to_be_bytes();
    let flag = if is_last { 0x80 } else { 0 };
    let mut out = vec![flag | type_code, len[1], len[2], len[3]];
    out.extend_from_slice(data);
    out
}

/// 34-byte STREAMINFO payload
pub fn streaminfo(sample_rate: u32, channels: u8, bits_per_sample: u8, total_samples: u64) -> Vec<u8> {
    let mut data = vec![0x10, 0x00, 0x10, 0x00, 0, 0, 0, 0, 0, 0];
    let packed: u64 = (u64::from(sample_rate) << 44)
        | (u64::from(channels - 1) << 41)
        | (u64::from(bits_per_sample - 1) << 36)
        | (total_samples & 0xF_FFFF_FFFF);
    data.extend_from_slice(&packed.to_be_bytes());
    data.extend_from_slice(&[0x5A; 16]);
    data
}

/// Native FLAC stream: STREAMINFO, VORBIS_COMMENT, PADDING and a fake frame
pub fn flac_stream(entries: &[&str]) -> Vec<u8> {
    let mut out = b"fLaC".to_vec();
    out.extend(flac_block(false, 0, &streaminfo(44_100, 2, 16, 44_100)));
    out.extend(flac_block(false, 4, &comment_body("reference libFLAC 1.4.3", entries)));
    out.extend(flac_block(true, 1, &[0; 64]));
    out.extend_from_slice(&[0xFF, 0xF8, 0x69, 0x08, 0x00, 0x00]);
    out.extend_from_slice(&[0x11; 1000]);
    out
}
