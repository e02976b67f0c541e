// FLAC metadata block chain

use serde::Serialize;
use std::io::{Read, Seek};
use tracing::trace;

use crate::error::{Error, Result};
use crate::source::ByteSource;

/// FLAC stream marker
pub const FLAC_SIGNATURE: &[u8; 4] = b"fLaC";

/// Size of a metadata block header
pub const BLOCK_HEADER_LEN: usize = 4;

/// Largest payload a 24-bit length field can declare
pub const MAX_BLOCK_LEN: usize = 0xFF_FFFF;

/// FLAC metadata block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// Types 7-126, not assigned yet
    Reserved(u8),
    /// Type 127, forbidden so a header cannot look like a frame sync code
    Invalid,
}

impl BlockType {
    pub fn from_byte(byte: u8) -> Self {
        match byte & 0x7F {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            127 => BlockType::Invalid,
            other => BlockType::Reserved(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(code) => code & 0x7F,
            BlockType::Invalid => 127,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockType::StreamInfo => "STREAMINFO",
            BlockType::Padding => "PADDING",
            BlockType::Application => "APPLICATION",
            BlockType::SeekTable => "SEEKTABLE",
            BlockType::VorbisComment => "VORBIS_COMMENT",
            BlockType::CueSheet => "CUESHEET",
            BlockType::Picture => "PICTURE",
            BlockType::Reserved(_) => "reserved",
            BlockType::Invalid => "invalid",
        }
    }
}

/// FLAC metadata block header, with the absolute offset it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    pub is_last: bool,
    pub block_type: BlockType,
    pub length: u32,
    pub offset: u64,
}

impl BlockHeader {
    /// Decode the 4-byte header: 1 bit last flag, 7 bits type, 24 bits length
    pub fn parse(bytes: [u8; BLOCK_HEADER_LEN], offset: u64) -> Self {
        BlockHeader {
            is_last: bytes[0] & 0x80 != 0,
            block_type: BlockType::from_byte(bytes[0]),
            length: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
            offset,
        }
    }

    /// Encode a header for a payload of `length` bytes
    pub fn encode(is_last: bool, block_type: BlockType, length: usize) -> Result<[u8; BLOCK_HEADER_LEN]> {
        if length > MAX_BLOCK_LEN {
            return Err(Error::BlockTooLarge(length));
        }
        let len = (length as u32).to_be_bytes();
        let flag = if is_last { 0x80 } else { 0 };
        Ok([flag | block_type.to_byte(), len[1], len[2], len[3]])
    }

    /// Offset of the first byte after this block
    pub fn end(&self) -> u64 {
        self.offset + BLOCK_HEADER_LEN as u64 + u64::from(self.length)
    }
}

/// FLAC metadata block
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    pub data: Vec<u8>,
}

impl MetadataBlock {
    /// Serialize header and payload
    pub fn to_bytes(&self, is_last: bool) -> Result<Vec<u8>> {
        let header = BlockHeader::encode(is_last, self.header.block_type, self.data.len())?;
        let mut out = Vec::with_capacity(BLOCK_HEADER_LEN + self.data.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    BlockHeader,
    BlockBody(BlockHeader),
    Done,
}

/// Reads metadata blocks one at a time until the last-block flag.
///
/// The source must be positioned just after the stream marker. Once the
/// block carrying the last-block flag is returned the chain is done and the
/// cursor sits on the first byte after the metadata; nothing beyond it is
/// read. A truncated header or body is returned as an error and also ends
/// the chain.
pub struct BlockChain<'a, R> {
    source: &'a mut ByteSource<R>,
    state: ChainState,
    terminated: bool,
}

impl<'a, R: Read + Seek> BlockChain<'a, R> {
    pub fn new(source: &'a mut ByteSource<R>) -> Self {
        BlockChain {
            source,
            state: ChainState::BlockHeader,
            terminated: false,
        }
    }

    /// Current cursor position in the underlying source
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Whether a block with the last-block flag has been read
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    fn read_header(&mut self) -> Result<BlockHeader> {
        let offset = self.source.position();
        let bytes = self.source.read(BLOCK_HEADER_LEN)?;
        let bytes: [u8; BLOCK_HEADER_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::truncated("metadata block header", BLOCK_HEADER_LEN, bytes.len()))?;
        Ok(BlockHeader::parse(bytes, offset))
    }

    fn read_body(&mut self, header: BlockHeader) -> Result<MetadataBlock> {
        let length = header.length as usize;
        let data = self.source.read(length)?;
        if data.len() < length {
            return Err(Error::truncated("metadata block", length, data.len()));
        }
        Ok(MetadataBlock { header, data })
    }
}

impl<R: Read + Seek> Iterator for BlockChain<'_, R> {
    type Item = Result<MetadataBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                ChainState::Done => return None,
                ChainState::BlockHeader => match self.read_header() {
                    Ok(header) => {
                        trace!(
                            offset = header.offset,
                            block = header.block_type.name(),
                            length = header.length,
                            last = header.is_last,
                            "metadata block header"
                        );
                        self.state = ChainState::BlockBody(header);
                    }
                    Err(err) => {
                        self.state = ChainState::Done;
                        return Some(Err(err));
                    }
                },
                ChainState::BlockBody(header) => {
                    let block = self.read_body(header);
                    self.state = if header.is_last && block.is_ok() {
                        self.terminated = true;
                        ChainState::Done
                    } else if block.is_ok() {
                        ChainState::BlockHeader
                    } else {
                        ChainState::Done
                    };
                    return Some(block);
                }
            }
        }
    }
}
