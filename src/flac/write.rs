// VORBIS_COMMENT rewriting for native FLAC files

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use super::metadata::{BlockChain, BlockHeader, BlockType, MetadataBlock, BLOCK_HEADER_LEN, FLAC_SIGNATURE, MAX_BLOCK_LEN};
use super::vorbis::VorbisComment;
use crate::error::{Error, Result};
use crate::source::ByteSource;

/// Padding added when the new metadata no longer fits the old space
pub const DEFAULT_PADDING: usize = 8192;

/// Replace the VORBIS_COMMENT block of a FLAC file.
///
/// Existing PADDING is absorbed or grown so the audio frames stay at the
/// same offset whenever the new comment fits in the old metadata space;
/// otherwise a fresh padding block of [`DEFAULT_PADDING`] bytes is written.
/// The file is rewritten through a temporary file in the same directory and
/// then renamed over the original.
pub fn write_vorbis_comment(path: impl AsRef<Path>, comment: &VorbisComment) -> Result<()> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut source = ByteSource::new(BufReader::new(file), Some(len))?;

    if source.read(FLAC_SIGNATURE.len())? != FLAC_SIGNATURE {
        return Err(Error::NotFlac);
    }
    let mut blocks = Vec::new();
    let mut chain = BlockChain::new(&mut source);
    for item in chain.by_ref() {
        blocks.push(item?);
    }
    if !chain.terminated() {
        return Err(Error::invalid("metadata block chain has no last block"));
    }
    let audio_offset = chain.position();

    let layout = plan_blocks(blocks, comment, audio_offset - FLAC_SIGNATURE.len() as u64)?;
    debug!(path = %path.display(), blocks = layout.len(), "rewriting FLAC metadata");

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        writer.write_all(FLAC_SIGNATURE)?;
        let last = layout.len().saturating_sub(1);
        for (index, block) in layout.iter().enumerate() {
            writer.write_all(&block.to_bytes(index == last)?)?;
        }

        let mut audio = source.into_inner();
        audio.seek(SeekFrom::Start(audio_offset))?;
        io::copy(&mut audio, &mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn block(block_type: BlockType, data: Vec<u8>) -> MetadataBlock {
    MetadataBlock {
        header: BlockHeader {
            is_last: false,
            block_type,
            length: data.len() as u32,
            offset: 0,
        },
        data,
    }
}

/// Lay out the new block sequence for a metadata region of `space` bytes.
fn plan_blocks(blocks: Vec<MetadataBlock>, comment: &VorbisComment, space: u64) -> Result<Vec<MetadataBlock>> {
    let payload = comment.to_bytes();
    if payload.len() > MAX_BLOCK_LEN {
        return Err(Error::BlockTooLarge(payload.len()));
    }

    let mut layout: Vec<MetadataBlock> = Vec::with_capacity(blocks.len() + 1);
    let mut comment_block = Some(block(BlockType::VorbisComment, payload));
    for existing in blocks {
        match existing.header.block_type {
            BlockType::Padding => {}
            BlockType::VorbisComment => layout.extend(comment_block.take()),
            _ => layout.push(existing),
        }
    }
    if let Some(comment_block) = comment_block {
        // Right after STREAMINFO
        let at = usize::from(!layout.is_empty());
        layout.insert(at, comment_block);
    }

    let used: u64 = layout
        .iter()
        .map(|b| (BLOCK_HEADER_LEN + b.data.len()) as u64)
        .sum();
    let header = BLOCK_HEADER_LEN as u64;
    let padding = match space.checked_sub(used) {
        Some(0) => None,
        Some(free) if free >= header && free - header <= MAX_BLOCK_LEN as u64 => Some((free - header) as usize),
        _ => Some(DEFAULT_PADDING),
    };
    if let Some(padding) = padding {
        layout.push(block(BlockType::Padding, vec![0; padding]));
    }
    Ok(layout)
}
