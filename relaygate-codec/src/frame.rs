use crate::CodecError;
use crate::compress::{deflate_compress, deflate_decompress};

const LENGTH_PREFIX: usize = 2;

/// Frames `head` as a big-endian `u16` length followed by its raw-deflate
/// compression. The caller appends any body bytes after the frame.
pub fn encode_block(head: &[u8]) -> Result<Vec<u8>, CodecError> {
    let compressed = deflate_compress(head)?;
    let len = u16::try_from(compressed.len())
        .map_err(|_| CodecError::BlockTooLarge(compressed.len()))?;

    let mut out = Vec::with_capacity(LENGTH_PREFIX + compressed.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Inverse of [`encode_block`]: returns the inflated block and the bytes
/// that follow the frame. The block may inflate to at most `max_head` bytes.
pub fn decode_block(input: &[u8], max_head: usize) -> Result<(Vec<u8>, &[u8]), CodecError> {
    if input.len() < LENGTH_PREFIX {
        return Err(CodecError::Truncated {
            needed: LENGTH_PREFIX,
            available: input.len(),
        });
    }
    let len = u16::from_be_bytes([input[0], input[1]]) as usize;
    let end = LENGTH_PREFIX + len;
    if input.len() < end {
        return Err(CodecError::Truncated {
            needed: end,
            available: input.len(),
        });
    }
    let head = deflate_decompress(&input[LENGTH_PREFIX..end], max_head)?;
    Ok((head, &input[end..]))
}
