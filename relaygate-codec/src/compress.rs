use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};

use crate::CodecError;

pub fn gzip_compress(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(input)
        .map_err(|err| CodecError::Compression(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| CodecError::Compression(err.to_string()))
}

pub fn gzip_decompress(input: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    read_limited(GzDecoder::new(input), limit)
}

/// Raw deflate (RFC 1951), no zlib wrapper.
pub fn deflate_compress(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(input)
        .map_err(|err| CodecError::Compression(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| CodecError::Compression(err.to_string()))
}

pub fn deflate_decompress(input: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    read_limited(DeflateDecoder::new(input), limit)
}

/// Reverses an HTTP `Content-Encoding`, producing at most `limit` bytes.
/// `deflate` accepts both the zlib wrapped form and bare raw deflate, since
/// servers send either.
pub fn decode_content(encoding: &str, body: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "" | "identity" if body.len() > limit => Err(CodecError::TooLarge { limit }),
        "" | "identity" => Ok(body.to_vec()),
        "gzip" | "x-gzip" => gzip_decompress(body, limit),
        "deflate" => match read_limited(ZlibDecoder::new(body), limit) {
            Err(CodecError::Compression(_)) => deflate_decompress(body, limit),
            other => other,
        },
        other => Err(CodecError::UnsupportedEncoding(other.to_string())),
    }
}

fn read_limited(reader: impl Read, limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut output = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|err| CodecError::Compression(err.to_string()))?;
    if output.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(output)
}
