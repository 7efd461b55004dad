use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("truncated block: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("block of {0} bytes exceeds the 65535 byte frame")]
    BlockTooLarge(usize),
    #[error("inflated data exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),
}
