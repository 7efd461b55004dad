mod compress;
mod error;
mod frame;

pub use compress::{
    decode_content, deflate_compress, deflate_decompress, gzip_compress, gzip_decompress,
};
pub use error::CodecError;
pub use frame::{decode_block, encode_block};
