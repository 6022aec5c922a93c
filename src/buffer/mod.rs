//! Byte buffers for encoding and decoding wire protocol data

mod read;
mod write;

pub use read::ReadBuffer;
pub use write::WriteBuffer;
