use std::io;
use thiserror::Error;

/// The primary error type for the `quadmag-lib` library.
///
/// Invalid frames (short reads, checksum failures, unrecognized flags) are
/// deliberately *not* errors: the acquisition session counts them and only
/// gives up once the fixed threshold is reached.
#[derive(Error, Debug)]
pub enum QmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid {field} index {value} (valid range 0..={limit})")]
    InvalidFieldIndex {
        field: &'static str,
        value: u8,
        limit: u8,
    },

    #[error("config echo mismatch: sent {}, board echoed {}", hex::encode(sent), hex::encode(echoed))]
    ConfigMismatch { sent: Vec<u8>, echoed: Vec<u8> },

    #[error("protocol error: {0}")]
    Protocol(String),
}
