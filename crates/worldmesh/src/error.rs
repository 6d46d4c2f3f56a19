// Decode errors shared by the tile, index and model parsers

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Structural problem in a file: bad magic or version, an offset
    /// outside the buffer, a reference past a table end.
    #[error("malformed data: {0}")]
    Malformed(String),

    /// The archives have no usable entry under this name.
    #[error("file not found in archive: {0}")]
    NotFound(String),

    /// A chunk carried a different tag than the layout requires.
    #[error("expected chunk {expected} at {offset:#x}, found {found}")]
    UnexpectedChunk {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::Malformed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
