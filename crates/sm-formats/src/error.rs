use thiserror::Error;

/// Error type for encoding and decoding audio.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// File decoded to zero frames
    #[error("no audio data")]
    Empty,

    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u16),
}

pub type FormatResult<T> = Result<T, FormatError>;
