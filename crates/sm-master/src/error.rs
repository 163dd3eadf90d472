use sm_audio::AudioError;
use sm_formats::FormatError;
use sm_ir::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation needs the audio thread
    #[error("engine is offline")]
    Offline,

    /// The audio thread stopped answering
    #[error("audio thread disconnected")]
    Disconnected,
}

pub type ControllerResult<T> = Result<T, ControllerError>;
