use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Filtered frame has an empty extent")]
    EmptyExtent,

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Asset probe failed: {0}")]
    Probe(String),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("No scratch destination available")]
    ScratchUnavailable,

    #[error("Export did not complete: {0}")]
    Export(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] crate::ffmpeg::FfmpegError),
}

pub type Result<T> = std::result::Result<T, MediaError>;
