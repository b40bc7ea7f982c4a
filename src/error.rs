use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Startup-time configuration failures. Always fatal for the whole invocation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Load(#[from] config::ConfigError),

    #[error("Camera '{camera}' is missing required field '{field}'")]
    MissingField { camera: String, field: &'static str },

    #[error("Invalid camera spec '{spec}': {details}")]
    InvalidCameraSpec { spec: String, details: String },

    #[error("Invalid setting {key}: {details}")]
    Invalid { key: &'static str, details: String },

    #[error("No cameras configured")]
    NoCameras,
}

/// Transport-level failures. Recovered inside the stream source by reconnecting.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {url}: {details}")]
    Open { url: String, details: String },

    #[error("Read failed: {details}")]
    Read { details: String },

    #[error("Read timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Stream ended")]
    EndOfStream,
}

/// Encoder failures. Fatal to the worker that owns the sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to spawn encoder '{program}': {details}")]
    Spawn { program: String, details: String },

    #[error("Cannot prepare output directory {path}: {details}")]
    OutputDir { path: String, details: String },

    #[error(
        "Frame is {actual_width}x{actual_height}, \
         encoder expects {expected_width}x{expected_height}"
    )]
    ResolutionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Encoder exited unexpectedly: {details}")]
    EncoderExited { details: String },

    #[error("Encoder finished with failure status: {status}")]
    EncoderFailed { status: String },

    #[error("Sink already closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },

    #[error("Detector task failed: {details}")]
    Task { details: String },
}

pub type Result<T> = std::result::Result<T, CamwatchError>;
