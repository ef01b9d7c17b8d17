use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Detection service unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("Malformed detection: {0}")]
    MalformedDetection(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
