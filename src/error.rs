use thiserror::Error;

/// Errors that can occur while preparing or dispatching a notice
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid server URI '{0}': {1}")]
    InvalidUri(String, String),

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("Failed to dispatch request: {0}")]
    Dispatch(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that can occur when encoding or decoding the wire document
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Failed to encode notice: {0}")]
    Encode(String),

    #[error("Failed to decode notice: {0}")]
    Decode(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
