use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("raw record cannot be normalized: {0}")]
    InvalidRecord(String),

    #[error("cache storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    #[error("provider request failed: {0}")]
    ProviderUnavailable(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
