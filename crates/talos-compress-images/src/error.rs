use thiserror::Error;

/// Errors raised by the compress-images plugin
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid asset path: '{0}'")]
    InvalidAssetPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compressor failed: {0}")]
    Compressor(String),

    #[error("Unsupported compression engine: {0}")]
    UnsupportedEngine(String),

    #[error("Asset task failed to complete: {0}")]
    TaskJoin(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for PluginError {
    fn from(err: serde_yaml::Error) -> Self {
        PluginError::Config(err.to_string())
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
