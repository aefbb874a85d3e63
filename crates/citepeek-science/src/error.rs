use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("invalid bibliography key: {0}")]
    InvalidBibKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, gave up after {1} waits")]
    RateLimit(String, u32),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl ScienceError {
    /// Errors worth another attempt at the transport level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::RateLimit(..))
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
