use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server responded with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The server told us our sync timestamp is unrecoverably old.
    /// The only valid response is restarting from a fresh initial load,
    /// never an incremental repair.
    #[error("client state is too old, a full restart is required")]
    StaleClient,

    #[error("unknown feed {0}")]
    UnknownFeed(i64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when the only recovery is tearing down the session and
    /// starting over from `/api/current`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::StaleClient)
    }
}
