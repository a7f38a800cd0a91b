use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlazaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backing key-value store failed. Callers own the retry policy.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown canvas {0}")]
    UnknownCanvas(u8),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tile error: {0}")]
    Tile(String),
}
