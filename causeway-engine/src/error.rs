use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by an outbound engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dial failed: {0}")]
    Dial(String),

    #[error("unsupported destination: {0}")]
    Unsupported(String),

    #[error("engine closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
