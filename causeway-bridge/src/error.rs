//! Error types for the flow dispatcher

use causeway_engine::EngineError;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the bridge.
///
/// Only construction errors reach the embedder; everything that can go
/// wrong inside a flow is logged and ends that flow alone.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid TUN file descriptor: {0}")]
    InvalidFd(i32),

    #[error("invalid MTU: {0}")]
    InvalidMtu(i32),

    #[error("TUN device error: {0}")]
    Device(String),

    #[error("stack error: {0}")]
    Stack(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("dial error: {0}")]
    Dial(#[from] EngineError),

    #[error("uid resolver error: {0}")]
    Resolver(String),

    #[error("bridge closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
