use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Log access error: {0}")]
    LogAccess(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Target '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Target '{0}' is not running")]
    NotRunning(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Shutdown in progress")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TetherError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TetherError::Cancelled)
    }
}

impl From<std::io::Error> for TetherError {
    fn from(e: std::io::Error) -> Self {
        TetherError::Internal(format!("I/O error: {}", e))
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(e: serde_json::Error) -> Self {
        TetherError::Serialization(e.to_string())
    }
}

pub type TetherResult<T> = Result<T, TetherError>;
