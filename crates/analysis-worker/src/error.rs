//! Worker error types

pub use chess_core::PgnError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine I/O error: {0}")]
    EngineIo(#[from] std::io::Error),

    #[error("Engine exited before answering")]
    EngineExited,

    #[error("Engine search timed out after {0} ms")]
    SearchTimeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("PGN error: {0}")]
    Pgn(#[from] PgnError),
}

impl WorkerError {
    /// Errors caused by the caller's request rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, WorkerError::InvalidInput(_) | WorkerError::Pgn(_))
    }
}
