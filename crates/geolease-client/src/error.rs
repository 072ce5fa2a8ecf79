use thiserror::Error;

use geolease_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("ledger rejected the call: {0}")]
    Ledger(#[from] LedgerError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
