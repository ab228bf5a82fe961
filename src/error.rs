use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn terminal: {0}")]
    Spawn(String),
    #[error("invalid session record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, Error>;
