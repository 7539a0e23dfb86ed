use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum StratumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer pool exhausted while fetching {0}")]
    PoolExhausted(PageId),

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("header page is full")]
    HeaderFull,

    #[error("index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, StratumError>;
