//! Error types for the posting-list store

use std::io;

use crate::DocId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("posting data corrupt: {0}")]
    Corrupt(String),

    #[error("value out of range: {0}")]
    Range(&'static str),

    #[error("document {0} not found")]
    DocNotFound(DocId),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
