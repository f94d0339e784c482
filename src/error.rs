//! Error types shared across the crate.
//!
//! Only the outer edges (file loading, configuration, collaborator stores)
//! produce errors. The simulation and allocation paths resolve their
//! degenerate cases to zero values instead.

use std::io;

use thiserror::Error;

/// Failure reading from the participant/meter storage collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("malformed meter row for `{participant_id}`: {reason}")]
    MalformedRow {
        participant_id: String,
        reason: String,
    },
}

/// Failure talking to the cache collaborator.
///
/// Callers treat every variant as a cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cached value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure loading tabular input (participants, meter readings, billing data).
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {message}")]
    InvalidRecord { line: u64, message: String },

    #[error("{0}")]
    Invalid(String),
}

pub type DataResult<T> = Result<T, DataError>;
