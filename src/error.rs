use thiserror::Error;

#[derive(Error, Debug)]
pub enum TttrError {
    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Range {start}..{stop} out of bounds for {axis} axis of length {len}")]
    RangeOutOfBounds {
        axis: &'static str,
        start: usize,
        stop: usize,
        len: usize,
    },

    #[error("Times must be non-decreasing (violated at index {0})")]
    UnorderedTimes(usize),

    #[error("Fine time of event {index} overflows 64 bits")]
    TimeOverflow { index: usize },

    #[error("Settings (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Table export failed: {0}")]
    Table(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, TttrError>;

impl TttrError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
