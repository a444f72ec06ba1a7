// src/ingest/error.rs
//! Error taxonomy of the ingest pipeline. Each type maps to the smallest unit of data
//! it can lose: a row, a window, or a whole cycle.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Failure reported by the network collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("connecting to {url}: {message}")]
    Connect { url: String, message: String },
    /// Body cut off mid-transfer; a fresh download may succeed.
    #[error("reading body of {url}: {message}")]
    Body { url: String, message: String },
    /// Body arrived but could not be decoded; the same bytes will come back.
    #[error("decoding body of {url}: {message}")]
    Decode { url: String, message: String },
}

impl TransportError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Status { status, .. } if *status >= 500 || *status == 429 => {
                RetryDisposition::Retryable
            }
            Self::Status { .. } | Self::Decode { .. } => RetryDisposition::NonRetryable,
            Self::Timeout { .. } | Self::Connect { .. } | Self::Body { .. } => {
                RetryDisposition::Retryable
            }
        }
    }
}

/// The manifest could not tell us which windows exist. The cycle is skipped.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("manifest unreachable: {0}")]
    Unreachable(#[source] TransportError),
    #[error("manifest malformed: {0}")]
    Malformed(String),
    #[error("manifest has no entry matching `{0}`")]
    NoEntry(String),
}

#[derive(Debug, Error)]
pub enum FetchCause {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("payload is {actual} bytes, manifest advertised {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

impl FetchCause {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            Self::Transport(e) => e.disposition(),
            Self::TimedOut(_) => RetryDisposition::Retryable,
            Self::SizeMismatch { .. } => RetryDisposition::NonRetryable,
        }
    }
}

/// A single window could not be downloaded. Only that window's events are lost.
#[derive(Debug, Error)]
#[error("window {window} failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub window: String,
    pub attempts: u32,
    #[source]
    pub cause: FetchCause,
}

/// The payload container itself is unreadable; the window is dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("gzip stream: {0}")]
    Gzip(#[source] std::io::Error),
    #[error("zip archive: {0}")]
    Zip(String),
    #[error("inflating zip entry: {0}")]
    Inflate(#[source] std::io::Error),
}

/// Per-row rejection. Never escapes the parser except as a counted reason.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("row is not valid UTF-8")]
    Encoding,
    #[error("row has {found} columns, layout needs {expected}")]
    TooFewColumns { found: usize, expected: usize },
    #[error("row has no coordinates")]
    MissingCoordinates,
    #[error("coordinate `{0}` is not a finite number")]
    BadCoordinate(String),
    #[error("coordinate ({lat}, {lon}) is outside the globe")]
    OutOfRange { lat: f64, lon: f64 },
    #[error("row has an empty source reference")]
    EmptySource,
}

impl ParseError {
    /// Stable label for metrics and drop statistics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Encoding => "encoding",
            Self::TooFewColumns { .. } => "too_few_columns",
            Self::MissingCoordinates => "missing_coordinates",
            Self::BadCoordinate(_) => "bad_coordinate",
            Self::OutOfRange { .. } => "out_of_range",
            Self::EmptySource => "empty_source",
        }
    }
}

/// The safety switch refused to replace the current snapshot with an empty one.
#[derive(Debug, Error)]
#[error("refusing to publish an empty event set; generation {current_generation} stays current")]
pub struct EmptyResultError {
    pub current_generation: u64,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Empty(#[from] EmptyResultError),
    #[error("encoding snapshot document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Whole-cycle failure, caught at the scheduler boundary.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}
