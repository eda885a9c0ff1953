//! Error and warning types for miniSEED reading, assembly and writing.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::sid::StreamId;

#[derive(Debug, Error)]
pub enum MseedError {
    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("malformed record at byte {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    #[error("unsupported encoding format: {0}")]
    UnsupportedEncoding(u8),

    #[error("steim decode error: {0}")]
    SteimDecode(String),

    #[error("time window {start}..{end} is inverted or outside the trace")]
    InvalidTimeWindow { start: i64, end: i64 },

    #[error("operation requires exactly one trace, group holds {0}")]
    MultiTraceUnsupported(usize),

    #[error("trace carries no decoded samples")]
    MissingSamples,

    #[error("text samples have no numeric envelope")]
    NonNumericSamples,

    #[error("envelope width must be at least 1")]
    InvalidWidth,

    #[error("invalid record length: {0}")]
    InvalidRecordLength(u32),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MseedError {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MseedError>;

/// Non-fatal conditions noticed while reading, assembling or analysing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Warning {
    /// The codec produced a different number of samples than the header declared.
    SampleCountMismatch {
        stream: StreamId,
        declared: usize,
        decoded: usize,
    },
    /// Adjacent records or traces of one stream disagree on sample rate.
    RateMismatch {
        stream: StreamId,
        previous: f64,
        next: f64,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleCountMismatch {
                stream,
                declared,
                decoded,
            } => write!(
                f,
                "{stream}: header declares {declared} samples, decoded {decoded}"
            ),
            Self::RateMismatch {
                stream,
                previous,
                next,
            } => write!(f, "{stream}: sample rate changed {previous:.10} -> {next:.10}"),
        }
    }
}

/// A result value bundled with the warnings collected while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> WithWarnings<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
