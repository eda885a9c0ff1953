//! Decoded record types: [`RecordHeader`], [`Record`] and [`Samples`].

use std::fmt;
use std::ops::Range;

use crate::sid::StreamId;
use crate::time::TimeFormat;
use crate::types::{ByteOrder, EncodingFormat, SampleType};

/// Fixed-field view of a miniSEED v2 record header.
///
/// `start_time` already includes any applied time correction and the
/// blockette 1001 microsecond offset.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub sequence_number: u32,
    pub data_quality: char,
    pub stream: StreamId,
    /// Microseconds since the epoch, UTC.
    pub start_time: i64,
    /// Samples per second; 0 for state-of-health records.
    pub sample_rate: f64,
    pub sample_count: usize,
    /// Raw blockette 1000 encoding code.
    pub encoding: u8,
    /// Byte order of the data payload.
    pub byte_order: ByteOrder,
    pub record_length: u32,
    /// Offset of the data payload from the start of the record.
    pub data_offset: usize,
    /// Steim frame count from blockette 1001, 0 when unknown.
    pub frame_count: u8,
}

impl RecordHeader {
    /// Sample type the encoding decodes to, if the encoding is known.
    pub fn sample_type(&self) -> Option<SampleType> {
        EncodingFormat::from_code(self.encoding)
            .ok()
            .map(EncodingFormat::sample_type)
    }

    /// Time of the last sample in this record.
    pub fn end_time(&self) -> i64 {
        end_time_of(self.start_time, self.sample_count, self.sample_rate)
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06} {} | {} | {} Hz | {} samples (encoding {})",
            self.sequence_number,
            self.stream,
            TimeFormat::Seed.format(self.start_time),
            self.sample_rate,
            self.sample_count,
            self.encoding,
        )
    }
}

/// `start + round((count - 1) / rate)` in microseconds; `start` when the
/// rate is zero or there are no samples.
pub(crate) fn end_time_of(start: i64, sample_count: usize, sample_rate: f64) -> i64 {
    if sample_rate > 0.0 && sample_count > 0 {
        start + ((sample_count - 1) as f64 / sample_rate * 1_000_000.0).round() as i64
    } else {
        start
    }
}

/// One record as read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub header: RecordHeader,
    /// `None` when the record was read headers-only.
    pub samples: Option<Samples>,
}

impl Record {
    /// Number of samples: the decoded count when present, else the header count.
    pub fn sample_count(&self) -> usize {
        self.samples
            .as_ref()
            .map_or(self.header.sample_count, Samples::len)
    }
}

/// Decoded sample data.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<u8>),
}

impl Samples {
    pub fn empty(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::Int => Self::Int(Vec::new()),
            SampleType::Float => Self::Float(Vec::new()),
            SampleType::Double => Self::Double(Vec::new()),
            SampleType::Text => Self::Text(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
            Samples::Double(v) => v.len(),
            Samples::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::Int(_) => SampleType::Int,
            Samples::Float(_) => SampleType::Float,
            Samples::Double(_) => SampleType::Double,
            Samples::Text(_) => SampleType::Text,
        }
    }

    /// Borrow a sub-range.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> SampleSlice<'_> {
        match self {
            Samples::Int(v) => SampleSlice::Int(&v[range]),
            Samples::Float(v) => SampleSlice::Float(&v[range]),
            Samples::Double(v) => SampleSlice::Double(&v[range]),
            Samples::Text(v) => SampleSlice::Text(&v[range]),
        }
    }

    pub fn as_slice(&self) -> SampleSlice<'_> {
        self.slice(0..self.len())
    }

    /// Append `other`; returns `false` (leaving `self` unchanged) when the
    /// sample types differ.
    pub fn append(&mut self, other: Samples) -> bool {
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => a.extend(b),
            (Samples::Float(a), Samples::Float(b)) => a.extend(b),
            (Samples::Double(a), Samples::Double(b)) => a.extend(b),
            (Samples::Text(a), Samples::Text(b)) => a.extend(b),
            _ => return false,
        }
        true
    }

    /// Remove the first `n` samples.
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.len());
        match self {
            Samples::Int(v) => drop(v.drain(..n)),
            Samples::Float(v) => drop(v.drain(..n)),
            Samples::Double(v) => drop(v.drain(..n)),
            Samples::Text(v) => drop(v.drain(..n)),
        }
    }

    /// Owned copy of a sub-range.
    pub fn to_owned_range(&self, range: Range<usize>) -> Samples {
        match self.slice(range) {
            SampleSlice::Int(v) => Samples::Int(v.to_vec()),
            SampleSlice::Float(v) => Samples::Float(v.to_vec()),
            SampleSlice::Double(v) => Samples::Double(v.to_vec()),
            SampleSlice::Text(v) => Samples::Text(v.to_vec()),
        }
    }
}

/// Borrowed view of a run of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleSlice<'a> {
    Int(&'a [i32]),
    Float(&'a [f32]),
    Double(&'a [f64]),
    Text(&'a [u8]),
}

impl SampleSlice<'_> {
    pub fn len(&self) -> usize {
        match self {
            SampleSlice::Int(v) => v.len(),
            SampleSlice::Float(v) => v.len(),
            SampleSlice::Double(v) => v.len(),
            SampleSlice::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleSlice::Int(_) => SampleType::Int,
            SampleSlice::Float(_) => SampleType::Float,
            SampleSlice::Double(_) => SampleType::Double,
            SampleSlice::Text(_) => SampleType::Text,
        }
    }

    /// Minimum and maximum as `f64`; `None` for an empty or text slice.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        fn fold<T: Copy + Into<f64>>(v: &[T]) -> Option<(f64, f64)> {
            v.iter().map(|&x| x.into()).fold(None, |acc, x: f64| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
        }
        match self {
            SampleSlice::Int(v) => fold(v),
            SampleSlice::Float(v) => fold(v),
            SampleSlice::Double(v) => fold(v),
            SampleSlice::Text(_) => None,
        }
    }
}
