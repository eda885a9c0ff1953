//! Gap and overlap detection between adjacent traces.
//!
//! [`find_gaps`] walks a [`TraceGroup`] pairwise and reports the time
//! between the last sample of one trace and the first sample of the next
//! trace of the same stream. Negative gaps are overlaps; their magnitude is
//! clamped to the span of the overlapping trace plus one sample.

use std::fmt;
use std::io::Read;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::{Warning, WithWarnings};
use crate::reader::ReadOptions;
use crate::record::RecordHeader;
use crate::sid::StreamId;
use crate::time::{TimeFormat, seconds_to_micros};
use crate::trace::{Tolerances, Trace, TraceGroup, rate_is_tolerable, read_traces};

/// Bounds on the gaps reported by [`find_gaps`], in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFilter {
    /// Omit gaps shorter than this (overlaps are negative).
    pub min_gap: Option<f64>,
    /// Omit gaps longer than this.
    pub max_gap: Option<f64>,
}

impl GapFilter {
    pub fn with_min_gap(mut self, seconds: f64) -> Self {
        self.min_gap = Some(seconds);
        self
    }

    pub fn with_max_gap(mut self, seconds: f64) -> Self {
        self.max_gap = Some(seconds);
        self
    }

    fn accepts(&self, gap: f64) -> bool {
        self.min_gap.is_none_or(|min| gap >= min) && self.max_gap.is_none_or(|max| gap <= max)
    }
}

/// A gap (positive) or overlap (negative) between two traces of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapDescriptor {
    pub stream: StreamId,
    /// Last sample before the gap, microseconds since the epoch.
    pub last_sample_time: i64,
    /// First sample after the gap, microseconds since the epoch.
    pub next_sample_time: i64,
    /// Seconds.
    pub gap: f64,
    /// Samples missing (gap) or duplicated (overlap).
    pub missing_samples: f64,
}

impl GapDescriptor {
    pub fn is_overlap(&self) -> bool {
        self.gap <= 0.0
    }
}

impl fmt::Display for GapDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<17} {:<26} {:<26} {:<5} {:.8}",
            self.stream.source_name(),
            TimeFormat::Iso.format(self.last_sample_time),
            TimeFormat::Iso.format(self.next_sample_time),
            self.gap,
            self.missing_samples
        )
    }
}

/// Gap between `cur` and the following trace `next`, overlap-clamped.
fn gap_seconds(cur: &Trace, next: &Trace) -> f64 {
    let gap = (next.start_time - cur.end_time) as f64 / 1e6;
    if gap >= 0.0 {
        return gap;
    }
    let delta = if next.sample_rate != 0.0 {
        1.0 / next.sample_rate
    } else {
        0.0
    };
    let max_overlap = (next.end_time - next.start_time) as f64 / 1e6 + delta;
    if -gap > max_overlap {
        -max_overlap
    } else {
        gap
    }
}

/// Report gaps and overlaps between adjacent traces of `group`.
///
/// Pairs of different streams and traces with a zero sample rate are
/// skipped. A rate change between the pair is warned about but the gap is
/// still computed.
///
/// ```
/// use miniseed_traces::{GapFilter, Samples, StreamId, Trace, TraceGroup, find_gaps};
///
/// let id = StreamId::new("BW", "FUR", "", "EHZ");
/// let a = Trace::new(id.clone(), 0, 100.0, Samples::Int(vec![0; 100]));
/// let b = Trace::new(id, a.end_time + 2_000_000, 100.0, Samples::Int(vec![0; 100]));
/// let gaps = find_gaps(&TraceGroup::from(vec![a, b]), &GapFilter::default()).value;
/// assert_eq!(gaps.len(), 1);
/// assert_eq!(gaps[0].gap, 2.0);
/// assert_eq!(gaps[0].missing_samples, 199.0);
/// ```
pub fn find_gaps(group: &TraceGroup, filter: &GapFilter) -> WithWarnings<Vec<GapDescriptor>> {
    let mut gaps = Vec::new();
    let mut warnings = Vec::new();

    for pair in group.as_slice().windows(2) {
        let (cur, next) = (&pair[0], &pair[1]);
        if cur.stream != next.stream || cur.sample_rate == 0.0 {
            continue;
        }
        if !rate_is_tolerable(cur.sample_rate, next.sample_rate) {
            let warning = Warning::RateMismatch {
                stream: cur.stream.clone(),
                previous: cur.sample_rate,
                next: next.sample_rate,
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        let gap = gap_seconds(cur, next);
        if !filter.accepts(gap) {
            continue;
        }
        let mut missing_samples = gap.abs() * cur.sample_rate;
        if gap > 0.0 {
            missing_samples -= 1.0;
        } else {
            missing_samples += 1.0;
        }
        debug!("{}: gap of {gap} s", cur.stream);
        gaps.push(GapDescriptor {
            stream: cur.stream.clone(),
            last_sample_time: cur.end_time,
            next_sample_time: next.start_time,
            gap,
            missing_samples,
        });
    }

    WithWarnings::new(gaps, warnings)
}

/// Read `source` headers-only, sort its traces and report their gaps.
pub fn gap_list<R: Read>(
    source: R,
    options: &ReadOptions,
    tolerances: &Tolerances,
    filter: &GapFilter,
) -> Result<WithWarnings<Vec<GapDescriptor>>> {
    let options = options.clone().with_decode_samples(false);
    let WithWarnings {
        value: mut group,
        mut warnings,
    } = read_traces(source, &options, tolerances)?;
    group.sort();
    let gaps = find_gaps(&group, filter);
    warnings.extend(gaps.warnings);
    Ok(WithWarnings::new(gaps.value, warnings))
}

/// How a record relates to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuity {
    Contiguous,
    Gap,
    Overlap,
}

/// One line of a record-by-record continuity listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContinuity {
    pub sequence_number: u32,
    pub stream: StreamId,
    pub start_time: i64,
    pub sample_count: usize,
    /// Where the following record should start, microseconds.
    pub predicted_next: i64,
    /// Relation of the following record; `None` for the last record or
    /// when the following record belongs to another stream.
    pub next: Option<Continuity>,
}

/// Compare each record's start with where the previous record predicted it.
///
/// A start within half a sample period of the prediction is contiguous.
pub fn record_continuity(headers: &[RecordHeader]) -> Vec<RecordContinuity> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let predicted_next = if header.sample_rate > 0.0 {
                header.start_time + seconds_to_micros(header.sample_count as f64 / header.sample_rate)
            } else {
                header.start_time
            };
            let next = headers
                .get(i + 1)
                .filter(|next| next.stream == header.stream)
                .map(|next| {
                    let tolerance = if header.sample_rate > 0.0 {
                        0.5e6 / header.sample_rate
                    } else {
                        0.0
                    };
                    let diff = (next.start_time - predicted_next) as f64;
                    if diff.abs() <= tolerance {
                        Continuity::Contiguous
                    } else if diff > 0.0 {
                        Continuity::Gap
                    } else {
                        Continuity::Overlap
                    }
                });
            RecordContinuity {
                sequence_number: header.sequence_number,
                stream: header.stream.clone(),
                start_time: header.start_time,
                sample_count: header.sample_count,
                predicted_next,
                next,
            }
        })
        .collect()
}
