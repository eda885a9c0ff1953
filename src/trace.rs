//! Continuous traces and their assembly from records.
//!
//! A [`Trace`] is a run of evenly spaced samples of one stream. The
//! [`TraceAssembler`] merges records into traces as they arrive: a record
//! extends the open trace of its stream when the rates agree and it starts
//! where the trace's next sample is expected, otherwise the open trace is
//! closed and a new one started.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::ops::Index;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::{Warning, WithWarnings};
use crate::reader::{ReadOptions, RecordReader};
use crate::record::{Record, Samples, end_time_of};
use crate::sid::StreamId;
use crate::time::{TimeFormat, micros_to_datetime, seconds_to_micros};
use crate::types::SampleType;

/// Default relative sample rate tolerance.
pub const RATE_TOLERANCE: f64 = 1e-4;

/// `true` when `|1 - r1/r2|` is below the default tolerance.
///
/// ```
/// use miniseed_traces::rate_is_tolerable;
///
/// assert!(rate_is_tolerable(100.0, 100.005));
/// assert!(!rate_is_tolerable(100.0, 100.02));
/// ```
pub fn rate_is_tolerable(r1: f64, r2: f64) -> bool {
    (1.0 - r1 / r2).abs() < RATE_TOLERANCE
}

/// A contiguous, evenly sampled run of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub stream: StreamId,
    pub data_quality: char,
    /// First sample, microseconds since the epoch.
    pub start_time: i64,
    /// Last sample, microseconds since the epoch.
    pub end_time: i64,
    pub sample_rate: f64,
    /// `None` when read headers-only with an unknown encoding.
    pub sample_type: Option<SampleType>,
    pub sample_count: usize,
    /// `None` when read headers-only.
    pub samples: Option<Samples>,
}

impl Trace {
    /// A quality `D` trace holding `samples`.
    pub fn new(stream: StreamId, start_time: i64, sample_rate: f64, samples: Samples) -> Self {
        let sample_count = samples.len();
        Self {
            stream,
            data_quality: 'D',
            start_time,
            end_time: end_time_of(start_time, sample_count, sample_rate),
            sample_rate,
            sample_type: Some(samples.sample_type()),
            sample_count,
            samples: Some(samples),
        }
    }

    /// A one-record trace taking its stream, timing and samples from `record`.
    pub fn from_record(record: Record) -> Self {
        let sample_count = record.sample_count();
        let header = record.header;
        let sample_type = record
            .samples
            .as_ref()
            .map(Samples::sample_type)
            .or_else(|| header.sample_type());
        Self {
            end_time: end_time_of(header.start_time, sample_count, header.sample_rate),
            stream: header.stream,
            data_quality: header.data_quality,
            start_time: header.start_time,
            sample_rate: header.sample_rate,
            sample_type,
            sample_count,
            samples: record.samples,
        }
    }

    /// Replace the quality indicator (`D`, `R`, `Q` or `M`).
    pub fn with_data_quality(mut self, data_quality: char) -> Self {
        self.data_quality = data_quality;
        self
    }

    /// Recompute `end_time` from the start, count and rate.
    pub fn update_end_time(&mut self) {
        self.end_time = end_time_of(self.start_time, self.sample_count, self.sample_rate);
    }

    /// Time of the sample at `index`.
    pub fn sample_time(&self, index: usize) -> i64 {
        if self.sample_rate > 0.0 {
            self.start_time + seconds_to_micros(index as f64 / self.sample_rate)
        } else {
            self.start_time
        }
    }

    /// Index of the sample nearest `time`, if `time` falls within the trace.
    pub fn index_at(&self, time: i64) -> Option<usize> {
        if self.sample_rate <= 0.0
            || self.sample_count == 0
            || time < self.start_time
            || time > self.end_time
        {
            return None;
        }
        let index = ((time - self.start_time) as f64 * self.sample_rate / 1e6).round() as usize;
        Some(index.min(self.sample_count - 1))
    }

    /// `count` samples from `first_index` as a new trace.
    ///
    /// Returns `None` when the range is empty or exceeds the trace.
    pub fn slice(&self, first_index: usize, count: usize) -> Option<Trace> {
        let end = first_index.checked_add(count)?;
        if count == 0 || end > self.sample_count {
            return None;
        }
        let start_time = self.sample_time(first_index);
        Some(Trace {
            stream: self.stream.clone(),
            data_quality: self.data_quality,
            start_time,
            end_time: end_time_of(start_time, count, self.sample_rate),
            sample_rate: self.sample_rate,
            sample_type: self.sample_type,
            sample_count: count,
            samples: self
                .samples
                .as_ref()
                .map(|s| s.to_owned_range(first_index..end)),
        })
    }

    /// Seconds from the first to the last sample.
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time) as f64 / 1e6
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        micros_to_datetime(self.start_time)
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        micros_to_datetime(self.end_time)
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} Hz, {} samples",
            self.stream.source_name(),
            TimeFormat::Seed.format(self.start_time),
            TimeFormat::Seed.format(self.end_time),
            self.sample_rate,
            self.sample_count
        )
    }
}

/// Ordered collection of traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceGroup {
    traces: Vec<Trace>,
}

impl TraceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Trace> {
        self.traces.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Trace> {
        self.traces.iter_mut()
    }

    pub fn as_slice(&self) -> &[Trace] {
        &self.traces
    }

    pub fn into_vec(self) -> Vec<Trace> {
        self.traces
    }

    pub fn total_samples(&self) -> usize {
        self.traces.iter().map(|t| t.sample_count).sum()
    }

    /// Sort by stream, then start time, then descending end time.
    pub fn sort(&mut self) {
        self.traces.sort_by(|a, b| {
            a.stream
                .cmp(&b.stream)
                .then(a.start_time.cmp(&b.start_time))
                .then(b.end_time.cmp(&a.end_time))
        });
    }
}

impl Index<usize> for TraceGroup {
    type Output = Trace;

    fn index(&self, index: usize) -> &Trace {
        &self.traces[index]
    }
}

impl From<Vec<Trace>> for TraceGroup {
    fn from(traces: Vec<Trace>) -> Self {
        Self { traces }
    }
}

impl FromIterator<Trace> for TraceGroup {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TraceGroup {
    type Item = Trace;
    type IntoIter = std::vec::IntoIter<Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.into_iter()
    }
}

impl<'a> IntoIterator for &'a TraceGroup {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}

impl fmt::Display for TraceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for trace in &self.traces {
            writeln!(f, "{trace}")?;
        }
        write!(f, "Total: {} trace(s)", self.traces.len())
    }
}

/// Merge tolerances for [`TraceAssembler`] and gap analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Seconds; `None` or a negative value means half a sample period.
    pub time_tolerance: Option<f64>,
    /// Relative; `None` or a negative value means [`RATE_TOLERANCE`].
    pub sample_rate_tolerance: Option<f64>,
}

impl Tolerances {
    /// Negative `seconds` selects the default.
    pub fn with_time_tolerance(mut self, seconds: f64) -> Self {
        self.time_tolerance = (seconds >= 0.0).then_some(seconds);
        self
    }

    /// Negative `tolerance` selects the default.
    pub fn with_sample_rate_tolerance(mut self, tolerance: f64) -> Self {
        self.sample_rate_tolerance = (tolerance >= 0.0).then_some(tolerance);
        self
    }

    /// `true` when `r1` and `r2` agree within the rate tolerance.
    pub fn rates_match(&self, r1: f64, r2: f64) -> bool {
        match self.sample_rate_tolerance.filter(|t| *t >= 0.0) {
            Some(tolerance) => (1.0 - r1 / r2).abs() < tolerance,
            None => rate_is_tolerable(r1, r2),
        }
    }

    /// Time tolerance in microseconds at `sample_rate`.
    pub fn time_tolerance_micros(&self, sample_rate: f64) -> f64 {
        let seconds = match self.time_tolerance.filter(|s| *s >= 0.0) {
            Some(seconds) => seconds,
            None if sample_rate > 0.0 => 0.5 / sample_rate,
            None => 0.0,
        };
        seconds * 1e6
    }
}

/// Merges records into traces, one open trace per stream.
///
/// Traces are emitted in closing order; traces still open at
/// [`finish`](Self::finish) follow in the order they were opened.
#[derive(Debug, Default)]
pub struct TraceAssembler {
    tolerances: Tolerances,
    open: HashMap<StreamId, (u64, Trace)>,
    opened: u64,
    closed: Vec<Trace>,
    warnings: Vec<Warning>,
}

impl TraceAssembler {
    pub fn new(tolerances: Tolerances) -> Self {
        Self {
            tolerances,
            ..Self::default()
        }
    }

    pub fn push(&mut self, record: Record) {
        let stream = &record.header.stream;
        let continues = match self.open.get(stream) {
            Some((_, trace)) => {
                continues_trace(trace, &record, &self.tolerances, &mut self.warnings)
            }
            None => false,
        };

        if continues {
            if let Some((_, trace)) = self.open.get_mut(stream) {
                append(trace, record);
            }
            return;
        }

        if let Some((_, trace)) = self.open.remove(stream) {
            debug!("closing trace {trace}");
            self.closed.push(trace);
        }
        let trace = Trace::from_record(record);
        debug!("opening trace {}", trace.stream);
        self.opened += 1;
        self.open.insert(trace.stream.clone(), (self.opened, trace));
    }

    /// Take the traces closed so far.
    pub fn drain_closed(&mut self) -> Vec<Trace> {
        std::mem::take(&mut self.closed)
    }

    /// Close all open traces and return every trace not already drained.
    pub fn finish(self) -> WithWarnings<TraceGroup> {
        let mut open: Vec<_> = self.open.into_values().collect();
        open.sort_by_key(|(opened, _)| *opened);

        let mut traces = self.closed;
        traces.extend(open.into_iter().map(|(_, trace)| trace));
        WithWarnings::new(TraceGroup::from(traces), self.warnings)
    }
}

fn continues_trace(
    trace: &Trace,
    record: &Record,
    tolerances: &Tolerances,
    warnings: &mut Vec<Warning>,
) -> bool {
    let header = &record.header;
    // rate 0 never merges
    if trace.sample_rate == 0.0 || header.sample_rate == 0.0 {
        return false;
    }
    if !tolerances.rates_match(trace.sample_rate, header.sample_rate) {
        let warning = Warning::RateMismatch {
            stream: trace.stream.clone(),
            previous: trace.sample_rate,
            next: header.sample_rate,
        };
        warn!("{warning}");
        warnings.push(warning);
        return false;
    }

    let expected = trace.end_time + seconds_to_micros(1.0 / trace.sample_rate);
    let tolerance = tolerances.time_tolerance_micros(trace.sample_rate);
    if (header.start_time - expected).abs() as f64 > tolerance {
        return false;
    }

    match (&trace.samples, &record.samples) {
        (Some(a), Some(b)) => a.sample_type() == b.sample_type(),
        (None, None) => true,
        _ => false,
    }
}

fn append(trace: &mut Trace, record: Record) {
    trace.sample_count += record.sample_count();
    if let (Some(samples), Some(more)) = (trace.samples.as_mut(), record.samples) {
        samples.append(more);
    }
    trace.update_end_time();
}

/// Read every record from `source` and assemble them into traces.
///
/// Reader and assembler warnings are returned together.
pub fn read_traces<R: Read>(
    source: R,
    options: &ReadOptions,
    tolerances: &Tolerances,
) -> Result<WithWarnings<TraceGroup>> {
    let mut reader = RecordReader::new(source, options.clone());
    let mut assembler = TraceAssembler::new(*tolerances);
    while let Some(record) = reader.read_next()? {
        assembler.push(record);
    }
    let mut warnings = reader.take_warnings();
    let assembled = assembler.finish();
    warnings.extend(assembled.warnings);
    Ok(WithWarnings::new(assembled.value, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordHeader;
    use crate::types::ByteOrder;

    fn record(stream: &StreamId, start: i64, rate: f64, values: Vec<i32>) -> Record {
        Record {
            header: RecordHeader {
                sequence_number: 1,
                data_quality: 'D',
                stream: stream.clone(),
                start_time: start,
                sample_rate: rate,
                sample_count: values.len(),
                encoding: 11,
                byte_order: ByteOrder::Big,
                record_length: 512,
                data_offset: 64,
                frame_count: 0,
            },
            samples: Some(Samples::Int(values)),
        }
    }

    fn fur() -> StreamId {
        StreamId::new("BW", "FUR", "", "EHZ")
    }

    #[test]
    fn test_contiguous_records_merge() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 100.0, vec![1; 500]));
        assembler.push(record(&fur(), 5_000_000, 100.0, vec![2; 500]));
        let group = assembler.finish();
        assert!(group.is_clean());
        let group = group.into_inner();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].sample_count, 1000);
        assert_eq!(group[0].end_time, 9_990_000);
        assert_eq!(group[0].samples.as_ref().map(Samples::len), Some(1000));
    }

    #[test]
    fn test_gap_opens_new_trace() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 100.0, vec![0; 100]));
        assembler.push(record(&fur(), 3_000_000, 100.0, vec![0; 100]));
        let group = assembler.finish().into_inner();
        assert_eq!(group.len(), 2);
        assert_eq!(group[1].start_time, 3_000_000);
    }

    #[test]
    fn test_within_half_sample_tolerance() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 100.0, vec![0; 100]));
        // expected next start is 1_000_000; 4 ms late is inside 5 ms
        assembler.push(record(&fur(), 1_004_000, 100.0, vec![0; 100]));
        assert_eq!(assembler.finish().value.len(), 1);
    }

    #[test]
    fn test_explicit_time_tolerance() {
        let tolerances = Tolerances::default().with_time_tolerance(0.5);
        let mut assembler = TraceAssembler::new(tolerances);
        assembler.push(record(&fur(), 0, 100.0, vec![0; 100]));
        assembler.push(record(&fur(), 1_400_000, 100.0, vec![0; 100]));
        assert_eq!(assembler.finish().value.len(), 1);
    }

    #[test]
    fn test_rate_change_warns_and_splits() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 100.0, vec![0; 100]));
        assembler.push(record(&fur(), 1_000_000, 50.0, vec![0; 100]));
        let result = assembler.finish();
        assert_eq!(result.value.len(), 2);
        assert_eq!(
            result.warnings,
            vec![Warning::RateMismatch {
                stream: fur(),
                previous: 100.0,
                next: 50.0
            }]
        );
    }

    #[test]
    fn test_zero_rate_never_merges() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 0.0, vec![1]));
        assembler.push(record(&fur(), 0, 0.0, vec![1]));
        let result = assembler.finish();
        assert_eq!(result.value.len(), 2);
        assert!(result.is_clean());
        assert_eq!(result.value[0].end_time, result.value[0].start_time);
    }

    #[test]
    fn test_mismatched_sample_types_split() {
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&fur(), 0, 1.0, vec![1, 2]));
        let mut floats = record(&fur(), 2_000_000, 1.0, vec![]);
        floats.samples = Some(Samples::Float(vec![1.0, 2.0]));
        floats.header.sample_count = 2;
        assembler.push(floats);
        assert_eq!(assembler.finish().value.len(), 2);
    }

    #[test]
    fn test_closing_order() {
        let a = StreamId::new("XX", "A", "", "BHZ");
        let b = StreamId::new("XX", "B", "", "BHZ");
        let mut assembler = TraceAssembler::new(Tolerances::default());
        assembler.push(record(&a, 0, 1.0, vec![0; 10]));
        assembler.push(record(&b, 0, 1.0, vec![0; 10]));
        // gap closes the first trace of A
        assembler.push(record(&a, 100_000_000, 1.0, vec![0; 10]));

        let drained = assembler.drain_closed();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].stream, a);

        let rest = assembler.finish().into_inner();
        let order: Vec<_> = rest.iter().map(|t| (&t.stream, t.start_time)).collect();
        assert_eq!(order, vec![(&b, 0), (&a, 100_000_000)]);
    }

    #[test]
    fn test_group_sort() {
        let mut group = TraceGroup::from(vec![
            Trace::new(StreamId::new("XX", "B", "", "BHZ"), 0, 1.0, Samples::Int(vec![0])),
            Trace::new(fur(), 10, 1.0, Samples::Int(vec![0])),
            Trace::new(fur(), 0, 1.0, Samples::Int(vec![0])),
            Trace::new(fur(), 0, 1.0, Samples::Int(vec![0; 5])),
        ]);
        group.sort();
        assert_eq!(group[0].stream, fur());
        assert_eq!(group[0].sample_count, 5);
        assert_eq!(group[1].sample_count, 1);
        assert_eq!(group[2].start_time, 10);
        assert_eq!(group[3].stream.network, "XX");
    }

    #[test]
    fn test_slice_and_index() {
        let trace = Trace::new(fur(), 1_000_000, 10.0, Samples::Int((0..100).collect()));
        assert_eq!(trace.end_time, 10_900_000);
        assert_eq!(trace.duration_seconds(), 9.9);

        let part = trace.slice(10, 20).unwrap();
        assert_eq!(part.start_time, 2_000_000);
        assert_eq!(part.end_time, 3_900_000);
        assert_eq!(part.samples, Some(Samples::Int((10..30).collect())));
        assert!(trace.slice(90, 20).is_none());
        assert!(trace.slice(0, 0).is_none());

        assert_eq!(trace.index_at(2_000_000), Some(10));
        assert_eq!(trace.index_at(2_040_000), Some(10));
        assert_eq!(trace.index_at(0), None);
        assert_eq!(
            trace.start_datetime().map(|dt| dt.timestamp()),
            Some(1)
        );
    }

    #[test]
    fn test_negative_tolerances_mean_default() {
        let tolerances = Tolerances::default()
            .with_time_tolerance(-1.0)
            .with_sample_rate_tolerance(-1.0);
        assert_eq!(tolerances, Tolerances::default());

        let loaded: Tolerances =
            serde_json::from_str(r#"{"time_tolerance": -1.0, "sample_rate_tolerance": -1.0}"#)
                .unwrap();
        assert!((loaded.time_tolerance_micros(100.0) - 5_000.0).abs() < 1e-6);
        assert!(loaded.rates_match(100.0, 100.005));

        let mut assembler = TraceAssembler::new(loaded);
        assembler.push(record(&fur(), 0, 100.0, vec![0; 100]));
        assembler.push(record(&fur(), 1_000_000, 100.0, vec![0; 100]));
        assert_eq!(assembler.finish().value.len(), 1);
    }

    #[test]
    fn test_rate_tolerance() {
        assert!(rate_is_tolerable(100.0, 100.005));
        assert!(!rate_is_tolerable(100.0, 100.02));
        assert!(!rate_is_tolerable(100.0, 0.0));
        let loose = Tolerances::default().with_sample_rate_tolerance(0.01);
        assert!(loose.rates_match(100.0, 100.5));
    }
}
