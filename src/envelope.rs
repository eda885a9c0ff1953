//! Min/max envelopes for drawing a trace at reduced resolution.
//!
//! Each output column covers a run of consecutive samples and holds their
//! minimum and maximum. With a time window, columns map to equal slices of
//! the window and columns outside the trace stay empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{SampleSlice, Samples};
use crate::time::datetime_to_micros;
use crate::trace::{Trace, TraceGroup};
use crate::{MseedError, Result};

/// Smallest and largest sample of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    fn of(slice: SampleSlice<'_>) -> Option<Self> {
        slice.min_max().map(|(min, max)| Self { min, max })
    }
}

/// One optional [`MinMax`] per pixel column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub columns: Vec<Option<MinMax>>,
}

impl Envelope {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Overall value range across populated columns.
    pub fn value_range(&self) -> Option<MinMax> {
        self.columns.iter().flatten().fold(None, |acc, c| {
            Some(match acc {
                None => *c,
                Some(r) => MinMax {
                    min: r.min.min(c.min),
                    max: r.max.max(c.max),
                },
            })
        })
    }
}

/// Closed time range in microseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn from_datetimes(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Self::new(datetime_to_micros(start), datetime_to_micros(end))
    }

    /// Window covering exactly `trace`.
    pub fn of_trace(trace: &Trace) -> Self {
        Self::new(trace.start_time, trace.end_time)
    }
}

/// Envelope of the only trace in `group`.
///
/// Fails with [`MseedError::MultiTraceUnsupported`] unless the group holds
/// exactly one trace.
pub fn envelope(group: &TraceGroup, width: usize, window: Option<TimeWindow>) -> Result<Envelope> {
    match group.as_slice() {
        [trace] => envelope_trace(trace, width, window),
        traces => Err(MseedError::MultiTraceUnsupported(traces.len())),
    }
}

fn numeric_samples(trace: &Trace) -> Result<&Samples> {
    let samples = trace.samples.as_ref().ok_or(MseedError::MissingSamples)?;
    if let Samples::Text(_) = samples {
        return Err(MseedError::NonNumericSamples);
    }
    Ok(samples)
}

/// Envelope of `trace` over `width` columns.
///
/// Without a window (or with the trace's own span) the samples are split
/// into `width` runs of `n / width`, the last run taking the remainder.
///
/// ```
/// use miniseed_traces::{Samples, StreamId, Trace, envelope_trace};
///
/// let id = StreamId::new("BW", "FUR", "", "EHZ");
/// let trace = Trace::new(id, 0, 100.0, Samples::Int((0..1000).collect()));
/// let env = envelope_trace(&trace, 10, None).unwrap();
/// assert_eq!(env.len(), 10);
/// let first = env.columns[0].unwrap();
/// assert_eq!((first.min, first.max), (0.0, 99.0));
/// ```
pub fn envelope_trace(trace: &Trace, width: usize, window: Option<TimeWindow>) -> Result<Envelope> {
    if width == 0 {
        return Err(MseedError::InvalidWidth);
    }
    let samples = numeric_samples(trace)?;
    match window {
        Some(window) if window != TimeWindow::of_trace(trace) => {
            windowed(trace, samples, width, window)
        }
        _ => Ok(whole_trace(samples, width)),
    }
}

fn whole_trace(samples: &Samples, width: usize) -> Envelope {
    let n = samples.len();
    let step = n / width;
    let bound = |i: usize| {
        if step == 0 {
            i * n / width
        } else if i == width {
            n
        } else {
            i * step
        }
    };
    let columns = (0..width)
        .map(|i| MinMax::of(samples.slice(bound(i)..bound(i + 1))))
        .collect();
    Envelope { columns }
}

fn windowed(trace: &Trace, samples: &Samples, width: usize, window: TimeWindow) -> Result<Envelope> {
    if window.end <= window.start || window.end < trace.start_time || window.start > trace.end_time {
        return Err(MseedError::InvalidTimeWindow {
            start: window.start,
            end: window.end,
        });
    }

    let n = samples.len();
    let per_column = n as f64 / width as f64;
    let window_span = (window.end - window.start) as f64;
    let trace_span = (trace.end_time - trace.start_time) as f64;
    let step = if trace_span > 0.0 {
        per_column * window_span / trace_span
    } else if trace.sample_rate > 0.0 {
        window_span / 1e6 * trace.sample_rate / width as f64
    } else {
        per_column
    };
    // samples between the window start and the first sample
    let offset = (trace.start_time - window.start) as f64 * trace.sample_rate / 1e6;

    let bound = |position: f64| position.ceil().clamp(0.0, n as f64) as usize;
    let columns = (0..width)
        .map(|c| {
            let lo = bound(c as f64 * step - offset);
            let hi = bound((c + 1) as f64 * step - offset);
            MinMax::of(samples.slice(lo..hi.max(lo)))
        })
        .collect();
    Ok(Envelope { columns })
}

/// One value per column, alternating between the column maximum (even
/// columns) and minimum (odd columns).
///
/// `width` is clamped to the sample count.
pub fn alternating_extrema(trace: &Trace, width: usize) -> Result<Vec<f64>> {
    if width == 0 {
        return Err(MseedError::InvalidWidth);
    }
    let samples = numeric_samples(trace)?;
    let n = samples.len();
    let width = width.min(n);
    if width == 0 {
        return Ok(Vec::new());
    }
    let step = n / width;
    Ok((0..width)
        .filter_map(|x| {
            let (min, max) = samples.slice(x * step..(x + 1) * step).min_max()?;
            Some(if x % 2 == 1 { min } else { max })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sid::StreamId;

    fn ramp(n: i32) -> Trace {
        Trace::new(
            StreamId::new("BW", "FUR", "", "EHZ"),
            0,
            100.0,
            Samples::Int((0..n).collect()),
        )
    }

    fn spans(env: &Envelope) -> usize {
        env.columns
            .iter()
            .flatten()
            .map(|c| (c.max - c.min) as usize + 1)
            .sum()
    }

    #[test]
    fn test_even_columns() {
        let env = envelope_trace(&ramp(1000), 10, None).unwrap();
        assert_eq!(env.len(), 10);
        for (i, column) in env.columns.iter().enumerate() {
            let column = column.unwrap();
            assert_eq!(column.min, (i * 100) as f64);
            assert_eq!(column.max, (i * 100 + 99) as f64);
        }
        assert_eq!(spans(&env), 1000);
    }

    #[test]
    fn test_last_column_takes_remainder() {
        let env = envelope_trace(&ramp(1005), 10, None).unwrap();
        let last = env.columns[9].unwrap();
        assert_eq!((last.min, last.max), (900.0, 1004.0));
        assert_eq!(spans(&env), 1005);
        assert!(env.columns.iter().flatten().all(|c| c.min <= c.max));
    }

    #[test]
    fn test_fewer_samples_than_columns() {
        let env = envelope_trace(&ramp(3), 6, None).unwrap();
        let populated = env.columns.iter().flatten().count();
        assert_eq!(populated, 3);
        assert_eq!(spans(&env), 3);
    }

    #[test]
    fn test_window_matching_trace_is_whole() {
        let trace = ramp(1000);
        let window = TimeWindow::of_trace(&trace);
        assert_eq!(
            envelope_trace(&trace, 10, Some(window)).unwrap(),
            envelope_trace(&trace, 10, None).unwrap()
        );
    }

    #[test]
    fn test_window_with_leading_space() {
        let trace = ramp(1000);
        // 4.995 s of empty space before the trace: 1.5x the trace span
        let window = TimeWindow::new(-4_995_000, trace.end_time);
        let env = envelope_trace(&trace, 10, Some(window)).unwrap();
        assert_eq!(env.len(), 10);
        assert!(env.columns[..3].iter().all(Option::is_none));
        assert_eq!(env.columns[3], Some(MinMax { min: 0.0, max: 100.0 }));
        assert_eq!(env.columns[4], Some(MinMax { min: 101.0, max: 250.0 }));
        assert_eq!(env.columns[9], Some(MinMax { min: 851.0, max: 999.0 }));
        assert_eq!(spans(&env), 1000);
    }

    #[test]
    fn test_window_with_trailing_space() {
        let trace = ramp(1000);
        let window = TimeWindow::new(0, trace.end_time + 4_995_000);
        let env = envelope_trace(&trace, 10, Some(window)).unwrap();
        assert_eq!(env.len(), 10);
        assert!(env.columns[..7].iter().all(Option::is_some));
        assert_eq!(env.columns[0], Some(MinMax { min: 0.0, max: 149.0 }));
        // partial: only 100 of 150 sample slots lie inside the trace
        assert_eq!(env.columns[6], Some(MinMax { min: 900.0, max: 999.0 }));
        assert!(env.columns[7..].iter().all(Option::is_none));
        assert_eq!(spans(&env), 1000);
    }

    #[test]
    fn test_window_inside_trace() {
        let trace = ramp(1000);
        // middle half of the trace
        let window = TimeWindow::new(2_497_500, 7_492_500);
        let env = envelope_trace(&trace, 5, Some(window)).unwrap();
        assert!(env.columns.iter().all(Option::is_some));
        let range = env.value_range().unwrap();
        assert!(range.min >= 249.0 && range.max <= 750.0);
    }

    #[test]
    fn test_invalid_windows() {
        let trace = ramp(100);
        for window in [
            TimeWindow::new(5, 5),
            TimeWindow::new(10, 5),
            TimeWindow::new(100_000_000, 200_000_000),
            TimeWindow::new(-200, -100),
        ] {
            assert!(matches!(
                envelope_trace(&trace, 4, Some(window)),
                Err(MseedError::InvalidTimeWindow { .. })
            ));
        }
    }

    #[test]
    fn test_argument_errors() {
        let trace = ramp(10);
        assert!(matches!(
            envelope_trace(&trace, 0, None),
            Err(MseedError::InvalidWidth)
        ));

        let mut headers_only = trace.clone();
        headers_only.samples = None;
        assert!(matches!(
            envelope_trace(&headers_only, 4, None),
            Err(MseedError::MissingSamples)
        ));

        let text = Trace::new(StreamId::default(), 0, 0.0, Samples::Text(b"abc".to_vec()));
        assert!(matches!(
            envelope_trace(&text, 4, None),
            Err(MseedError::NonNumericSamples)
        ));

        let group = TraceGroup::from(vec![trace.clone(), trace]);
        assert!(matches!(
            envelope(&group, 4, None),
            Err(MseedError::MultiTraceUnsupported(2))
        ));
    }

    #[test]
    fn test_alternating_extrema() {
        let values = alternating_extrema(&ramp(10), 5).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 5.0, 6.0, 9.0]);
        // width beyond the sample count is clamped
        assert_eq!(alternating_extrema(&ramp(3), 10).unwrap().len(), 3);
    }

    #[test]
    fn test_value_range_and_serialization() {
        let env = Envelope {
            columns: vec![
                None,
                Some(MinMax { min: -3.0, max: 4.0 }),
                Some(MinMax { min: 1.0, max: 9.0 }),
            ],
        };
        assert_eq!(env.value_range(), Some(MinMax { min: -3.0, max: 9.0 }));
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"columns":[null,{"min":-3.0,"max":4.0},{"min":1.0,"max":9.0}]}"#);
    }
}
