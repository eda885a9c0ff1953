//! Pure Rust miniSEED v2 reading, trace assembly, gap analysis and writing.
//!
//! Records are read one at a time with [`RecordReader`], merged into
//! continuous [`Trace`]s by [`TraceAssembler`], checked for gaps and
//! overlaps with [`find_gaps`], reduced to min/max [`Envelope`]s for drawing,
//! and packed back into records by [`RecordWriter`]. Sample payloads go
//! through a [`CodecRegistry`]; Steim1/2, INT16/32, FLOAT32/64 and ASCII are
//! built in.
//!
//! The crate logs through the [`log`] facade and never installs a logger.
//!
//! # Writing and reading back
//!
//! ```
//! use miniseed_traces::{
//!     IoSink, ReadOptions, RecordWriter, Samples, StreamId, Tolerances, Trace, WriterOptions,
//!     read_traces,
//! };
//!
//! let stream = StreamId::new("IU", "ANMO", "00", "BHZ");
//! let mut trace = Trace::new(stream, 0, 20.0, Samples::Int((0..5000).collect()));
//!
//! let mut writer = RecordWriter::new(WriterOptions::default().with_record_length(512));
//! let mut sink = IoSink::new(Vec::new());
//! let summary = writer.pack(&mut trace, &mut sink, true).unwrap();
//! assert_eq!(summary.samples, 5000);
//!
//! let bytes = sink.into_inner();
//! let group = read_traces(bytes.as_slice(), &ReadOptions::default(), &Tolerances::default())
//!     .unwrap()
//!     .into_inner();
//! assert_eq!(group.len(), 1);
//! assert_eq!(group[0].sample_count, 5000);
//! ```
//!
//! # Gaps and envelopes
//!
//! ```
//! use miniseed_traces::{GapFilter, Samples, StreamId, Trace, TraceGroup, envelope, find_gaps};
//!
//! let stream = StreamId::new("BW", "FUR", "", "EHZ");
//! let trace = Trace::new(stream, 0, 100.0, Samples::Int((0..1000).collect()));
//!
//! let group = TraceGroup::from(vec![trace]);
//! assert!(find_gaps(&group, &GapFilter::default()).value.is_empty());
//!
//! let env = envelope(&group, 10, None).unwrap();
//! assert!(env.columns.iter().flatten().all(|c| c.max - c.min == 99.0));
//! ```

pub mod codec;
pub mod decode;
pub mod encode;
pub mod envelope;
pub mod error;
pub mod gaps;
pub mod reader;
pub mod record;
pub mod sid;
pub mod steim;
pub mod time;
pub mod trace;
pub mod types;
pub mod writer;

pub use codec::{Codec, CodecRegistry, Encoded};
pub use envelope::{Envelope, MinMax, TimeWindow, alternating_extrema, envelope, envelope_trace};
pub use error::{MseedError, Result, Warning, WithWarnings};
pub use gaps::{
    Continuity, GapDescriptor, GapFilter, RecordContinuity, find_gaps, gap_list, record_continuity,
};
pub use reader::{ReadOptions, RecordLength, RecordReader, first_header, read_records, time_span};
pub use record::{Record, RecordHeader, SampleSlice, Samples};
pub use sid::StreamId;
pub use time::{BTime, TimeFormat};
pub use trace::{Tolerances, Trace, TraceAssembler, TraceGroup, rate_is_tolerable, read_traces};
pub use types::{ByteOrder, EncodingFormat, SampleType};
pub use writer::{IoSink, PackSummary, RecordSink, RecordWriter, WriterOptions};

pub use decode::{is_valid_header, parse_header};
