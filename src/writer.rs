//! Pack traces into fixed-length records.
//!
//! [`RecordWriter::pack`] cuts as many samples as the codec fits into each
//! record, hands the finished record to a [`RecordSink`] and removes the
//! packed samples from the trace. Without `flush` the trailing partial record
//! is held back so a later call can continue the stream.

use std::io::{self, Write};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::codec::CodecRegistry;
use crate::decode::MAX_RECORD_LENGTH;
use crate::encode::{HeaderFields, data_offset_for, write_header};
use crate::steim::FRAME_SIZE;
use crate::time::seconds_to_micros;
use crate::trace::{Trace, TraceGroup};
use crate::types::{ByteOrder, EncodingFormat};
use crate::{MseedError, Result};

/// The header sample count is 16 bits.
pub const MAX_SAMPLES_PER_RECORD: usize = u16::MAX as usize;
/// Smallest record length accepted when writing.
pub const MIN_WRITE_LENGTH: u32 = 1 << 8;

/// Destination for packed records.
pub trait RecordSink {
    fn write_record(&mut self, record: &[u8]) -> io::Result<()>;
}

impl<F> RecordSink for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self(record)
    }
}

/// Writes records back to back into any [`Write`].
#[derive(Debug)]
pub struct IoSink<W> {
    inner: W,
    records: usize,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    /// Records written so far.
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RecordSink for IoSink<W> {
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.inner.write_all(record)?;
        self.records += 1;
        Ok(())
    }
}

/// Options for [`RecordWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Power of two in 256..=1048576.
    pub record_length: u32,
    pub encoding: EncodingFormat,
    pub byte_order: ByteOrder,
    pub data_quality: char,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            record_length: 4096,
            encoding: EncodingFormat::Steim2,
            byte_order: ByteOrder::Big,
            data_quality: 'D',
        }
    }
}

impl WriterOptions {
    pub fn with_record_length(mut self, record_length: u32) -> Self {
        self.record_length = record_length;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingFormat) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_data_quality(mut self, data_quality: char) -> Self {
        self.data_quality = data_quality;
        self
    }

    fn validate(&self) -> Result<()> {
        let length = self.record_length;
        if !length.is_power_of_two() || !(MIN_WRITE_LENGTH..=MAX_RECORD_LENGTH).contains(&length) {
            return Err(MseedError::InvalidRecordLength(length));
        }
        Ok(())
    }
}

/// Counts from one [`RecordWriter::pack`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub records: usize,
    pub samples: usize,
}

/// Packs traces into records, numbering them across calls.
#[derive(Debug)]
pub struct RecordWriter {
    options: WriterOptions,
    registry: CodecRegistry,
    next_sequence: u32,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self::new(WriterOptions::default())
    }
}

impl RecordWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self {
            options,
            registry: CodecRegistry::standard(),
            next_sequence: 1,
        }
    }

    /// Replace the standard codec registry.
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Number the next record `sequence_number`.
    pub fn with_sequence_number(mut self, sequence_number: u32) -> Self {
        self.next_sequence = sequence_number.clamp(1, 999_999);
        self
    }

    /// Options used for every record.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Pack `trace` into records delivered to `sink`.
    ///
    /// Packed samples are removed from the trace and its start time moves to
    /// the first unpacked sample. Unless `flush` is set, samples that would
    /// only fill part of a record stay in the trace.
    pub fn pack<S>(&mut self, trace: &mut Trace, sink: &mut S, flush: bool) -> Result<PackSummary>
    where
        S: RecordSink + ?Sized,
    {
        self.options.validate()?;
        let options = self.options;
        let codec = self.registry.get(options.encoding.to_code())?;
        let record_length = options.record_length as usize;
        let data_offset = data_offset_for(trace.sample_rate);
        let capacity = record_length - data_offset;

        let mut summary = PackSummary::default();
        let mut buf = vec![0u8; record_length];
        let Some(samples) = trace.samples.as_mut() else {
            return Err(MseedError::MissingSamples);
        };

        while !samples.is_empty() {
            let remaining = samples.len();
            let take = remaining.min(MAX_SAMPLES_PER_RECORD);
            let encoded = codec.encode(samples.slice(0..take), capacity, options.byte_order)?;
            let count = encoded.sample_count;
            if count == 0 {
                return Err(MseedError::EncodeError(format!(
                    "no samples fit in a {record_length} byte record"
                )));
            }
            let full = count < remaining
                || count == MAX_SAMPLES_PER_RECORD
                || encoded.payload.len() >= capacity;
            if !flush && !full {
                break;
            }

            let fields = HeaderFields {
                sequence_number: take_sequence(&mut self.next_sequence),
                data_quality: options.data_quality,
                stream: trace.stream.clone(),
                start_time: trace.start_time,
                sample_rate: trace.sample_rate,
                sample_count: count,
                encoding: options.encoding.to_code(),
                byte_order: options.byte_order,
                record_length: options.record_length,
                // 0 when unknown or beyond the one-byte field
                frame_count: if options.encoding.is_steim() {
                    u8::try_from(encoded.payload.len() / FRAME_SIZE).unwrap_or(0)
                } else {
                    0
                },
            };
            buf.fill(0);
            let offset = write_header(&mut buf, &fields)?;
            buf[offset..offset + encoded.payload.len()].copy_from_slice(&encoded.payload);
            sink.write_record(&buf)?;
            debug!(
                "packed record {} of {}: {count} samples",
                fields.sequence_number, fields.stream
            );

            samples.drain_front(count);
            if trace.sample_rate > 0.0 {
                trace.start_time += seconds_to_micros(count as f64 / trace.sample_rate);
            }
            summary.records += 1;
            summary.samples += count;
        }

        trace.sample_count = trace.samples.as_ref().map_or(0, |s| s.len());
        trace.update_end_time();
        Ok(summary)
    }

    /// Pack every trace of `group` in order.
    pub fn pack_group<S>(
        &mut self,
        group: &mut TraceGroup,
        sink: &mut S,
        flush: bool,
    ) -> Result<PackSummary>
    where
        S: RecordSink + ?Sized,
    {
        let mut total = PackSummary::default();
        for trace in group.iter_mut() {
            let summary = self.pack(trace, sink, flush)?;
            total.records += summary.records;
            total.samples += summary.samples;
        }
        Ok(total)
    }
}

/// Return the current sequence number and advance it, wrapping after 999999.
fn take_sequence(next: &mut u32) -> u32 {
    let sequence = *next;
    *next = if sequence >= 999_999 { 1 } else { sequence + 1 };
    sequence
}
