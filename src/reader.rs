//! Streaming reader for concatenated miniSEED records.
//!
//! [`RecordReader`] pulls one record at a time from any [`Read`] source,
//! skipping non-record bytes when asked to. The free functions cover the
//! common one-shot cases.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::codec::CodecRegistry;
use crate::decode::{
    FIXED_HEADER_SIZE, MAX_RECORD_LENGTH, MIN_RECORD_LENGTH, decode_samples, detect_record_length,
    parse_header, validate_fixed_header,
};
use crate::error::{Warning, WithWarnings};
use crate::record::{Record, RecordHeader, Samples};
use crate::{MseedError, Result};

/// Bytes examined when detecting a record length from its blockettes.
const HEADER_PEEK: usize = 256;

/// How the length of each record is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordLength {
    /// Detect from the first record's blockette 1000 and reuse it.
    DetectFirst,
    /// Detect from every record's blockette 1000.
    #[default]
    DetectEach,
    /// Trust this length for every record.
    Fixed(u32),
}

impl RecordLength {
    /// `0` detects once, negative detects per record, positive is fixed.
    ///
    /// Fixed lengths outside 128..=1048576 are rejected when reading starts.
    pub fn from_hint(hint: i64) -> Self {
        match hint {
            0 => Self::DetectFirst,
            h if h < 0 => Self::DetectEach,
            h => Self::Fixed(u32::try_from(h).unwrap_or(u32::MAX)),
        }
    }
}

/// Options for [`RecordReader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub record_length: RecordLength,
    /// Decode payloads; when `false` records carry headers only.
    pub decode_samples: bool,
    /// Step over bytes that do not start a valid record instead of failing.
    pub skip_invalid: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            record_length: RecordLength::DetectEach,
            decode_samples: true,
            skip_invalid: true,
        }
    }
}

impl ReadOptions {
    pub fn with_record_length(mut self, record_length: RecordLength) -> Self {
        self.record_length = record_length;
        self
    }

    pub fn with_decode_samples(mut self, decode_samples: bool) -> Self {
        self.decode_samples = decode_samples;
        self
    }

    pub fn with_skip_invalid(mut self, skip_invalid: bool) -> Self {
        self.skip_invalid = skip_invalid;
        self
    }
}

/// Reads records one at a time from a byte source.
///
/// A [`MseedError::MalformedRecord`] leaves the cursor on the offending byte;
/// call [`skip`](Self::skip) or enable skipping through
/// [`options_mut`](Self::options_mut) before reading again. Errors raised
/// while decoding a payload consume the record.
///
/// # Example
///
/// ```
/// use miniseed_traces::{IoSink, ReadOptions, RecordReader, RecordWriter, Samples, StreamId, Trace};
///
/// let stream = StreamId::new("XX", "TEST", "00", "BHZ");
/// let mut trace = Trace::new(stream, 0, 20.0, Samples::Int(vec![1, 2, 3]));
/// let mut sink = IoSink::new(Vec::new());
/// RecordWriter::default().pack(&mut trace, &mut sink, true).unwrap();
/// let bytes = sink.into_inner();
///
/// let records = RecordReader::new(bytes.as_slice(), ReadOptions::default())
///     .collect::<Result<Vec<_>, _>>()
///     .unwrap();
/// assert_eq!(records.len(), 1);
/// assert_eq!(records[0].sample_count(), 3);
/// ```
pub struct RecordReader<R> {
    source: R,
    options: ReadOptions,
    registry: CodecRegistry,
    buf: Vec<u8>,
    pos: usize,
    /// Source offset of `buf[pos]`.
    offset: u64,
    eof: bool,
    detected_length: Option<u32>,
    skipped: u64,
    halted: bool,
    warnings: Vec<Warning>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(source: R, options: ReadOptions) -> Self {
        Self {
            source,
            options,
            registry: CodecRegistry::standard(),
            buf: Vec::new(),
            pos: 0,
            offset: 0,
            eof: false,
            detected_length: None,
            skipped: 0,
            halted: false,
            warnings: Vec::new(),
        }
    }

    /// Replace the standard codec registry.
    pub fn with_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Current options.
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Change options between reads; also resumes a halted iterator.
    pub fn options_mut(&mut self) -> &mut ReadOptions {
        self.halted = false;
        &mut self.options
    }

    /// Source offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Warnings collected since the last call.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Unwrap the source. Buffered but unread bytes are lost.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Discard up to `n` bytes; returns how many were discarded.
    pub fn skip(&mut self, n: usize) -> Result<usize> {
        let available = self.fill(n)?;
        let n = n.min(available);
        self.advance(n);
        self.halted = false;
        Ok(n)
    }

    /// Buffer at least `want` bytes past the cursor unless the source ends
    /// first; returns the number buffered.
    fn fill(&mut self, want: usize) -> Result<usize> {
        if self.buf.len() - self.pos >= want {
            return Ok(self.buf.len() - self.pos);
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        while self.buf.len() < want && !self.eof {
            let start = self.buf.len();
            self.buf.resize(want, 0);
            match self.source.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.eof = true;
                }
                Ok(n) => self.buf.truncate(start + n),
                Err(e) if e.kind() == ErrorKind::Interrupted => self.buf.truncate(start),
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
        Ok(self.buf.len())
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.offset += n as u64;
    }

    fn report_skipped(&mut self) {
        if self.skipped > 0 {
            warn!(
                "skipped {} bytes of non-record data before byte {}",
                self.skipped, self.offset
            );
            self.skipped = 0;
        }
    }

    fn skip_byte(&mut self, reason: &str) {
        if self.skipped == 0 {
            debug!("invalid record at byte {}: {reason}", self.offset);
        }
        self.skipped += 1;
        self.advance(1);
    }

    fn truncated(&mut self, expected: usize, actual: usize) -> Result<Option<Record>> {
        if self.options.skip_invalid {
            self.report_skipped();
            warn!(
                "ignoring truncated record at byte {}: {actual} of {expected} bytes",
                self.offset
            );
            self.advance(actual);
            Ok(None)
        } else {
            Err(MseedError::RecordTooShort { expected, actual })
        }
    }

    fn record_length(&mut self) -> Result<u32> {
        match (self.options.record_length, self.detected_length) {
            (RecordLength::Fixed(length), _)
                if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&length) =>
            {
                Err(MseedError::InvalidRecordLength(length))
            }
            (RecordLength::Fixed(length), _) | (RecordLength::DetectFirst, Some(length)) => {
                Ok(length)
            }
            (mode, _) => {
                let available = self.fill(HEADER_PEEK)?;
                let peek = &self.buf[self.pos..self.pos + available.min(HEADER_PEEK)];
                let length = detect_record_length(peek, self.offset)?;
                if mode == RecordLength::DetectFirst {
                    debug!("detected record length {length}");
                    self.detected_length = Some(length);
                }
                Ok(length)
            }
        }
    }

    /// Read the next record; `Ok(None)` at end of input.
    pub fn read_next(&mut self) -> Result<Option<Record>> {
        loop {
            let available = self.fill(FIXED_HEADER_SIZE)?;
            if available == 0 {
                self.report_skipped();
                return Ok(None);
            }
            if available < FIXED_HEADER_SIZE {
                return self.truncated(FIXED_HEADER_SIZE, available);
            }

            let head = &self.buf[self.pos..self.pos + FIXED_HEADER_SIZE];
            if let Err(reason) = validate_fixed_header(head) {
                if self.options.skip_invalid {
                    self.skip_byte(reason);
                    continue;
                }
                return Err(MseedError::malformed(self.offset, reason));
            }

            let length = match self.record_length() {
                Ok(length) => length,
                Err(MseedError::MalformedRecord { reason, .. }) if self.options.skip_invalid => {
                    self.skip_byte(&reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let length = length as usize;

            let available = self.fill(length)?;
            if available < length {
                // a later candidate may still be complete
                if self.options.skip_invalid {
                    self.skip_byte("record extends past end of input");
                    continue;
                }
                return self.truncated(length, available);
            }

            let offset = self.offset;
            let record = self.pos..self.pos + length;
            let header = match parse_header(&self.buf[record.clone()], Some(length as u32), offset) {
                Ok(header) => header,
                Err(MseedError::MalformedRecord { reason, .. }) if self.options.skip_invalid => {
                    self.skip_byte(&reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.report_skipped();

            let samples = if self.options.decode_samples {
                match decode_samples(&self.buf[record], &header, &self.registry) {
                    Ok(samples) => Some(samples),
                    Err(e) => {
                        self.advance(length);
                        return Err(e);
                    }
                }
            } else {
                None
            };
            self.advance(length);

            let decoded = samples.as_ref().map(Samples::len);
            if let Some(decoded) = decoded.filter(|&n| n != header.sample_count) {
                let warning = Warning::SampleCountMismatch {
                    stream: header.stream.clone(),
                    declared: header.sample_count,
                    decoded,
                };
                warn!("record at byte {offset}: {warning}");
                self.warnings.push(warning);
            }
            debug!("read record at byte {offset}: {header}");
            return Ok(Some(Record { header, samples }));
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    /// Stops after an error that left the cursor in place.
    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        let before = self.offset;
        match self.read_next() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                if self.offset == before {
                    self.halted = true;
                }
                Some(Err(e))
            }
        }
    }
}

/// Read every record in `data`.
pub fn read_records(data: &[u8], options: &ReadOptions) -> Result<WithWarnings<Vec<Record>>> {
    let mut reader = RecordReader::new(data, options.clone());
    let mut records = Vec::new();
    while let Some(record) = reader.read_next()? {
        records.push(record);
    }
    Ok(WithWarnings::new(records, reader.take_warnings()))
}

/// Header of the first record in `source`, if any.
pub fn first_header<R: Read>(source: R) -> Result<Option<RecordHeader>> {
    let options = ReadOptions::default().with_decode_samples(false);
    let mut reader = RecordReader::new(source, options);
    Ok(reader.read_next()?.map(|record| record.header))
}

/// Start of the first record and end of the last record in `source`.
///
/// Only the first and last records are read when the source holds records
/// of equal length; otherwise every header is scanned.
pub fn time_span<R: Read + Seek>(mut source: R, options: &ReadOptions) -> Result<Option<(i64, i64)>> {
    let options = options.clone().with_decode_samples(false);
    source.seek(SeekFrom::Start(0))?;

    let mut reader = RecordReader::new(&mut source, options.clone());
    let Some(first) = reader.read_next()? else {
        return Ok(None);
    };
    let length = u64::from(first.header.record_length);
    let first_offset = reader.position() - length;
    drop(reader);

    let end = source.seek(SeekFrom::End(0))?;
    let records = (end - first_offset) / length;
    if records > 1 {
        source.seek(SeekFrom::Start(first_offset + (records - 1) * length))?;
        let strict = options.clone().with_skip_invalid(false);
        let mut tail = RecordReader::new(&mut source, strict);
        if let Ok(Some(last)) = tail.read_next() {
            return Ok(Some((first.header.start_time, last.header.end_time())));
        }
        debug!("last record not aligned, scanning all headers");
    }

    source.seek(SeekFrom::Start(first_offset))?;
    let mut last_end = first.header.end_time();
    let mut reader = RecordReader::new(&mut source, options);
    while let Some(record) = reader.read_next()? {
        last_end = record.header.end_time();
    }
    Ok(Some((first.header.start_time, last_end)))
}
