//! Parse miniSEED v2 record headers and decode their payloads.
//!
//! [`parse_header`] validates the 48-byte fixed header, walks the blockette
//! chain (100, 1000 and 1001 are understood) and normalizes time and sample
//! rate. [`decode_samples`] hands the payload to the registered codec. For
//! streams of records, see [`RecordReader`](crate::RecordReader).

use crate::codec::CodecRegistry;
use crate::record::{RecordHeader, Samples};
use crate::sid::StreamId;
use crate::steim::FRAME_SIZE;
use crate::time::BTime;
use crate::types::ByteOrder;
use crate::{MseedError, Result};

/// Size of the fixed section of the data header.
pub const FIXED_HEADER_SIZE: usize = 48;
/// Smallest record length accepted when reading.
pub const MIN_RECORD_LENGTH: u32 = 1 << 7;
/// Largest record length accepted when reading or writing.
pub const MAX_RECORD_LENGTH: u32 = 1 << 20;

/// Blockette contents this crate understands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Blockettes {
    /// Blockette 100 actual sample rate.
    pub actual_rate: Option<f32>,
    /// Blockette 1000: (encoding, word order, record length exponent).
    pub b1000: Option<(u8, u8, u8)>,
    /// Blockette 1001: (microsecond offset, frame count).
    pub b1001: Option<(i8, u8)>,
}

/// Field reader honoring the detected header byte order.
#[derive(Clone, Copy)]
struct Fields<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl Fields<'_> {
    fn u16(&self, at: usize) -> u16 {
        let bytes = [self.data[at], self.data[at + 1]];
        match self.order {
            ByteOrder::Big => u16::from_be_bytes(bytes),
            ByteOrder::Little => u16::from_le_bytes(bytes),
        }
    }

    fn i16(&self, at: usize) -> i16 {
        self.u16(at) as i16
    }

    fn u32(&self, at: usize) -> u32 {
        let bytes = [
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ];
        match self.order {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }

    fn f32(&self, at: usize) -> f32 {
        f32::from_bits(self.u32(at))
    }
}

/// Check the fixed header signature and detect its byte order.
///
/// Requires [`FIXED_HEADER_SIZE`] bytes.
pub(crate) fn validate_fixed_header(data: &[u8]) -> std::result::Result<ByteOrder, &'static str> {
    if data.len() < FIXED_HEADER_SIZE {
        return Err("fewer than 48 header bytes");
    }
    if !data[0..6]
        .iter()
        .all(|&b| b.is_ascii_digit() || b == b' ' || b == 0)
    {
        return Err("sequence number is not numeric");
    }
    if !matches!(data[6], b'D' | b'R' | b'Q' | b'M') {
        return Err("invalid data quality indicator");
    }
    if !matches!(data[7], b' ' | 0) {
        return Err("reserved header byte is not blank");
    }
    let plausible = |order| {
        let f = Fields { data, order };
        (1900..=2100).contains(&f.u16(20)) && (1..=366).contains(&f.u16(22))
    };
    let order = if plausible(ByteOrder::Big) {
        ByteOrder::Big
    } else if plausible(ByteOrder::Little) {
        ByteOrder::Little
    } else {
        return Err("start time year/day out of range in either byte order");
    };
    if data[24] > 23 || data[25] > 59 || data[26] > 60 {
        return Err("start time hour/minute/second out of range");
    }
    Ok(order)
}

/// `true` when `data` begins with a plausible fixed header.
pub fn is_valid_header(data: &[u8]) -> bool {
    validate_fixed_header(data).is_ok()
}

fn read_blockettes(f: Fields<'_>, offset: u64) -> Result<Blockettes> {
    let mut found = Blockettes::default();
    let mut at = f.u16(46) as usize;
    let mut prev = 0usize;

    while at != 0 {
        if at < FIXED_HEADER_SIZE || at <= prev || at + 4 > f.data.len() {
            return Err(MseedError::malformed(
                offset,
                format!("blockette offset {at} outside the record"),
            ));
        }
        let blockette_type = f.u16(at);
        let next = f.u16(at + 2) as usize;
        let need = |len: usize| {
            if at + len > f.data.len() {
                Err(MseedError::malformed(
                    offset,
                    format!("blockette {blockette_type} truncated"),
                ))
            } else {
                Ok(())
            }
        };
        match blockette_type {
            100 => {
                need(12)?;
                found.actual_rate = Some(f.f32(at + 4));
            }
            1000 => {
                need(8)?;
                found.b1000 = Some((f.data[at + 4], f.data[at + 5], f.data[at + 6]));
            }
            1001 => {
                need(8)?;
                found.b1001 = Some((f.data[at + 5] as i8, f.data[at + 7]));
            }
            _ => {}
        }
        prev = at;
        at = next;
    }
    Ok(found)
}

/// Sample rate from the SEED factor/multiplier pair.
pub(crate) fn compute_sample_rate(factor: i16, multiplier: i16) -> f64 {
    if factor == 0 || multiplier == 0 {
        return 0.0;
    }
    let f = factor as f64;
    let m = multiplier as f64;
    match (factor > 0, multiplier > 0) {
        (true, true) => f * m,
        (true, false) => -f / m,
        (false, true) => -m / f,
        (false, false) => 1.0 / (f * m),
    }
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

/// Record length from blockette 1000 without parsing the rest of the header.
///
/// `offset` is only used in error reports.
pub fn detect_record_length(data: &[u8], offset: u64) -> Result<u32> {
    let order = validate_fixed_header(data).map_err(|r| MseedError::malformed(offset, r))?;
    let blockettes = read_blockettes(Fields { data, order }, offset)?;
    let Some((_, _, exponent)) = blockettes.b1000 else {
        return Err(MseedError::malformed(offset, "missing blockette 1000"));
    };
    record_length_from_exponent(exponent)
        .ok_or_else(|| MseedError::malformed(offset, format!("record length exponent {exponent}")))
}

fn record_length_from_exponent(exponent: u8) -> Option<u32> {
    let length = 1u32.checked_shl(u32::from(exponent))?;
    (MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH)
        .contains(&length)
        .then_some(length)
}

/// Parse a record header.
///
/// `data` must hold at least the fixed header and its blockettes; a whole
/// record is simplest. `record_length` overrides the blockette 1000 length
/// when given. `offset` is the record's position in its source, used in
/// error reports.
pub fn parse_header(data: &[u8], record_length: Option<u32>, offset: u64) -> Result<RecordHeader> {
    let order = validate_fixed_header(data).map_err(|r| MseedError::malformed(offset, r))?;
    let f = Fields { data, order };
    let blockettes = read_blockettes(f, offset)?;

    let Some((encoding, word_order, exponent)) = blockettes.b1000 else {
        return Err(MseedError::malformed(offset, "missing blockette 1000"));
    };
    let record_length = match record_length {
        Some(len) => len,
        None => record_length_from_exponent(exponent).ok_or_else(|| {
            MseedError::malformed(offset, format!("record length exponent {exponent}"))
        })?,
    };

    let sequence_number = std::str::from_utf8(&data[0..6])
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c == ' ' || c == '\0').parse().ok())
        .unwrap_or(0);

    let stream = StreamId {
        station: trimmed(&data[8..13]),
        location: trimmed(&data[13..15]),
        channel: trimmed(&data[15..18]),
        network: trimmed(&data[18..20]),
    };

    let btime = BTime {
        year: f.u16(20),
        day: f.u16(22),
        hour: data[24],
        minute: data[25],
        second: data[26],
        // byte 27 is unused
        fract: f.u16(28),
    };
    let mut start_time = btime
        .to_micros()
        .ok_or_else(|| MseedError::malformed(offset, format!("invalid start time {btime}")))?;

    let activity_flags = data[36];
    let time_correction = f.u32(40) as i32;
    // Bit 1 set means the correction is already included in the start time
    if activity_flags & 0x02 == 0 && time_correction != 0 {
        start_time += i64::from(time_correction) * 100;
    }
    let frame_count = match blockettes.b1001 {
        Some((usec, frames)) => {
            start_time += i64::from(usec);
            frames
        }
        None => 0,
    };

    let sample_rate = match blockettes.actual_rate {
        Some(rate) if rate.is_finite() && rate > 0.0 => f64::from(rate),
        _ => compute_sample_rate(f.i16(32), f.i16(34)),
    };

    let data_offset = f.u16(44) as usize;
    if data_offset > record_length as usize {
        return Err(MseedError::malformed(
            offset,
            format!("data offset {data_offset} beyond record length {record_length}"),
        ));
    }

    Ok(RecordHeader {
        sequence_number,
        data_quality: data[6] as char,
        stream,
        start_time,
        sample_rate,
        sample_count: f.u16(30) as usize,
        encoding,
        byte_order: ByteOrder::from_code(word_order),
        record_length,
        data_offset,
        frame_count,
    })
}

/// Decode the payload of a complete record with the codec for its encoding.
pub fn decode_samples(
    record: &[u8],
    header: &RecordHeader,
    registry: &CodecRegistry,
) -> Result<Samples> {
    let codec = registry.get(header.encoding)?;
    if header.sample_count == 0 {
        return Ok(Samples::empty(codec.sample_type()));
    }
    let end = (header.record_length as usize).min(record.len());
    let mut payload = record.get(header.data_offset..end).unwrap_or(&[]);
    if header.frame_count > 0 {
        let framed = header.frame_count as usize * FRAME_SIZE;
        if framed < payload.len() {
            payload = &payload[..framed];
        }
    }
    codec.decode(payload, header.sample_count, header.byte_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{HeaderFields, write_header};
    use crate::types::EncodingFormat;

    fn sample_header(byte_order: ByteOrder) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        let fields = HeaderFields {
            sequence_number: 17,
            data_quality: 'D',
            stream: StreamId::new("BW", "FUR", "", "EHZ"),
            start_time: 1_117_065_600_123_456,
            sample_rate: 100.0,
            sample_count: 12,
            encoding: EncodingFormat::Int32.to_code(),
            byte_order,
            record_length: 512,
            frame_count: 0,
        };
        write_header(&mut buf, &fields).unwrap();
        buf
    }

    #[test]
    fn test_parse_written_header() {
        let buf = sample_header(ByteOrder::Big);
        let header = parse_header(&buf, None, 0).unwrap();
        assert_eq!(header.sequence_number, 17);
        assert_eq!(header.data_quality, 'D');
        assert_eq!(header.stream, StreamId::new("BW", "FUR", "", "EHZ"));
        assert_eq!(header.start_time, 1_117_065_600_123_456);
        assert_eq!(header.sample_rate, 100.0);
        assert_eq!(header.sample_count, 12);
        assert_eq!(header.encoding, 3);
        assert_eq!(header.record_length, 512);
    }

    #[test]
    fn test_little_endian_header_detected() {
        let buf = sample_header(ByteOrder::Little);
        assert_eq!(validate_fixed_header(&buf), Ok(ByteOrder::Little));
        let header = parse_header(&buf, None, 0).unwrap();
        assert_eq!(header.byte_order, ByteOrder::Little);
        assert_eq!(header.start_time, 1_117_065_600_123_456);
    }

    #[test]
    fn test_bad_quality_byte_is_malformed() {
        let mut buf = sample_header(ByteOrder::Big);
        buf[6] = b'X';
        let err = parse_header(&buf, None, 4096).unwrap_err();
        assert!(matches!(err, MseedError::MalformedRecord { offset: 4096, .. }));
    }

    #[test]
    fn test_missing_blockette_1000() {
        let mut buf = sample_header(ByteOrder::Big);
        buf[46] = 0;
        buf[47] = 0;
        assert!(matches!(
            detect_record_length(&buf, 0),
            Err(MseedError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_record_length_exponent_out_of_range() {
        let mut buf = sample_header(ByteOrder::Big);
        buf[54] = 30;
        assert!(detect_record_length(&buf, 0).is_err());
        // A caller-supplied length is trusted
        assert_eq!(parse_header(&buf, Some(512), 0).unwrap().record_length, 512);
    }

    #[test]
    fn test_time_correction_applied_unless_flagged() {
        let mut buf = sample_header(ByteOrder::Big);
        buf[40..44].copy_from_slice(&10i32.to_be_bytes()); // 1 ms
        let corrected = parse_header(&buf, None, 0).unwrap();
        assert_eq!(corrected.start_time, 1_117_065_600_124_456);

        buf[36] |= 0x02;
        let flagged = parse_header(&buf, None, 0).unwrap();
        assert_eq!(flagged.start_time, 1_117_065_600_123_456);
    }

    #[test]
    fn test_sample_rate_factor_multiplier() {
        assert_eq!(compute_sample_rate(100, 1), 100.0);
        assert_eq!(compute_sample_rate(-10, 1), 0.1);
        assert_eq!(compute_sample_rate(1, -10), 0.1);
        assert_eq!(compute_sample_rate(0, 0), 0.0);
    }
}
