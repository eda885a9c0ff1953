//! Serialize miniSEED v2 record headers.
//!
//! Every record written carries blockettes 1000 and 1001; blockette 100 is
//! added when the sample rate has no exact factor/multiplier form. The
//! payload itself is produced by a [`Codec`](crate::codec::Codec) and placed
//! at the returned data offset by [`RecordWriter`](crate::RecordWriter).

use crate::decode::{FIXED_HEADER_SIZE, compute_sample_rate};
use crate::sid::StreamId;
use crate::time::BTime;
use crate::types::ByteOrder;
use crate::{MseedError, Result};

/// Data offset when only blockettes 1000 and 1001 are present.
pub const DATA_OFFSET: usize = 64;
/// Data offset when blockette 100 is also present.
pub const DATA_OFFSET_WITH_RATE: usize = 128;

/// Values written into one record header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFields {
    pub sequence_number: u32,
    pub data_quality: char,
    pub stream: StreamId,
    /// Microseconds since the epoch.
    pub start_time: i64,
    pub sample_rate: f64,
    pub sample_count: usize,
    pub encoding: u8,
    /// Order of both header and payload.
    pub byte_order: ByteOrder,
    pub record_length: u32,
    pub frame_count: u8,
}

/// Sample rate as a SEED factor/multiplier pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateFactors {
    pub factor: i16,
    pub multiplier: i16,
    /// `false` when the pair only approximates the rate.
    pub exact: bool,
}

/// Decompose a rate in Hz into a factor/multiplier pair.
pub fn decompose_sample_rate(rate: f64) -> RateFactors {
    let candidate = |factor: f64, multiplier: f64| -> Option<RateFactors> {
        if factor.abs() > f64::from(i16::MAX) || multiplier.abs() > f64::from(i16::MAX) {
            return None;
        }
        let (factor, multiplier) = (factor as i16, multiplier as i16);
        Some(RateFactors {
            factor,
            multiplier,
            exact: compute_sample_rate(factor, multiplier) == rate,
        })
    };

    if !(rate.is_finite() && rate > 0.0) {
        return RateFactors {
            factor: 0,
            multiplier: 0,
            exact: rate == 0.0,
        };
    }

    let whole = if rate >= 1.0 {
        candidate(rate.round(), 1.0)
    } else {
        // period in seconds: rate = 1 / -factor
        candidate(-(1.0 / rate).round(), 1.0)
    };
    if let Some(f) = whole.filter(|f| f.exact) {
        return f;
    }
    for m in [10.0, 100.0, 1_000.0, 10_000.0] {
        let ratio = candidate((rate * m).round(), -m);
        let period = candidate(-(m / rate).round(), m);
        if let Some(f) = ratio.into_iter().chain(period).find(|f| f.exact) {
            return f;
        }
    }
    whole.unwrap_or(RateFactors {
        factor: 0,
        multiplier: 0,
        exact: false,
    })
}

/// Data offset for a record at `sample_rate`.
pub fn data_offset_for(sample_rate: f64) -> usize {
    if decompose_sample_rate(sample_rate).exact {
        DATA_OFFSET
    } else {
        DATA_OFFSET_WITH_RATE
    }
}

struct Put<'a> {
    buf: &'a mut [u8],
    order: ByteOrder,
}

impl Put<'_> {
    fn u16(&mut self, at: usize, value: u16) {
        let bytes = match self.order {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        };
        self.buf[at..at + 2].copy_from_slice(&bytes);
    }

    fn i16(&mut self, at: usize, value: i16) {
        self.u16(at, value as u16);
    }

    fn f32(&mut self, at: usize, value: f32) {
        let bytes = match self.order {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        };
        self.buf[at..at + 4].copy_from_slice(&bytes);
    }
}

fn write_padded(dest: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    for (i, slot) in dest.iter_mut().enumerate() {
        *slot = bytes.get(i).copied().unwrap_or(b' ');
    }
}

/// Write the fixed header and blockettes into the start of `buf`.
///
/// Returns the data offset the payload must be copied to.
pub fn write_header(buf: &mut [u8], fields: &HeaderFields) -> Result<usize> {
    let rate = decompose_sample_rate(fields.sample_rate);
    let data_offset = if rate.exact {
        DATA_OFFSET
    } else {
        DATA_OFFSET_WITH_RATE
    };
    if buf.len() < data_offset {
        return Err(MseedError::RecordTooShort {
            expected: data_offset,
            actual: buf.len(),
        });
    }
    let sample_count = u16::try_from(fields.sample_count).map_err(|_| {
        MseedError::EncodeError(format!(
            "{} samples exceed the 65535 per-record limit",
            fields.sample_count
        ))
    })?;
    let (btime, usec) = BTime::from_micros(fields.start_time).ok_or_else(|| {
        MseedError::EncodeError(format!("start time {} not representable", fields.start_time))
    })?;
    let exponent = fields.record_length.checked_ilog2().unwrap_or(0) as u8;

    buf[..data_offset].fill(0);
    let seq = format!("{:06}", fields.sequence_number % 1_000_000);
    buf[0..6].copy_from_slice(seq.as_bytes());
    buf[6] = fields.data_quality as u8;
    buf[7] = b' ';
    write_padded(&mut buf[8..13], &fields.stream.station);
    write_padded(&mut buf[13..15], &fields.stream.location);
    write_padded(&mut buf[15..18], &fields.stream.channel);
    write_padded(&mut buf[18..20], &fields.stream.network);

    let mut put = Put {
        buf,
        order: fields.byte_order,
    };

    // BTIME (bytes 20-29), byte 27 unused
    put.u16(20, btime.year);
    put.u16(22, btime.day);
    put.buf[24] = btime.hour;
    put.buf[25] = btime.minute;
    put.buf[26] = btime.second;
    put.u16(28, btime.fract);

    put.u16(30, sample_count);
    put.i16(32, rate.factor);
    put.i16(34, rate.multiplier);
    // activity, I/O and quality flags (36-38) and time correction (40-43) stay 0
    put.buf[39] = if rate.exact { 2 } else { 3 };
    put.u16(44, data_offset as u16);
    put.u16(46, FIXED_HEADER_SIZE as u16);

    // Blockette 1000 at 48
    put.u16(48, 1000);
    put.u16(50, 56);
    put.buf[52] = fields.encoding;
    put.buf[53] = fields.byte_order.to_code();
    put.buf[54] = exponent;

    // Blockette 1001 at 56
    put.u16(56, 1001);
    put.u16(58, if rate.exact { 0 } else { 64 });
    put.buf[61] = usec;
    put.buf[63] = fields.frame_count;

    if !rate.exact {
        // Blockette 100 at 64
        put.u16(64, 100);
        put.u16(66, 0);
        put.f32(68, fields.sample_rate as f32);
    }

    Ok(data_offset)
}
