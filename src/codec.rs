//! Sample codecs keyed by blockette 1000 encoding code.
//!
//! A [`Codec`] turns a record's data payload into [`Samples`] and packs a
//! run of samples back into a bounded payload. [`CodecRegistry::standard`]
//! carries the uncompressed encodings plus Steim1/Steim2; applications may
//! register their own codes.

use std::collections::HashMap;
use std::fmt;

use crate::record::{SampleSlice, Samples};
use crate::steim::{self, FRAME_SIZE};
use crate::types::{ByteOrder, EncodingFormat, SampleType};
use crate::{MseedError, Result};

/// Payload produced by [`Codec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub payload: Vec<u8>,
    /// Number of leading samples of the input that the payload holds.
    pub sample_count: usize,
}

pub trait Codec: Send + Sync {
    /// In-memory type produced by `decode` and accepted by `encode`.
    fn sample_type(&self) -> SampleType;

    /// Decode up to `sample_count` samples. Returning fewer is allowed when
    /// the payload runs out; the reader reports the difference.
    fn decode(&self, payload: &[u8], sample_count: usize, byte_order: ByteOrder)
    -> Result<Samples>;

    /// Encode as many leading samples as fit into `capacity` bytes.
    fn encode(
        &self,
        samples: SampleSlice<'_>,
        capacity: usize,
        byte_order: ByteOrder,
    ) -> Result<Encoded>;
}

/// Map from encoding code to codec.
pub struct CodecRegistry {
    codecs: HashMap<u8, Box<dyn Codec>>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// ASCII, INT16, INT32, FLOAT32, FLOAT64, Steim1 and Steim2.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(EncodingFormat::Ascii.to_code(), AsciiCodec);
        registry.register(EncodingFormat::Int16.to_code(), Int16Codec);
        registry.register(EncodingFormat::Int32.to_code(), Int32Codec);
        registry.register(EncodingFormat::Float32.to_code(), Float32Codec);
        registry.register(EncodingFormat::Float64.to_code(), Float64Codec);
        registry.register(EncodingFormat::Steim1.to_code(), SteimCodec::Steim1);
        registry.register(EncodingFormat::Steim2.to_code(), SteimCodec::Steim2);
        registry
    }

    /// Register (or replace) the codec for `code`.
    pub fn register(&mut self, code: u8, codec: impl Codec + 'static) {
        self.codecs.insert(code, Box::new(codec));
    }

    pub fn get(&self, code: u8) -> Result<&dyn Codec> {
        self.codecs
            .get(&code)
            .map(|c| c.as_ref())
            .ok_or(MseedError::UnsupportedEncoding(code))
    }

    pub fn contains(&self, code: u8) -> bool {
        self.codecs.contains_key(&code)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.codecs.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("CodecRegistry").field("codes", &codes).finish()
    }
}

fn type_error(encoding: &str, expected: SampleType, got: SampleType) -> MseedError {
    MseedError::EncodeError(format!(
        "{encoding} encoding requires '{expected}' samples, got '{got}'"
    ))
}

/// Decode fixed-width values, stopping early if the payload is short.
fn decode_fixed<T, const N: usize>(
    payload: &[u8],
    sample_count: usize,
    byte_order: ByteOrder,
    from_be: fn([u8; N]) -> T,
    from_le: fn([u8; N]) -> T,
) -> Vec<T> {
    payload
        .chunks_exact(N)
        .take(sample_count)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            match byte_order {
                ByteOrder::Big => from_be(bytes),
                ByteOrder::Little => from_le(bytes),
            }
        })
        .collect()
}

/// Encode the leading values that fit in `capacity` bytes.
fn encode_fixed<T: Copy, const N: usize>(
    values: &[T],
    capacity: usize,
    byte_order: ByteOrder,
    to_be: fn(T) -> [u8; N],
    to_le: fn(T) -> [u8; N],
) -> Encoded {
    let count = values.len().min(capacity / N);
    let mut payload = Vec::with_capacity(count * N);
    for &val in &values[..count] {
        match byte_order {
            ByteOrder::Big => payload.extend_from_slice(&to_be(val)),
            ByteOrder::Little => payload.extend_from_slice(&to_le(val)),
        }
    }
    Encoded {
        payload,
        sample_count: count,
    }
}

/// Encoding 0: one byte per sample, byte order irrelevant.
#[derive(Debug, Clone, Copy)]
pub struct AsciiCodec;

impl Codec for AsciiCodec {
    fn sample_type(&self) -> SampleType {
        SampleType::Text
    }

    fn decode(&self, payload: &[u8], sample_count: usize, _: ByteOrder) -> Result<Samples> {
        let n = sample_count.min(payload.len());
        Ok(Samples::Text(payload[..n].to_vec()))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, _: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Text(text) = samples else {
            return Err(type_error("ASCII", SampleType::Text, samples.sample_type()));
        };
        let n = text.len().min(capacity);
        Ok(Encoded {
            payload: text[..n].to_vec(),
            sample_count: n,
        })
    }
}

/// Encoding 1: 16-bit integers widened to i32.
#[derive(Debug, Clone, Copy)]
pub struct Int16Codec;

impl Codec for Int16Codec {
    fn sample_type(&self) -> SampleType {
        SampleType::Int
    }

    fn decode(&self, payload: &[u8], sample_count: usize, bo: ByteOrder) -> Result<Samples> {
        let values = decode_fixed(payload, sample_count, bo, i16::from_be_bytes, i16::from_le_bytes);
        Ok(Samples::Int(values.into_iter().map(i32::from).collect()))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, bo: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Int(ints) = samples else {
            return Err(type_error("INT16", SampleType::Int, samples.sample_type()));
        };
        let count = ints.len().min(capacity / 2);
        let narrowed = ints[..count]
            .iter()
            .map(|&v| {
                i16::try_from(v).map_err(|_| {
                    MseedError::EncodeError(format!("sample {v} out of INT16 range"))
                })
            })
            .collect::<Result<Vec<i16>>>()?;
        Ok(encode_fixed(&narrowed, capacity, bo, i16::to_be_bytes, i16::to_le_bytes))
    }
}

/// Encoding 3: 32-bit integers.
#[derive(Debug, Clone, Copy)]
pub struct Int32Codec;

impl Codec for Int32Codec {
    fn sample_type(&self) -> SampleType {
        SampleType::Int
    }

    fn decode(&self, payload: &[u8], sample_count: usize, bo: ByteOrder) -> Result<Samples> {
        Ok(Samples::Int(decode_fixed(
            payload,
            sample_count,
            bo,
            i32::from_be_bytes,
            i32::from_le_bytes,
        )))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, bo: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Int(ints) = samples else {
            return Err(type_error("INT32", SampleType::Int, samples.sample_type()));
        };
        Ok(encode_fixed(ints, capacity, bo, i32::to_be_bytes, i32::to_le_bytes))
    }
}

/// Encoding 4: 32-bit IEEE floats.
#[derive(Debug, Clone, Copy)]
pub struct Float32Codec;

impl Codec for Float32Codec {
    fn sample_type(&self) -> SampleType {
        SampleType::Float
    }

    fn decode(&self, payload: &[u8], sample_count: usize, bo: ByteOrder) -> Result<Samples> {
        Ok(Samples::Float(decode_fixed(
            payload,
            sample_count,
            bo,
            f32::from_be_bytes,
            f32::from_le_bytes,
        )))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, bo: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Float(floats) = samples else {
            return Err(type_error("FLOAT32", SampleType::Float, samples.sample_type()));
        };
        Ok(encode_fixed(floats, capacity, bo, f32::to_be_bytes, f32::to_le_bytes))
    }
}

/// Encoding 5: 64-bit IEEE doubles.
#[derive(Debug, Clone, Copy)]
pub struct Float64Codec;

impl Codec for Float64Codec {
    fn sample_type(&self) -> SampleType {
        SampleType::Double
    }

    fn decode(&self, payload: &[u8], sample_count: usize, bo: ByteOrder) -> Result<Samples> {
        Ok(Samples::Double(decode_fixed(
            payload,
            sample_count,
            bo,
            f64::from_be_bytes,
            f64::from_le_bytes,
        )))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, bo: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Double(doubles) = samples else {
            return Err(type_error("FLOAT64", SampleType::Double, samples.sample_type()));
        };
        Ok(encode_fixed(doubles, capacity, bo, f64::to_be_bytes, f64::to_le_bytes))
    }
}

/// Encodings 10 and 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteimCodec {
    Steim1,
    Steim2,
}

impl Codec for SteimCodec {
    fn sample_type(&self) -> SampleType {
        SampleType::Int
    }

    fn decode(&self, payload: &[u8], sample_count: usize, bo: ByteOrder) -> Result<Samples> {
        if sample_count == 0 {
            return Ok(Samples::Int(Vec::new()));
        }
        let samples = match self {
            Self::Steim1 => steim::decode_steim1(payload, sample_count, bo)?,
            Self::Steim2 => steim::decode_steim2(payload, sample_count, bo)?,
        };
        Ok(Samples::Int(samples))
    }

    fn encode(&self, samples: SampleSlice<'_>, capacity: usize, bo: ByteOrder) -> Result<Encoded> {
        let SampleSlice::Int(ints) = samples else {
            let name = if *self == Self::Steim1 { "Steim1" } else { "Steim2" };
            return Err(type_error(name, SampleType::Int, samples.sample_type()));
        };
        let max_frames = capacity / FRAME_SIZE;
        let (payload, sample_count) = match self {
            Self::Steim1 => steim::encode_steim1(ints, max_frames, bo)?,
            Self::Steim2 => steim::encode_steim2(ints, max_frames, bo)?,
        };
        Ok(Encoded {
            payload,
            sample_count,
        })
    }
}
