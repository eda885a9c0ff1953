//! Shared types: [`ByteOrder`], [`EncodingFormat`], and [`SampleType`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MseedError, Result};

/// Byte order for multi-byte fields in a miniSEED record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    /// Blockette 1000 word-order code: 0 little-endian, 1 big-endian.
    pub fn from_code(code: u8) -> Self {
        if code == 0 { Self::Little } else { Self::Big }
    }

    pub fn to_code(self) -> u8 {
        match self {
            Self::Big => 1,
            Self::Little => 0,
        }
    }
}

/// Sample encodings with a built-in codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingFormat {
    /// ASCII text (code 0).
    Ascii,
    /// 16-bit signed integer (code 1).
    Int16,
    /// 32-bit signed integer (code 3).
    Int32,
    /// 32-bit IEEE float (code 4).
    Float32,
    /// 64-bit IEEE double (code 5).
    Float64,
    /// Steim-1 compressed integers (code 10).
    Steim1,
    /// Steim-2 compressed integers (code 11).
    #[default]
    Steim2,
}

impl EncodingFormat {
    /// Convert a raw encoding code (from Blockette 1000) to an `EncodingFormat`.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Ascii),
            1 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Float32),
            5 => Ok(Self::Float64),
            10 => Ok(Self::Steim1),
            11 => Ok(Self::Steim2),
            _ => Err(MseedError::UnsupportedEncoding(code)),
        }
    }

    /// Convert to the raw encoding code for Blockette 1000.
    pub fn to_code(self) -> u8 {
        match self {
            Self::Ascii => 0,
            Self::Int16 => 1,
            Self::Int32 => 3,
            Self::Float32 => 4,
            Self::Float64 => 5,
            Self::Steim1 => 10,
            Self::Steim2 => 11,
        }
    }

    /// The in-memory sample type this encoding decodes to.
    pub fn sample_type(self) -> SampleType {
        match self {
            Self::Ascii => SampleType::Text,
            Self::Int16 | Self::Int32 | Self::Steim1 | Self::Steim2 => SampleType::Int,
            Self::Float32 => SampleType::Float,
            Self::Float64 => SampleType::Double,
        }
    }

    pub fn is_steim(self) -> bool {
        matches!(self, Self::Steim1 | Self::Steim2)
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii => write!(f, "ASCII"),
            Self::Int16 => write!(f, "INT16"),
            Self::Int32 => write!(f, "INT32"),
            Self::Float32 => write!(f, "FLOAT32"),
            Self::Float64 => write!(f, "FLOAT64"),
            Self::Steim1 => write!(f, "Steim1"),
            Self::Steim2 => write!(f, "Steim2"),
        }
    }
}

/// In-memory type of decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// 32-bit integers (`'i'`).
    Int,
    /// 32-bit floats (`'f'`).
    Float,
    /// 64-bit floats (`'d'`).
    Double,
    /// ASCII bytes (`'a'`).
    Text,
}

impl SampleType {
    pub fn as_char(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Float => 'f',
            Self::Double => 'd',
            Self::Text => 'a',
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_codes_roundtrip() {
        for code in [0u8, 1, 3, 4, 5, 10, 11] {
            assert_eq!(EncodingFormat::from_code(code).unwrap().to_code(), code);
        }
    }

    #[test]
    fn test_unknown_encoding_code() {
        assert!(matches!(
            EncodingFormat::from_code(2),
            Err(MseedError::UnsupportedEncoding(2))
        ));
    }

    #[test]
    fn test_byte_order_codes() {
        assert_eq!(ByteOrder::from_code(0), ByteOrder::Little);
        assert_eq!(ByteOrder::from_code(1), ByteOrder::Big);
        assert_eq!(ByteOrder::Little.to_code(), 0);
    }

    #[test]
    fn test_sample_type_of_encoding() {
        assert_eq!(EncodingFormat::Steim2.sample_type(), SampleType::Int);
        assert_eq!(EncodingFormat::Float32.sample_type(), SampleType::Float);
        assert_eq!(EncodingFormat::Ascii.sample_type().as_char(), 'a');
    }
}
