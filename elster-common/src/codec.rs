//! Value codec
//!
//! Converts between the bytes of a value field and physical values. The conversion is selected by
//! an [ElsterType], which describes both the byte layout and the scaling of the field.
//!
//! | Type         | Field                              | Scale  |
//! | ------------ | ---------------------------------- | ------ |
//! | `DEFAULT`    | 16-bit big-endian, unsigned        | 1      |
//! | `DEC`        | 16-bit big-endian, signed          | 0.1    |
//! | `CENT`       | 16-bit big-endian, signed          | 0.01   |
//! | `MIL`        | 16-bit big-endian, signed          | 0.001  |
//! | `DOUBLE`     | 16-bit big-endian, signed          | 1      |
//! | `TRIPLE`     | 24-bit big-endian, signed          | 1      |
//! | `INV_DOUBLE` | 16-bit little-endian, signed       | 1      |
//! | `INV_TRIPLE` | 24-bit little-endian, signed       | 1      |
//!
//! The composite types additionally describe how a quantity is spread over several consecutive
//! Elster indices on the bus, see [ElsterType::parts] and [ElsterType::combine].
//!
//! All functions here are pure.
use core::ops::Deref;
use core::str::FromStr;

use snafu::Snafu;

/// The byte layout and scaling variant used to interpret a value field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ElsterType {
    /// Raw unsigned integer, no scaling
    #[default]
    Default,
    /// Fixed point with one decimal
    Dec,
    /// Fixed point with two decimals
    Cent,
    /// Fixed point with three decimals
    Mil,
    /// Two byte big-endian signed field; two indices combined on the bus
    Double,
    /// Three byte big-endian signed field; three indices combined on the bus
    Triple,
    /// Two byte little-endian signed field; two indices combined in reverse on the bus
    InvDouble,
    /// Three byte little-endian signed field; three indices combined in reverse on the bus
    InvTriple,
}

/// Error returned by the value codec
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum CodecError {
    /// The payload does not hold enough bytes for the type
    #[snafu(display("{elster_type} needs {needed} payload bytes, got {actual}"))]
    MalformedPayload {
        /// The type being decoded
        elster_type: ElsterType,
        /// The field width of the type
        needed: usize,
        /// The number of bytes provided
        actual: usize,
    },
    /// The value cannot be represented by the type's field
    #[snafu(display("Value {value} is out of range for {elster_type}"))]
    ValueOutOfRange {
        /// The type being encoded
        elster_type: ElsterType,
        /// The rejected value
        value: f64,
    },
}

/// Error returned when parsing an [ElsterType] from text
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Unknown elster type '{name}'"))]
pub struct ParseTypeError {
    name: String,
}

/// An encoded value field
///
/// Holds up to three bytes, and derefs to the valid bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueField {
    buf: [u8; 3],
    len: usize,
}

impl ValueField {
    fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 3];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            buf,
            len: bytes.len(),
        }
    }

    /// Get the field as a two byte array, as carried in an Elster frame
    ///
    /// Returns None for three byte fields.
    pub fn as_frame_value(&self) -> Option<[u8; 2]> {
        (self.len == 2).then(|| [self.buf[0], self.buf[1]])
    }
}

impl Deref for ValueField {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl ElsterType {
    /// All supported types
    pub const ALL: [ElsterType; 8] = [
        ElsterType::Default,
        ElsterType::Dec,
        ElsterType::Cent,
        ElsterType::Mil,
        ElsterType::Double,
        ElsterType::Triple,
        ElsterType::InvDouble,
        ElsterType::InvTriple,
    ];

    /// The configuration name of the type, e.g. `INV_DOUBLE`
    pub const fn name(&self) -> &'static str {
        match self {
            ElsterType::Default => "DEFAULT",
            ElsterType::Dec => "DEC",
            ElsterType::Cent => "CENT",
            ElsterType::Mil => "MIL",
            ElsterType::Double => "DOUBLE",
            ElsterType::Triple => "TRIPLE",
            ElsterType::InvDouble => "INV_DOUBLE",
            ElsterType::InvTriple => "INV_TRIPLE",
        }
    }

    /// The width of the value field in bytes
    pub const fn width(&self) -> usize {
        match self {
            ElsterType::Triple | ElsterType::InvTriple => 3,
            _ => 2,
        }
    }

    /// The number of decimals implied by the scaling
    ///
    /// Useful for choosing display precision.
    pub const fn decimals(&self) -> u8 {
        match self {
            ElsterType::Dec => 1,
            ElsterType::Cent => 2,
            ElsterType::Mil => 3,
            _ => 0,
        }
    }

    /// The number of consecutive Elster indices a value of this type occupies on the bus
    pub const fn parts(&self) -> usize {
        match self {
            ElsterType::Double | ElsterType::InvDouble => 2,
            ElsterType::Triple | ElsterType::InvTriple => 3,
            _ => 1,
        }
    }

    /// True for types spread over more than one index
    pub const fn is_composite(&self) -> bool {
        self.parts() > 1
    }

    fn scale(&self) -> f64 {
        match self {
            ElsterType::Dec => 10.0,
            ElsterType::Cent => 100.0,
            ElsterType::Mil => 1000.0,
            _ => 1.0,
        }
    }

    fn is_little_endian(&self) -> bool {
        matches!(self, ElsterType::InvDouble | ElsterType::InvTriple)
    }

    fn is_signed(&self) -> bool {
        !matches!(self, ElsterType::Default)
    }

    /// Range of raw integers the field can hold
    fn raw_range(&self) -> (i64, i64) {
        match (self.width(), self.is_signed()) {
            (2, false) => (0, u16::MAX as i64),
            (2, true) => (i16::MIN as i64, i16::MAX as i64),
            _ => (-(1 << 23), (1 << 23) - 1),
        }
    }

    /// Decode a value field
    ///
    /// Only the first [width](Self::width) bytes are used; any further bytes are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<f64, CodecError> {
        let width = self.width();
        if bytes.len() < width {
            return MalformedPayloadSnafu {
                elster_type: *self,
                needed: width,
                actual: bytes.len(),
            }
            .fail();
        }

        let mut raw: u32 = 0;
        if self.is_little_endian() {
            for b in bytes[..width].iter().rev() {
                raw = (raw << 8) | *b as u32;
            }
        } else {
            for b in &bytes[..width] {
                raw = (raw << 8) | *b as u32;
            }
        }

        let value = if self.is_signed() {
            // Sign extend from the field width
            let shift = 32 - 8 * width as u32;
            ((raw << shift) as i32 >> shift) as i64
        } else {
            raw as i64
        };

        Ok(value as f64 / self.scale())
    }

    /// Encode a physical value into a value field
    ///
    /// The value is multiplied by the scale of the type and rounded half away from zero.
    pub fn encode(&self, value: f64) -> Result<ValueField, CodecError> {
        let out_of_range = ValueOutOfRangeSnafu {
            elster_type: *self,
            value,
        };
        let scaled = (value * self.scale()).round();
        if !scaled.is_finite() {
            return out_of_range.fail();
        }
        let (min, max) = self.raw_range();
        if scaled < min as f64 || scaled > max as f64 {
            return out_of_range.fail();
        }

        let raw = scaled as i64 as u32;
        let width = self.width();
        let be = raw.to_be_bytes();
        let mut bytes = [0u8; 3];
        bytes[..width].copy_from_slice(&be[4 - width..]);
        if self.is_little_endian() {
            bytes[..width].reverse();
        }
        Ok(ValueField::new(&bytes[..width]))
    }

    /// Combine the parts of a composite value
    ///
    /// `parts[k]` is the value read from `index + k`. Each part holds three decimal digits of the
    /// result. The regular types count up from the first index, the inverted types count down.
    /// Returns None unless exactly [parts](Self::parts) values are provided.
    pub fn combine(&self, parts: &[f64]) -> Option<f64> {
        if parts.len() != self.parts() {
            return None;
        }
        let weighted = |weights: &[f64]| -> f64 {
            parts
                .iter()
                .zip(weights)
                .map(|(part, weight)| part * weight)
                .sum()
        };
        Some(match self {
            ElsterType::Double => weighted(&[1.0, 1e3]),
            ElsterType::Triple => weighted(&[1.0, 1e3, 1e6]),
            ElsterType::InvDouble => weighted(&[1e3, 1.0]),
            ElsterType::InvTriple => weighted(&[1e6, 1e3, 1.0]),
            _ => parts[0],
        })
    }
}

impl core::fmt::Display for ElsterType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElsterType {
    type Err = ParseTypeError;

    /// Parse a type name, ignoring case and treating spaces as underscores
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(' ', "_");
        ElsterType::ALL
            .into_iter()
            .find(|t| t.name() == normalized)
            .ok_or_else(|| ParseTypeError { name: s.to_string() })
    }
}

/// Decode a value field, see [ElsterType::decode]
pub fn decode(bytes: &[u8], elster_type: ElsterType) -> Result<f64, CodecError> {
    elster_type.decode(bytes)
}

/// Encode a physical value, see [ElsterType::encode]
pub fn encode(value: f64, elster_type: ElsterType) -> Result<ValueField, CodecError> {
    elster_type.encode(value)
}
