//! Scalar datatype tags for dimension and attribute values.
//!
//! Every dimension and attribute carries a [`Datatype`] describing the
//! physical encoding of its cells. The calendar/time family is stored and
//! ordered as 64-bit signed integers; only the tag differs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar datatype tag
///
/// Covers the fixed-width types admissible on the label and index paths:
/// signed/unsigned integers, 32-/64-bit floats, and the integer-encoded
/// calendar/time types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    DateTimeYear,
    DateTimeMonth,
    DateTimeWeek,
    DateTimeDay,
    DateTimeHr,
    DateTimeMin,
    DateTimeSec,
    DateTimeMs,
    DateTimeUs,
    DateTimeNs,
    DateTimePs,
    DateTimeFs,
    DateTimeAs,
    TimeHr,
    TimeMin,
    TimeSec,
    TimeMs,
    TimeUs,
    TimeNs,
    TimePs,
    TimeFs,
    TimeAs,
}

impl Datatype {
    /// Size of one value of this datatype in bytes
    pub fn size(&self) -> usize {
        match self {
            Datatype::Int8 | Datatype::UInt8 => 1,
            Datatype::Int16 | Datatype::UInt16 => 2,
            Datatype::Int32 | Datatype::UInt32 | Datatype::Float32 => 4,
            _ => 8,
        }
    }

    /// True for the calendar/time family (stored as `i64`)
    pub fn is_temporal(&self) -> bool {
        !matches!(
            self,
            Datatype::Int8
                | Datatype::Int16
                | Datatype::Int32
                | Datatype::Int64
                | Datatype::UInt8
                | Datatype::UInt16
                | Datatype::UInt32
                | Datatype::UInt64
                | Datatype::Float32
                | Datatype::Float64
        )
    }

    /// True when values of this type can be stepped by one representable
    /// unit (every type except the floats)
    pub fn is_integer_like(&self) -> bool {
        !self.is_float()
    }

    /// True for the floating-point types
    pub fn is_float(&self) -> bool {
        matches!(self, Datatype::Float32 | Datatype::Float64)
    }

    /// Get the short name of this datatype
    pub fn name(&self) -> &'static str {
        match self {
            Datatype::Int8 => "int8",
            Datatype::Int16 => "int16",
            Datatype::Int32 => "int32",
            Datatype::Int64 => "int64",
            Datatype::UInt8 => "uint8",
            Datatype::UInt16 => "uint16",
            Datatype::UInt32 => "uint32",
            Datatype::UInt64 => "uint64",
            Datatype::Float32 => "float32",
            Datatype::Float64 => "float64",
            Datatype::DateTimeYear => "datetime-year",
            Datatype::DateTimeMonth => "datetime-month",
            Datatype::DateTimeWeek => "datetime-week",
            Datatype::DateTimeDay => "datetime-day",
            Datatype::DateTimeHr => "datetime-hr",
            Datatype::DateTimeMin => "datetime-min",
            Datatype::DateTimeSec => "datetime-sec",
            Datatype::DateTimeMs => "datetime-ms",
            Datatype::DateTimeUs => "datetime-us",
            Datatype::DateTimeNs => "datetime-ns",
            Datatype::DateTimePs => "datetime-ps",
            Datatype::DateTimeFs => "datetime-fs",
            Datatype::DateTimeAs => "datetime-as",
            Datatype::TimeHr => "time-hr",
            Datatype::TimeMin => "time-min",
            Datatype::TimeSec => "time-sec",
            Datatype::TimeMs => "time-ms",
            Datatype::TimeUs => "time-us",
            Datatype::TimeNs => "time-ns",
            Datatype::TimePs => "time-ps",
            Datatype::TimeFs => "time-fs",
            Datatype::TimeAs => "time-as",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fixed-width scalar that can live in a cell buffer.
///
/// Sealed over the primitive numeric types. Calendar/time values use the
/// `i64` implementation with the temporal [`Datatype`] tag supplied
/// externally.
pub trait Scalar: Copy + PartialOrd + fmt::Debug + private::Sealed {
    /// Datatype tag for this physical type
    const DATATYPE: Datatype;

    /// Read one value from the front of `bytes`
    fn read_le(bytes: &[u8]) -> Self;

    /// Write this value into the front of `out`
    fn write_le(&self, out: &mut [u8]);
}

mod private {
    pub trait Sealed {}
}

macro_rules! impl_scalar {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(
            impl private::Sealed for $t {}
            impl Scalar for $t {
                const DATATYPE: Datatype = Datatype::$dt;

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }

                fn write_le(&self, out: &mut [u8]) {
                    out[..std::mem::size_of::<$t>()]
                        .copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

/// Decode a whole byte column into typed values
pub fn decode_column<T: Scalar>(bytes: &[u8]) -> Result<Vec<T>> {
    let width = std::mem::size_of::<T>();
    if bytes.len() % width != 0 {
        return Err(Error::internal(format!(
            "column of {} bytes is not a multiple of value width {}",
            bytes.len(),
            width
        )));
    }
    Ok(bytes.chunks_exact(width).map(T::read_le).collect())
}

/// Encode typed values into a byte column
pub fn encode_column<T: Scalar>(values: &[T]) -> Vec<u8> {
    let width = std::mem::size_of::<T>();
    let mut out = vec![0u8; values.len() * width];
    for (i, v) in values.iter().enumerate() {
        v.write_le(&mut out[i * width..]);
    }
    out
}

/// Dispatch a generic closure body over the physical type of a datatype.
///
/// Temporal types resolve to `i64`. The bound identifier is usable as a
/// type alias inside the body.
macro_rules! with_physical_type {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::datatype::Datatype::Int8 => {
                type $t = i8;
                $body
            }
            $crate::datatype::Datatype::Int16 => {
                type $t = i16;
                $body
            }
            $crate::datatype::Datatype::Int32 => {
                type $t = i32;
                $body
            }
            $crate::datatype::Datatype::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::datatype::Datatype::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::datatype::Datatype::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::datatype::Datatype::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::datatype::Datatype::Float32 => {
                type $t = f32;
                $body
            }
            $crate::datatype::Datatype::Float64 => {
                type $t = f64;
                $body
            }
            // Int64 and the whole temporal family share the i64 encoding.
            _ => {
                type $t = i64;
                $body
            }
        }
    };
}

pub(crate) use with_physical_type;

/// Compare two encoded scalars of the same datatype
pub(crate) fn compare_scalar_bytes(dtype: Datatype, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    with_physical_type!(dtype, T => {
        let x = T::read_le(a);
        let y = T::read_le(b);
        // Label/index values are never NaN, so a total order exists.
        x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Decode an integer-like encoded scalar into `i128`
pub fn scalar_bytes_to_i128(dtype: Datatype, bytes: &[u8]) -> Result<i128> {
    if !dtype.is_integer_like() {
        return Err(Error::unsupported_datatype(format!(
            "{} is not integer-valued",
            dtype
        )));
    }
    let width = dtype.size();
    let unsigned = matches!(
        dtype,
        Datatype::UInt8 | Datatype::UInt16 | Datatype::UInt32 | Datatype::UInt64
    );
    let mut buf = if !unsigned && bytes[width - 1] & 0x80 != 0 {
        [0xffu8; 16]
    } else {
        [0u8; 16]
    };
    buf[..width].copy_from_slice(&bytes[..width]);
    Ok(i128::from_le_bytes(buf))
}

/// Encode an `i128` as a scalar of an integer-like datatype
pub fn i128_to_scalar_bytes(dtype: Datatype, value: i128) -> Vec<u8> {
    value.to_le_bytes()[..dtype.size()].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(Datatype::Int8.size(), 1);
        assert_eq!(Datatype::UInt16.size(), 2);
        assert_eq!(Datatype::Float32.size(), 4);
        assert_eq!(Datatype::UInt64.size(), 8);
        assert_eq!(Datatype::DateTimeNs.size(), 8);
        assert_eq!(Datatype::TimeSec.size(), 8);
    }

    #[test]
    fn test_integer_like() {
        assert!(Datatype::UInt64.is_integer_like());
        assert!(Datatype::DateTimeMs.is_integer_like());
        assert!(!Datatype::Float32.is_integer_like());
        assert!(!Datatype::Float64.is_integer_like());
    }

    #[test]
    fn test_temporal_family() {
        assert!(Datatype::DateTimeYear.is_temporal());
        assert!(Datatype::TimeAs.is_temporal());
        assert!(!Datatype::Int64.is_temporal());
    }

    #[test]
    fn test_column_roundtrip() {
        let values: Vec<i32> = vec![-3, 0, 7, i32::MAX];
        let bytes = encode_column(&values);
        assert_eq!(bytes.len(), 16);
        let decoded: Vec<i32> = decode_column(&bytes).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_decode_column_bad_width() {
        assert!(decode_column::<u32>(&[0u8; 7]).is_err());
    }
}
