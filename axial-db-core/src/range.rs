//! Typed range primitive.
//!
//! A [`Range`] is a closed interval `[lo, hi]` over one scalar datatype,
//! stored as a raw byte buffer holding the two endpoints back to back. The
//! endpoint comparison and stepping operations dispatch on [`Datatype`], so
//! one range value can serve any of the supported label/index types.
//!
//! Stepping (`increase_*`/`decrease_*`) moves an endpoint by one
//! representable unit and is only defined for integer-like types; the
//! floating types support comparison but not stepping.

use crate::datatype::{with_physical_type, Datatype, Scalar};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A closed interval `[lo, hi]` over one scalar type.
///
/// The buffer holds exactly two values of the type's width. An empty
/// buffer denotes an absent range.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    data: Vec<u8>,
}

impl Range {
    /// Create an absent range
    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }

    /// Create a range from raw endpoint bytes (`2 * value_size` bytes)
    pub fn from_bytes(data: Vec<u8>, value_size: usize) -> Result<Self> {
        if data.len() != 2 * value_size {
            return Err(Error::invalid_argument(format!(
                "range buffer of {} bytes does not hold two values of width {}",
                data.len(),
                value_size
            )));
        }
        Ok(Self { data })
    }

    /// Create a range from two typed endpoints
    pub fn from_scalars<T: Scalar>(lo: T, hi: T) -> Self {
        let width = std::mem::size_of::<T>();
        let mut data = vec![0u8; 2 * width];
        lo.write_le(&mut data);
        hi.write_le(&mut data[width..]);
        Self { data }
    }

    /// True when this range is absent
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Width in bytes of one endpoint
    pub fn value_size(&self) -> usize {
        self.data.len() / 2
    }

    /// Raw bytes of the lower endpoint
    pub fn start_bytes(&self) -> &[u8] {
        &self.data[..self.value_size()]
    }

    /// Raw bytes of the upper endpoint
    pub fn end_bytes(&self) -> &[u8] {
        &self.data[self.value_size()..]
    }

    /// Lower endpoint decoded as `T`
    pub fn start_as<T: Scalar>(&self) -> T {
        T::read_le(self.start_bytes())
    }

    /// Upper endpoint decoded as `T`
    pub fn end_as<T: Scalar>(&self) -> T {
        T::read_le(self.end_bytes())
    }

    /// Overwrite the lower endpoint
    pub fn set_start<T: Scalar>(&mut self, value: T) {
        value.write_le(&mut self.data);
    }

    /// Overwrite the upper endpoint
    pub fn set_end<T: Scalar>(&mut self, value: T) {
        let width = self.value_size();
        value.write_le(&mut self.data[width..]);
    }

    fn compare_at(&self, other: &Range, dtype: Datatype, offset_self: bool, offset_other: bool) -> Ordering {
        with_physical_type!(dtype, T => {
            let a: T = if offset_self { self.end_as::<T>() } else { self.start_as::<T>() };
            let b: T = if offset_other { other.end_as::<T>() } else { other.start_as::<T>() };
            // Total order is fine here: label/index values are never NaN.
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        })
    }

    /// Compare the lower endpoints of two ranges
    pub fn compare_lower_bound(&self, other: &Range, dtype: Datatype) -> Ordering {
        self.compare_at(other, dtype, false, false)
    }

    /// Compare the upper endpoints of two ranges
    pub fn compare_upper_bound(&self, other: &Range, dtype: Datatype) -> Ordering {
        self.compare_at(other, dtype, true, true)
    }

    /// Compare this range's lower endpoint against `other`'s upper endpoint
    pub fn lower_vs_upper(&self, other: &Range, dtype: Datatype) -> Ordering {
        self.compare_at(other, dtype, false, true)
    }

    /// True when this range's endpoints satisfy `lo > hi` (the empty
    /// interval encoding produced by range correction)
    pub fn is_inverted(&self, dtype: Datatype) -> bool {
        self.lower_vs_upper(self, dtype) == Ordering::Greater
    }

    /// True when this range is contained in `superset`
    pub fn is_contained_in(&self, superset: &Range, dtype: Datatype) -> bool {
        self.compare_lower_bound(superset, dtype) != Ordering::Less
            && self.compare_upper_bound(superset, dtype) != Ordering::Greater
    }

    fn step(&mut self, dtype: Datatype, upper: bool, increase: bool) -> Result<()> {
        if !dtype.is_integer_like() {
            return Err(Error::unsupported_datatype(format!(
                "cannot step {} range bounds",
                dtype
            )));
        }
        with_physical_type!(dtype, T => {
            let value: T = if upper { self.end_as::<T>() } else { self.start_as::<T>() };
            let stepped = step_scalar(value, increase);
            if upper {
                self.set_end(stepped);
            } else {
                self.set_start(stepped);
            }
        });
        Ok(())
    }

    /// Move the lower endpoint down by one representable step
    pub fn decrease_lower_bound(&mut self, dtype: Datatype) -> Result<()> {
        self.step(dtype, false, false)
    }

    /// Move the lower endpoint up by one representable step
    pub fn increase_lower_bound(&mut self, dtype: Datatype) -> Result<()> {
        self.step(dtype, false, true)
    }

    /// Move the upper endpoint down by one representable step.
    ///
    /// Only valid when `hi > lo`; callers guarantee this before invoking.
    pub fn decrease_upper_bound(&mut self, dtype: Datatype) -> Result<()> {
        self.step(dtype, true, false)
    }

    /// Move the upper endpoint up by one representable step
    pub fn increase_upper_bound(&mut self, dtype: Datatype) -> Result<()> {
        self.step(dtype, true, true)
    }
}

/// Step an integer-like scalar by one representable unit.
///
/// Floats never reach here; the datatype guard in [`Range::step`] rejects
/// them first, so treating the +/-1.0 case as unreachable is safe.
fn step_scalar<T: Scalar>(value: T, increase: bool) -> T {
    // All integer-like physical types round-trip exactly through i128.
    let wide = scalar_to_i128(value);
    let stepped = if increase { wide + 1 } else { wide - 1 };
    scalar_from_i128(stepped)
}

fn scalar_to_i128<T: Scalar>(value: T) -> i128 {
    let mut bytes = [0u8; 16];
    value.write_le(&mut bytes);
    let width = std::mem::size_of::<T>();
    match T::DATATYPE {
        Datatype::UInt8 | Datatype::UInt16 | Datatype::UInt32 | Datatype::UInt64 => {
            let mut buf = [0u8; 16];
            buf[..width].copy_from_slice(&bytes[..width]);
            i128::from_le_bytes(buf)
        }
        _ => {
            // Sign-extend
            let mut buf = if bytes[width - 1] & 0x80 != 0 {
                [0xffu8; 16]
            } else {
                [0u8; 16]
            };
            buf[..width].copy_from_slice(&bytes[..width]);
            i128::from_le_bytes(buf)
        }
    }
}

fn scalar_from_i128<T: Scalar>(value: i128) -> T {
    let bytes = value.to_le_bytes();
    T::read_le(&bytes)
}
