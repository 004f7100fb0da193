//! Query buffers.
//!
//! A [`QueryBuffer`] is a cloneable handle over one caller-supplied byte
//! region with an in-out size: the caller allocates capacity, a read query
//! shrinks the size to the bytes actually produced, and a write query reads
//! exactly the sized bytes. Cloning the handle shares the underlying
//! region, so the same label buffer can be bound to both sibling arrays of
//! a dimension label.

use crate::datatype::{decode_column, encode_column, Scalar};
use crate::error::Result;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
struct BufferInner {
    data: Vec<u8>,
    /// Bytes of valid data (in: capacity in use, out: bytes produced)
    size: usize,
    offsets: Option<Vec<u64>>,
    offsets_size: usize,
    validity: Option<Vec<u8>>,
}

/// Shared in-out byte buffer bound to a query field
#[derive(Clone, Debug)]
pub struct QueryBuffer {
    inner: Arc<RwLock<BufferInner>>,
}

impl QueryBuffer {
    /// Allocate an empty buffer with the given capacity in bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BufferInner {
                data: vec![0u8; capacity],
                size: capacity,
                offsets: None,
                offsets_size: 0,
                validity: None,
            })),
        }
    }

    /// Create a buffer holding the encoding of `values`
    pub fn from_vec<T: Scalar>(values: &[T]) -> Self {
        let data = encode_column(values);
        let size = data.len();
        Self {
            inner: Arc::new(RwLock::new(BufferInner {
                data,
                size,
                offsets: None,
                offsets_size: 0,
                validity: None,
            })),
        }
    }

    /// Allocate capacity for `count` values of type `T`
    pub fn for_values<T: Scalar>(count: usize) -> Self {
        Self::with_capacity(count * std::mem::size_of::<T>())
    }

    /// Attach an offsets buffer for variable-length cells
    pub fn with_offsets(self, offsets: Vec<u64>) -> Self {
        {
            let mut inner = self.inner.write().expect("RwLock poisoned");
            inner.offsets_size = offsets.len() * std::mem::size_of::<u64>();
            inner.offsets = Some(offsets);
        }
        self
    }

    /// True when an offsets buffer is attached
    pub fn has_offsets(&self) -> bool {
        self.inner.read().expect("RwLock poisoned").offsets.is_some()
    }

    /// Copy of the attached offsets, when variable-length
    pub fn offsets(&self) -> Option<Vec<u64>> {
        self.inner.read().expect("RwLock poisoned").offsets.clone()
    }

    /// Size in bytes of the attached offsets buffer
    pub fn offsets_size(&self) -> usize {
        self.inner.read().expect("RwLock poisoned").offsets_size
    }

    /// Attach a validity buffer for nullable cells
    pub fn with_validity(self, validity: Vec<u8>) -> Self {
        {
            let mut inner = self.inner.write().expect("RwLock poisoned");
            inner.validity = Some(validity);
        }
        self
    }

    /// Copy of the attached validity buffer, when nullable
    pub fn validity(&self) -> Option<Vec<u8>> {
        self.inner.read().expect("RwLock poisoned").validity.clone()
    }

    /// Current in-out size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().expect("RwLock poisoned").size
    }

    /// Total allocated capacity in bytes
    pub fn capacity(&self) -> usize {
        self.inner.read().expect("RwLock poisoned").data.len()
    }

    /// Update the in-out size (done by queries on completion)
    pub fn set_size(&self, size: usize) {
        self.inner.write().expect("RwLock poisoned").size = size;
    }

    /// Copy the sized contents out
    pub fn bytes(&self) -> Vec<u8> {
        let inner = self.inner.read().expect("RwLock poisoned");
        inner.data[..inner.size].to_vec()
    }

    /// Overwrite the front of the buffer and set the size
    pub fn write_bytes(&self, bytes: &[u8]) {
        let mut inner = self.inner.write().expect("RwLock poisoned");
        inner.data[..bytes.len()].copy_from_slice(bytes);
        inner.size = bytes.len();
    }

    /// Decode the sized contents as values of type `T`
    pub fn to_vec<T: Scalar>(&self) -> Result<Vec<T>> {
        decode_column(&self.bytes())
    }

    /// Number of whole values of type `T` the sized contents hold
    pub fn num_values<T: Scalar>(&self) -> usize {
        self.size() / std::mem::size_of::<T>()
    }
}
