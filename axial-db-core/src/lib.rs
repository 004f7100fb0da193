//! # Axial DB Core
//!
//! Core types and the array layer for Axial DB, a multi-dimensional array
//! storage engine whose dimensions can be addressed by external label
//! coordinates.
//!
//! This crate provides:
//! - Scalar datatypes and the typed [`Range`] primitive
//! - Range sets constrained to a declared domain
//! - Array schemas, including dimension-label references
//! - The [`Array`] open/close lifecycle over a pluggable [`Storage`] seam
//! - The generic one-dimensional [`Query`] engine (dense/sparse read/write)
//! - [`Subarray`], the per-dimension range selection a query executes over
//!
//! ## Design Principles
//!
//! 1. **Runtime-agnostic**: async at the storage seam only, no forced runtime
//! 2. **Raw cell buffers**: queries move opaque byte columns; typing lives
//!    in the datatype tag, not the buffer
//! 3. **Fragments are appends**: every write is one timestamped fragment;
//!    readers resolve against the fragments visible in their open window

pub mod array;
pub mod buffer;
pub mod datatype;
pub mod error;
pub mod fragment;
pub mod query;
pub mod range;
pub mod range_set;
pub mod schema;
pub mod status;
pub mod storage;
pub mod subarray;

// Re-export main types
pub use array::Array;
pub use buffer::QueryBuffer;
pub use datatype::{decode_column, encode_column, Datatype, Scalar};
pub use error::{Error, Result};
pub use fragment::{fragment_name_timestamp, generate_fragment_name, Fragment};
pub use query::Query;
pub use range::Range;
pub use range_set::RangeSetAndSuperset;
pub use schema::{
    ArraySchema, Attribute, CellValNum, Dimension, DimensionLabelReference, LabelOrder,
    WRITE_VERSION,
};
pub use status::{Layout, QueryStatus, QueryType};
pub use storage::{
    fragment_address, fragment_prefix, schema_address, MemoryStorage, Storage, StorageRead,
    StorageWrite,
};
pub use subarray::Subarray;
