//! # Axial DB Dimension Labels
//!
//! Dimension-label query orchestration for Axial DB: the machinery that
//! lets a caller address an array dimension by an external continuous
//! coordinate (a *label*) instead of an integer index.
//!
//! Each label is backed by two sibling arrays (see
//! [`DimensionLabel`]): a dense *indexed* array mapping index to label
//! value and a sparse *labelled* array mapping label value to index. On a
//! read, label ranges on the parent subarray are resolved into index
//! ranges by bounded searches over the sorted labelled array
//! ([`RangeQuery`]); label values themselves are read and written through
//! coordinated queries against the pair ([`LabelDataQuery`]).
//! [`DimensionLabelQueries`] owns all of it for one parent query.

pub mod data_query;
pub mod dimension_label;
pub mod error;
pub mod queries;
pub mod range_query;

// Re-export main types
pub use data_query::LabelDataQuery;
pub use dimension_label::{
    DimensionLabel, INDEX_ATTRIBUTE_NAME, INDEX_DIMENSION_NAME, LABEL_ATTRIBUTE_NAME,
    LABEL_DIMENSION_NAME,
};
pub use error::{Error, Result};
pub use queries::DimensionLabelQueries;
pub use range_query::{IndexRanges, LabelRangeQuery, RangeQuery};
