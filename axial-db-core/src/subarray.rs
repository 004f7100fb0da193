//! Subarrays: per-dimension range selections.
//!
//! A [`Subarray`] carries, for every dimension of an array, the index
//! ranges selected on that dimension, and optionally a set of *label*
//! ranges expressed in the value domain of a dimension label declared on
//! the schema. Label ranges are resolved to index ranges before the owning
//! query executes; the resolved ranges are installed back onto the
//! subarray through [`Subarray::add_index_ranges`].

use crate::error::{Error, Result};
use crate::range::Range;
use crate::range_set::RangeSetAndSuperset;
use crate::schema::ArraySchema;
use std::sync::Arc;

/// Label ranges attached to one dimension
#[derive(Clone, Debug)]
struct LabelRangeSet {
    label_name: String,
    ranges: RangeSetAndSuperset,
}

/// Per-dimension range lists for one array, plus optional per-dimension
/// label range lists
#[derive(Clone, Debug)]
pub struct Subarray {
    schema: Arc<ArraySchema>,
    dim_ranges: Vec<RangeSetAndSuperset>,
    label_ranges: Vec<Option<LabelRangeSet>>,
}

impl Subarray {
    /// Create a subarray selecting the full domain on every dimension
    pub fn new(schema: Arc<ArraySchema>) -> Self {
        let dim_ranges = schema
            .dimensions()
            .iter()
            .map(|d| RangeSetAndSuperset::new_default(d.datatype(), d.domain().clone()))
            .collect();
        let label_ranges = vec![None; schema.dim_num()];
        Self {
            schema,
            dim_ranges,
            label_ranges,
        }
    }

    /// The schema this subarray was built against
    pub fn schema(&self) -> &Arc<ArraySchema> {
        &self.schema
    }

    /// Number of dimensions
    pub fn dim_num(&self) -> usize {
        self.dim_ranges.len()
    }

    fn check_dim(&self, dim_idx: usize) -> Result<()> {
        if dim_idx >= self.dim_ranges.len() {
            return Err(Error::invalid_argument(format!(
                "no dimension at index {}",
                dim_idx
            )));
        }
        Ok(())
    }

    /// Add an index range on a dimension
    pub fn add_range(&mut self, dim_idx: usize, range: Range) -> Result<()> {
        self.check_dim(dim_idx)?;
        if self.label_ranges[dim_idx].is_some() {
            return Err(Error::invalid_argument(format!(
                "cannot add index range to dimension {}; it already has label ranges",
                dim_idx
            )));
        }
        self.dim_ranges[dim_idx].add_range(range, false)
    }

    /// Replace the ranges on a dimension with the given list
    pub fn set_ranges_for_dim(&mut self, dim_idx: usize, ranges: &[Range]) -> Result<()> {
        self.check_dim(dim_idx)?;
        let dim = self.schema.dimension(dim_idx)?;
        let mut set = RangeSetAndSuperset::new_empty(dim.datatype(), dim.domain().clone());
        for range in ranges {
            set.add_range(range.clone(), false)?;
        }
        self.dim_ranges[dim_idx] = set;
        Ok(())
    }

    /// Install index ranges resolved from label ranges.
    ///
    /// `is_point_ranges` signals that each range is a degenerate point
    /// produced by a bulk resolution; the ranges are installed either way,
    /// the flag only short-circuits per-range bookkeeping for large point
    /// sets.
    pub fn add_index_ranges(
        &mut self,
        dim_idx: usize,
        is_point_ranges: bool,
        ranges: &[Range],
    ) -> Result<()> {
        self.check_dim(dim_idx)?;
        tracing::debug!(
            dim = dim_idx,
            count = ranges.len(),
            point_ranges = is_point_ranges,
            "installing resolved index ranges"
        );
        if ranges.is_empty() {
            // An empty resolution selects nothing: replace the implicit
            // full-domain default with an explicitly empty set.
            let dim = self.schema.dimension(dim_idx)?;
            self.dim_ranges[dim_idx] =
                RangeSetAndSuperset::new_empty(dim.datatype(), dim.domain().clone());
            return Ok(());
        }
        for range in ranges {
            self.dim_ranges[dim_idx].add_range(range.clone(), false)?;
        }
        Ok(())
    }

    /// The index ranges on a dimension
    pub fn ranges_for_dim(&self, dim_idx: usize) -> Result<&RangeSetAndSuperset> {
        self.check_dim(dim_idx)?;
        Ok(&self.dim_ranges[dim_idx])
    }

    /// True when a dimension still implicitly selects its full domain
    pub fn is_default(&self, dim_idx: usize) -> Result<bool> {
        self.check_dim(dim_idx)?;
        Ok(self.dim_ranges[dim_idx].is_default())
    }

    /// Add a label range on a dimension.
    ///
    /// The first label range fixes the label name for the dimension; a
    /// range for a different label on the same dimension is rejected.
    pub fn add_label_range(
        &mut self,
        dim_idx: usize,
        label_name: &str,
        range: Range,
    ) -> Result<()> {
        self.check_dim(dim_idx)?;
        if self.dim_ranges[dim_idx].is_explicitly_initialized() {
            return Err(Error::invalid_argument(format!(
                "cannot add label range to dimension {}; it already has index ranges",
                dim_idx
            )));
        }
        let reference = self.schema.dimension_label_reference(label_name)?;
        if reference.dimension_index() != dim_idx {
            return Err(Error::invalid_argument(format!(
                "dimension label '{}' is declared on dimension {}, not {}",
                label_name,
                reference.dimension_index(),
                dim_idx
            )));
        }
        match &mut self.label_ranges[dim_idx] {
            Some(existing) => {
                if existing.label_name != label_name {
                    return Err(Error::invalid_argument(format!(
                        "dimension {} already has ranges for label '{}'",
                        dim_idx, existing.label_name
                    )));
                }
                existing.ranges.add_range(range, false)
            }
            slot @ None => {
                let mut ranges = RangeSetAndSuperset::new_empty(
                    reference.label_datatype(),
                    reference.label_domain().clone(),
                );
                ranges.add_range(range, false)?;
                *slot = Some(LabelRangeSet {
                    label_name: label_name.to_string(),
                    ranges,
                });
                Ok(())
            }
        }
    }

    /// True when a dimension carries label ranges
    pub fn has_label_ranges(&self, dim_idx: usize) -> bool {
        self.label_ranges
            .get(dim_idx)
            .map(|l| l.is_some())
            .unwrap_or(false)
    }

    /// True when any dimension carries label ranges
    pub fn has_any_label_ranges(&self) -> bool {
        self.label_ranges.iter().any(|l| l.is_some())
    }

    /// Name of the label whose ranges are set on a dimension
    pub fn label_name(&self, dim_idx: usize) -> Option<&str> {
        self.label_ranges
            .get(dim_idx)?
            .as_ref()
            .map(|l| l.label_name.as_str())
    }

    /// The label ranges set on a dimension
    pub fn label_ranges(&self, dim_idx: usize) -> Option<&RangeSetAndSuperset> {
        self.label_ranges.get(dim_idx)?.as_ref().map(|l| &l.ranges)
    }
}
