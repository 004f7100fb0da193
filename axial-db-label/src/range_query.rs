//! Bounded-search translation of label ranges into index ranges.
//!
//! A [`RangeQuery`] resolves one label range `[ls, le]` against the sorted
//! labelled array by issuing two one-cell probes:
//!
//! - the *lower* probe reads the first `(label, index)` cell with
//!   `label >= ls`;
//! - the *upper* probe reads the first cell with `label >= le`.
//!
//! Because the underlying search returns the first cell at or above the
//! bound rather than the exact boundary, the upper probe can land one cell
//! past the requested range. When the matched upper label is strictly
//! greater than `le`, the overshot index endpoint is stepped back by one:
//! for increasing labels that is the upper index bound, for decreasing
//! labels the lower one (labels decrease as indices increase, so the two
//! probes feed opposite ends of the index range).
//!
//! The probes assume the label holds consecutive index values with no
//! gaps, which is what the ordered write path produces.

use crate::dimension_label::{DimensionLabel, INDEX_ATTRIBUTE_NAME, LABEL_DIMENSION_NAME};
use crate::error::{Error, Result};
use axial_db_core::{
    Datatype, LabelOrder, Query, QueryBuffer, QueryStatus, Range, RangeSetAndSuperset, Subarray,
};
use std::cmp::Ordering;

/// Resolves one label range to one index range via two bounded probes
#[derive(Debug)]
pub struct RangeQuery {
    order: LabelOrder,
    label_datatype: Datatype,
    index_datatype: Datatype,
    input_label_range: Range,
    computed_index_range: Option<Range>,
    lower_bound_query: Query,
    upper_bound_query: Query,
    lower_label: QueryBuffer,
    lower_index: QueryBuffer,
    upper_label: QueryBuffer,
    upper_index: QueryBuffer,
    status: QueryStatus,
}

/// Build a one-cell probe query reading the first cell with
/// `label >= bound`
fn probe_query(
    dimension_label: &DimensionLabel,
    bound: &[u8],
    label_buffer: &QueryBuffer,
    index_buffer: &QueryBuffer,
) -> Result<Query> {
    let labelled = dimension_label.labelled_array();
    let schema = labelled.schema().map_err(Error::Core)?;
    let label_domain = schema.dimension(0).map_err(Error::Core)?.domain().clone();

    let mut probe_range = Vec::with_capacity(label_domain.value_size() * 2);
    probe_range.extend_from_slice(bound);
    probe_range.extend_from_slice(label_domain.end_bytes());
    let probe_range = Range::from_bytes(probe_range, label_domain.value_size())
        .map_err(Error::Core)?;

    let mut subarray = Subarray::new(schema);
    subarray.add_range(0, probe_range).map_err(Error::Core)?;

    let mut query = Query::new(std::sync::Arc::clone(labelled)).map_err(Error::Core)?;
    query.set_subarray(subarray).map_err(Error::Core)?;
    query
        .set_data_buffer(LABEL_DIMENSION_NAME, label_buffer.clone())
        .map_err(Error::Core)?;
    query
        .set_data_buffer(INDEX_ATTRIBUTE_NAME, index_buffer.clone())
        .map_err(Error::Core)?;
    Ok(query)
}

impl RangeQuery {
    /// Create a range query for one label range.
    ///
    /// The dimension label must be open for reading and carry an
    /// increasing or decreasing order.
    pub fn new(dimension_label: &DimensionLabel, label_range: Range) -> Result<Self> {
        let order = dimension_label.label_order();
        if order == LabelOrder::Unordered {
            return Err(Error::unsupported_order(
                "range queries are only supported for increasing and decreasing labels",
            ));
        }
        let label_datatype = dimension_label.label_datatype();
        let index_datatype = dimension_label.index_datatype();
        if !index_datatype.is_integer_like() {
            return Err(Error::Core(axial_db_core::Error::unsupported_datatype(
                format!("index datatype {} is not integer-valued", index_datatype),
            )));
        }

        let lower_label = QueryBuffer::with_capacity(label_datatype.size());
        let lower_index = QueryBuffer::with_capacity(index_datatype.size());
        let upper_label = QueryBuffer::with_capacity(label_datatype.size());
        let upper_index = QueryBuffer::with_capacity(index_datatype.size());

        let lower_bound_query = probe_query(
            dimension_label,
            label_range.start_bytes(),
            &lower_label,
            &lower_index,
        )?;
        let upper_bound_query = probe_query(
            dimension_label,
            label_range.end_bytes(),
            &upper_label,
            &upper_index,
        )?;

        Ok(Self {
            order,
            label_datatype,
            index_datatype,
            input_label_range: label_range,
            computed_index_range: None,
            lower_bound_query,
            upper_bound_query,
            lower_label,
            lower_index,
            upper_label,
            upper_index,
            status: QueryStatus::Uninitialized,
        })
    }

    /// Run both probes and compute the index range.
    ///
    /// The probes run concurrently; the overshoot correction happens after
    /// both have completed.
    pub async fn process(&mut self) -> Result<()> {
        if self.status != QueryStatus::Uninitialized {
            return Err(Error::internal(format!(
                "cannot process a range query with status {}",
                self.status
            )));
        }
        self.status = QueryStatus::InProgress;

        let lower = &mut self.lower_bound_query;
        let upper = &mut self.upper_bound_query;
        let (lower_result, upper_result) = futures::join!(lower.process(), upper.process());
        if let Err(e) = lower_result {
            upper.cancel();
            self.status = QueryStatus::Failed;
            return Err(e.into());
        }
        if let Err(e) = upper_result {
            lower.cancel();
            self.status = QueryStatus::Failed;
            return Err(e.into());
        }

        if !self.lower_bound_query.has_results() || !self.upper_bound_query.has_results() {
            self.status = QueryStatus::Failed;
            return Err(Error::label_range_not_found(
                "no label found at or above the requested range",
            ));
        }

        // Matched labels from both probes, as a range for typed comparison.
        let mut matched = Vec::with_capacity(self.label_datatype.size() * 2);
        matched.extend_from_slice(&self.lower_label.bytes());
        matched.extend_from_slice(&self.upper_label.bytes());
        let matched_labels = Range::from_bytes(matched, self.label_datatype.size())
            .map_err(Error::Core)?;

        // The lower probe matched the smallest stored label >= ls. If even
        // that label is above le, nothing is stored inside [ls, le].
        if matched_labels.lower_vs_upper(&self.input_label_range, self.label_datatype)
            == Ordering::Greater
        {
            self.computed_index_range = None;
            self.status = QueryStatus::Completed;
            return Ok(());
        }

        // Wire the probe indices onto the index range. For decreasing
        // labels the lower probe lands at the high end of the index range.
        let mut index_bytes = Vec::with_capacity(self.index_datatype.size() * 2);
        match self.order {
            LabelOrder::Increasing => {
                index_bytes.extend_from_slice(&self.lower_index.bytes());
                index_bytes.extend_from_slice(&self.upper_index.bytes());
            }
            LabelOrder::Decreasing => {
                index_bytes.extend_from_slice(&self.upper_index.bytes());
                index_bytes.extend_from_slice(&self.lower_index.bytes());
            }
            LabelOrder::Unordered => unreachable!("rejected at construction"),
        }
        let mut index_range = Range::from_bytes(index_bytes, self.index_datatype.size())
            .map_err(Error::Core)?;

        // Overshoot: the upper probe landed strictly past the requested
        // bound, so its index endpoint selects one cell too many.
        if matched_labels.compare_upper_bound(&self.input_label_range, self.label_datatype)
            == Ordering::Greater
        {
            match self.order {
                LabelOrder::Increasing => index_range
                    .decrease_upper_bound(self.index_datatype)
                    .map_err(Error::Core)?,
                LabelOrder::Decreasing => index_range
                    .increase_lower_bound(self.index_datatype)
                    .map_err(Error::Core)?,
                LabelOrder::Unordered => unreachable!("rejected at construction"),
            }
        }

        if index_range.is_inverted(self.index_datatype) {
            self.computed_index_range = None;
        } else {
            self.computed_index_range = Some(index_range);
        }
        self.status = QueryStatus::Completed;
        Ok(())
    }

    /// The computed index range; `None` when the query has not completed
    /// or the resolution is empty
    pub fn index_range(&self) -> Option<&Range> {
        self.computed_index_range.as_ref()
    }

    /// Current status
    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// Cancel the query and both probes (idempotent)
    pub fn cancel(&mut self) {
        self.lower_bound_query.cancel();
        self.upper_bound_query.cancel();
        if !self.status.is_terminal() {
            self.status = QueryStatus::Failed;
            self.computed_index_range = None;
        }
    }

    /// Finalize both probes
    pub fn finalize(&mut self) -> Result<()> {
        self.lower_bound_query.finalize().map_err(Error::Core)?;
        self.upper_bound_query.finalize().map_err(Error::Core)?;
        Ok(())
    }
}

/// Index ranges resolved by a range query, shaped for bulk insertion into
/// the parent subarray
#[derive(Clone, Debug)]
pub struct IndexRanges {
    /// True when every range is a degenerate point
    pub is_point_ranges: bool,
    /// The resolved ranges, in index order
    pub ranges: Vec<Range>,
}

/// One-dimension-one-label range query over a set of label ranges.
///
/// Currently constrained to exactly one label range; the probes cannot
/// express multiple ranges in a single pass.
#[derive(Debug)]
pub struct LabelRangeQuery {
    dim_idx: usize,
    inner: RangeQuery,
}

impl LabelRangeQuery {
    /// Create a range query for the label ranges set on one dimension
    pub fn new(
        dimension_label: &DimensionLabel,
        dim_idx: usize,
        label_ranges: &RangeSetAndSuperset,
    ) -> Result<Self> {
        match label_ranges.num_ranges() {
            0 => Err(Error::Core(axial_db_core::Error::invalid_argument(
                "cannot initialize range query; no label range set",
            ))),
            1 => Ok(Self {
                dim_idx,
                inner: RangeQuery::new(dimension_label, label_ranges.ranges()[0].clone())?,
            }),
            n => Err(Error::Core(axial_db_core::Error::invalid_argument(format!(
                "cannot initialize range query; {} label ranges set but only one is supported",
                n
            )))),
        }
    }

    /// The parent dimension this query resolves ranges for
    pub fn dim_idx(&self) -> usize {
        self.dim_idx
    }

    /// Run the wrapped probes to completion
    pub async fn process(&mut self) -> Result<()> {
        self.inner.process().await
    }

    /// Status of the wrapped query
    pub fn status(&self) -> QueryStatus {
        self.inner.status()
    }

    /// The resolved index ranges for insertion into the parent subarray
    pub fn index_ranges(&self) -> IndexRanges {
        IndexRanges {
            is_point_ranges: false,
            ranges: self.inner.index_range().cloned().into_iter().collect(),
        }
    }

    /// Cancel the wrapped query (idempotent)
    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    /// Finalize the wrapped query
    pub fn finalize(&mut self) -> Result<()> {
        self.inner.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension_label::LABEL_ATTRIBUTE_NAME;
    use axial_db_core::{
        CellValNum, Dimension, DimensionLabelReference, Layout, MemoryStorage, QueryType, Storage,
    };
    use std::sync::Arc;

    fn parent_dimension() -> Dimension {
        Dimension::new("d0", Datatype::UInt64, Range::from_scalars(1u64, 4u64))
    }

    fn reference(order: LabelOrder) -> DimensionLabelReference {
        DimensionLabelReference::new(
            "height",
            0,
            order,
            Datatype::UInt64,
            Range::from_scalars(0u64, 400u64),
            CellValNum::single(),
            "__labels/l0",
        )
    }

    /// Create a label and write `(labels, indices)` into both backing
    /// arrays, then reopen it for reading.
    async fn label_with_data(order: LabelOrder, labels: &[u64]) -> DimensionLabel {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let reference = reference(order);
        DimensionLabel::create(&storage, "parent", &reference, &parent_dimension())
            .await
            .unwrap();

        let label = DimensionLabel::new(
            Arc::clone(&storage),
            "parent",
            reference,
            parent_dimension(),
        );
        label.open(QueryType::Write, 0, 10).await.unwrap();

        let indices: Vec<u64> = (1..=labels.len() as u64).collect();
        let mut labelled = Query::new(Arc::clone(label.labelled_array())).unwrap();
        labelled.set_layout(Layout::Unordered).unwrap();
        labelled
            .set_data_buffer(LABEL_DIMENSION_NAME, QueryBuffer::from_vec(labels))
            .unwrap();
        labelled
            .set_data_buffer(INDEX_ATTRIBUTE_NAME, QueryBuffer::from_vec(&indices))
            .unwrap();
        labelled.process().await.unwrap();

        let mut indexed = Query::new(Arc::clone(label.indexed_array())).unwrap();
        indexed
            .set_data_buffer(LABEL_ATTRIBUTE_NAME, QueryBuffer::from_vec(labels))
            .unwrap();
        indexed.process().await.unwrap();

        label.close();
        label.open(QueryType::Read, 0, 10).await.unwrap();
        label
    }

    async fn resolve(label: &DimensionLabel, lo: u64, hi: u64) -> Option<(u64, u64)> {
        let mut query = RangeQuery::new(label, Range::from_scalars(lo, hi)).unwrap();
        query.process().await.unwrap();
        assert_eq!(query.status(), QueryStatus::Completed);
        query
            .index_range()
            .map(|r| (r.start_as::<u64>(), r.end_as::<u64>()))
    }

    #[tokio::test]
    async fn test_exact_range_increasing() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        assert_eq!(resolve(&label, 20, 30).await, Some((2, 3)));
    }

    #[tokio::test]
    async fn test_inexact_range_corrects_upper_bound() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        assert_eq!(resolve(&label, 12, 35).await, Some((2, 3)));
    }

    #[tokio::test]
    async fn test_empty_resolution() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        assert_eq!(resolve(&label, 12, 18).await, None);
    }

    #[tokio::test]
    async fn test_exact_singleton_decreasing() {
        let label = label_with_data(LabelOrder::Decreasing, &[40, 30, 20, 10]).await;
        assert_eq!(resolve(&label, 20, 20).await, Some((3, 3)));
    }

    #[tokio::test]
    async fn test_inexact_range_decreasing() {
        let label = label_with_data(LabelOrder::Decreasing, &[40, 30, 20, 10]).await;
        // Labels within [15, 35] are 30 and 20, at indices 2 and 3.
        assert_eq!(resolve(&label, 15, 35).await, Some((2, 3)));
    }

    #[tokio::test]
    async fn test_probe_miss_fails() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        let mut query = RangeQuery::new(&label, Range::from_scalars(41u64, 300u64)).unwrap();
        let result = query.process().await;
        assert!(matches!(result, Err(Error::LabelRangeNotFound(_))));
        assert_eq!(query.status(), QueryStatus::Failed);
        assert!(query.index_range().is_none());
    }

    #[tokio::test]
    async fn test_cancel_idempotent() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        let mut query = RangeQuery::new(&label, Range::from_scalars(20u64, 30u64)).unwrap();
        query.cancel();
        assert_eq!(query.status(), QueryStatus::Failed);
        query.cancel();
        assert_eq!(query.status(), QueryStatus::Failed);
        assert!(query.process().await.is_err());
    }

    #[tokio::test]
    async fn test_unordered_rejected() {
        let label = label_with_data(LabelOrder::Unordered, &[10, 20, 30, 40]).await;
        assert!(matches!(
            RangeQuery::new(&label, Range::from_scalars(20u64, 30u64)),
            Err(Error::UnsupportedOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_label_range_query_requires_exactly_one_range() {
        let label = label_with_data(LabelOrder::Increasing, &[10, 20, 30, 40]).await;
        let superset = Range::from_scalars(0u64, 400u64);

        let empty = RangeSetAndSuperset::new_empty(Datatype::UInt64, superset.clone());
        assert!(LabelRangeQuery::new(&label, 0, &empty).is_err());

        let mut two = RangeSetAndSuperset::new_empty(Datatype::UInt64, superset.clone());
        two.add_range(Range::from_scalars(10u64, 20u64), false)
            .unwrap();
        two.add_range(Range::from_scalars(30u64, 40u64), false)
            .unwrap();
        assert!(LabelRangeQuery::new(&label, 0, &two).is_err());

        let mut one = RangeSetAndSuperset::new_empty(Datatype::UInt64, superset);
        one.add_range(Range::from_scalars(20u64, 30u64), false)
            .unwrap();
        let mut query = LabelRangeQuery::new(&label, 0, &one).unwrap();
        query.process().await.unwrap();
        let resolved = query.index_ranges();
        assert!(!resolved.is_point_ranges);
        assert_eq!(resolved.ranges.len(), 1);
        assert_eq!(resolved.ranges[0].start_as::<u64>(), 2);
        assert_eq!(resolved.ranges[0].end_as::<u64>(), 3);
    }
}
