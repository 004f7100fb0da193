//! Reads and writes of label values across the sibling arrays.
//!
//! A [`LabelDataQuery`] coordinates up to two child queries, one per
//! backing array of a dimension label:
//!
//! - *ordered read*: only the indexed array is queried, row-major, over
//!   the parent subarray's index ranges;
//! - *ordered write*: write-once; the labelled array is written unordered
//!   with `(label, index)` cells while the indexed array is written
//!   row-major over the full domain;
//! - *unordered write*: both arrays are written unordered from the
//!   caller's `(label, index)` buffers.
//!
//! Paired writes share one fragment name so a later read sees both
//! fragments or neither.

use crate::dimension_label::{
    DimensionLabel, INDEX_ATTRIBUTE_NAME, INDEX_DIMENSION_NAME, LABEL_ATTRIBUTE_NAME,
    LABEL_DIMENSION_NAME,
};
use crate::error::{Error, Result};
use axial_db_core::datatype::{i128_to_scalar_bytes, scalar_bytes_to_i128};
use axial_db_core::{Layout, Query, QueryBuffer, QueryStatus, QueryType, Subarray};
use std::sync::Arc;

/// Which shape of data query this is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Variant {
    OrderedRead,
    OrderedWrite,
    UnorderedWrite,
}

/// Coordinated read or write of label values
#[derive(Debug)]
pub struct LabelDataQuery {
    variant: Variant,
    indexed_query: Option<Query>,
    labelled_query: Option<Query>,
}

impl LabelDataQuery {
    /// Create an ordered read of label values over the parent subarray's
    /// index ranges for `dim_idx`.
    pub fn ordered_read(
        dimension_label: &DimensionLabel,
        parent_subarray: &Subarray,
        dim_idx: usize,
        label_buffer: &QueryBuffer,
    ) -> Result<Self> {
        let query_type = dimension_label.query_type()?;
        if query_type != QueryType::Read {
            return Err(Error::Core(axial_db_core::Error::invalid_argument(format!(
                "cannot read from a dimension label opened for {}",
                query_type
            ))));
        }

        let indexed = dimension_label.indexed_array();
        let mut query = Query::new(Arc::clone(indexed)).map_err(Error::Core)?;
        query.set_layout(Layout::RowMajor).map_err(Error::Core)?;

        // Copy the parent's index ranges for this dimension onto
        // dimension 0 of the indexed array.
        let parent_ranges = parent_subarray
            .ranges_for_dim(dim_idx)
            .map_err(Error::Core)?;
        let mut subarray = Subarray::new(indexed.schema().map_err(Error::Core)?);
        if !parent_ranges.is_default() {
            subarray
                .set_ranges_for_dim(0, parent_ranges.ranges())
                .map_err(Error::Core)?;
        }
        query.set_subarray(subarray).map_err(Error::Core)?;
        query
            .set_data_buffer(LABEL_ATTRIBUTE_NAME, label_buffer.clone())
            .map_err(Error::Core)?;

        Ok(Self {
            variant: Variant::OrderedRead,
            indexed_query: Some(query),
            labelled_query: None,
        })
    }

    /// Create an ordered write of the full label.
    ///
    /// An ordered label is write-once: both backing arrays must be empty.
    /// When no index buffer is supplied the index cells are generated from
    /// the parent dimension domain.
    pub fn ordered_write(
        dimension_label: &DimensionLabel,
        parent_subarray: &Subarray,
        dim_idx: usize,
        label_buffer: &QueryBuffer,
        index_buffer: Option<&QueryBuffer>,
        fragment_name: &str,
    ) -> Result<Self> {
        let query_type = dimension_label.query_type()?;
        if query_type != QueryType::Write {
            return Err(Error::Core(axial_db_core::Error::invalid_argument(format!(
                "cannot write to a dimension label opened for {}",
                query_type
            ))));
        }
        if !dimension_label.indexed_array().is_empty()?
            || !dimension_label.labelled_array().is_empty()?
        {
            return Err(Error::single_fragment_label(format!(
                "ordered label '{}' has already been written",
                dimension_label.reference().name()
            )));
        }
        if !parent_subarray.is_default(dim_idx).map_err(Error::Core)? {
            return Err(Error::Core(axial_db_core::Error::invalid_argument(
                "ordered labels only support writing the full array",
            )));
        }

        let index_buffer = match index_buffer {
            Some(buffer) => buffer.clone(),
            None => generated_index_buffer(dimension_label, label_buffer)?,
        };

        // Labelled array: (label, index) cells, sorted on materialization.
        let mut labelled_query =
            Query::new(Arc::clone(dimension_label.labelled_array())).map_err(Error::Core)?;
        labelled_query
            .set_layout(Layout::Unordered)
            .map_err(Error::Core)?;
        labelled_query
            .set_data_buffer(LABEL_DIMENSION_NAME, label_buffer.clone())
            .map_err(Error::Core)?;
        labelled_query
            .set_data_buffer(INDEX_ATTRIBUTE_NAME, index_buffer.clone())
            .map_err(Error::Core)?;
        labelled_query
            .set_fragment_name(fragment_name)
            .map_err(Error::Core)?;

        // Indexed array: label cells in index order over the full domain.
        let mut indexed_query =
            Query::new(Arc::clone(dimension_label.indexed_array())).map_err(Error::Core)?;
        indexed_query
            .set_layout(Layout::RowMajor)
            .map_err(Error::Core)?;
        indexed_query
            .set_data_buffer(LABEL_ATTRIBUTE_NAME, label_buffer.clone())
            .map_err(Error::Core)?;
        indexed_query
            .set_fragment_name(fragment_name)
            .map_err(Error::Core)?;

        Ok(Self {
            variant: Variant::OrderedWrite,
            indexed_query: Some(indexed_query),
            labelled_query: Some(labelled_query),
        })
    }

    /// Create an unordered write from the caller's `(label, index)`
    /// buffers.
    pub fn unordered_write(
        dimension_label: &DimensionLabel,
        label_buffer: &QueryBuffer,
        index_buffer: Option<&QueryBuffer>,
        fragment_name: &str,
    ) -> Result<Self> {
        let query_type = dimension_label.query_type()?;
        if query_type != QueryType::Write {
            return Err(Error::Core(axial_db_core::Error::invalid_argument(format!(
                "cannot write to a dimension label opened for {}",
                query_type
            ))));
        }
        let index_buffer = index_buffer.ok_or_else(|| {
            Error::missing_index_buffer(format!(
                "unordered write to label '{}' requires the dimension data buffer",
                dimension_label.reference().name()
            ))
        })?;

        let mut labelled_query =
            Query::new(Arc::clone(dimension_label.labelled_array())).map_err(Error::Core)?;
        labelled_query
            .set_layout(Layout::Unordered)
            .map_err(Error::Core)?;
        labelled_query
            .set_data_buffer(LABEL_DIMENSION_NAME, label_buffer.clone())
            .map_err(Error::Core)?;
        labelled_query
            .set_data_buffer(INDEX_ATTRIBUTE_NAME, index_buffer.clone())
            .map_err(Error::Core)?;
        labelled_query
            .set_fragment_name(fragment_name)
            .map_err(Error::Core)?;

        let mut indexed_query =
            Query::new(Arc::clone(dimension_label.indexed_array())).map_err(Error::Core)?;
        indexed_query
            .set_layout(Layout::Unordered)
            .map_err(Error::Core)?;
        indexed_query
            .set_data_buffer(LABEL_ATTRIBUTE_NAME, label_buffer.clone())
            .map_err(Error::Core)?;
        indexed_query
            .set_data_buffer(INDEX_DIMENSION_NAME, index_buffer.clone())
            .map_err(Error::Core)?;
        indexed_query
            .set_fragment_name(fragment_name)
            .map_err(Error::Core)?;

        Ok(Self {
            variant: Variant::UnorderedWrite,
            indexed_query: Some(indexed_query),
            labelled_query: Some(labelled_query),
        })
    }

    /// Run the child queries to completion, concurrently when both exist
    pub async fn process(&mut self) -> Result<()> {
        let indexed = &mut self.indexed_query;
        let labelled = &mut self.labelled_query;
        let indexed_fut = async move {
            match indexed {
                Some(query) => query.process().await,
                None => Ok(()),
            }
        };
        let labelled_fut = async move {
            match labelled {
                Some(query) => query.process().await,
                None => Ok(()),
            }
        };
        let (indexed_result, labelled_result) = futures::join!(indexed_fut, labelled_fut);
        indexed_result.map_err(Error::Core)?;
        labelled_result.map_err(Error::Core)?;
        Ok(())
    }

    /// Aggregate status composed from the child statuses
    pub fn status(&self) -> Result<QueryStatus> {
        match self.variant {
            Variant::OrderedRead => {
                let query = self
                    .indexed_query
                    .as_ref()
                    .ok_or_else(|| Error::internal("ordered read lost its indexed query"))?;
                Ok(query.status())
            }
            Variant::OrderedWrite | Variant::UnorderedWrite => {
                let (indexed, labelled) = match (&self.indexed_query, &self.labelled_query) {
                    (Some(i), Some(l)) => (i.status(), l.status()),
                    (None, None) => return Ok(QueryStatus::Uninitialized),
                    _ => {
                        return Err(Error::internal(
                            "dimension label query failed to fully initialize",
                        ))
                    }
                };
                if indexed == labelled {
                    return Ok(indexed);
                }
                if indexed == QueryStatus::Failed || labelled == QueryStatus::Failed {
                    return Ok(QueryStatus::Failed);
                }
                if indexed == QueryStatus::Uninitialized || labelled == QueryStatus::Uninitialized
                {
                    return Err(Error::internal(
                        "dimension label query failed to fully initialize",
                    ));
                }
                if indexed == QueryStatus::Incomplete || labelled == QueryStatus::Incomplete {
                    return Ok(QueryStatus::Incomplete);
                }
                Ok(QueryStatus::InProgress)
            }
        }
    }

    /// True when the aggregate status is Completed
    pub fn completed(&self) -> bool {
        matches!(self.status(), Ok(QueryStatus::Completed))
    }

    /// Cancel both child queries (idempotent)
    pub fn cancel(&mut self) {
        if let Some(query) = &mut self.indexed_query {
            query.cancel();
        }
        if let Some(query) = &mut self.labelled_query {
            query.cancel();
        }
    }

    /// Finalize both child queries
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(query) = &mut self.indexed_query {
            query.finalize().map_err(Error::Core)?;
        }
        if let Some(query) = &mut self.labelled_query {
            query.finalize().map_err(Error::Core)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn indexed_query_mut(&mut self) -> Option<&mut Query> {
        self.indexed_query.as_mut()
    }
}

/// Generate index cells covering the parent dimension domain, one per
/// label value in the buffer.
fn generated_index_buffer(
    dimension_label: &DimensionLabel,
    label_buffer: &QueryBuffer,
) -> Result<QueryBuffer> {
    let index_datatype = dimension_label.index_datatype();
    let label_width = dimension_label.label_datatype().size();
    let count = label_buffer.size() / label_width;

    let index_dim = dimension_label.index_dimension()?;
    let start = scalar_bytes_to_i128(index_datatype, index_dim.domain().start_bytes())
        .map_err(Error::Core)?;

    let width = index_datatype.size();
    let mut bytes = Vec::with_capacity(count * width);
    for offset in 0..count as i128 {
        bytes.extend_from_slice(&i128_to_scalar_bytes(index_datatype, start + offset));
    }
    let buffer = QueryBuffer::with_capacity(bytes.len());
    buffer.write_bytes(&bytes);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axial_db_core::{
        CellValNum, Datatype, Dimension, DimensionLabelReference, LabelOrder, MemoryStorage,
        Range, Storage,
    };

    fn parent_dimension() -> Dimension {
        Dimension::new("d0", Datatype::UInt64, Range::from_scalars(1u64, 4u64))
    }

    fn reference(order: LabelOrder) -> DimensionLabelReference {
        DimensionLabelReference::new(
            "height",
            0,
            order,
            Datatype::Int64,
            Range::from_scalars(-100i64, 100i64),
            CellValNum::single(),
            "__labels/l0",
        )
    }

    async fn open_label(order: LabelOrder, query_type: QueryType) -> DimensionLabel {
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
        label.open(query_type, 0, 10).await.unwrap();
        label
    }

    fn parent_subarray(label: &DimensionLabel) -> Subarray {
        // A one-dimension stand-in for the parent array's subarray; the
        // indexed array shares the parent dimension so its schema works.
        Subarray::new(label.indexed_array().schema().unwrap())
    }

    #[tokio::test]
    async fn test_ordered_write_then_read_roundtrip() {
        let label = open_label(LabelOrder::Increasing, QueryType::Write).await;
        let subarray = parent_subarray(&label);
        let labels = QueryBuffer::from_vec(&[-9i64, -3, 0, 12]);
        let mut write =
            LabelDataQuery::ordered_write(&label, &subarray, 0, &labels, None, "__5_5_aa_4")
                .unwrap();
        write.process().await.unwrap();
        assert_eq!(write.status().unwrap(), QueryStatus::Completed);
        assert!(write.completed());
        label.close();

        label.open(QueryType::Read, 0, 10).await.unwrap();
        let mut subarray = parent_subarray(&label);
        subarray
            .add_range(0, Range::from_scalars(2u64, 3u64))
            .unwrap();
        let out = QueryBuffer::for_values::<i64>(2);
        let mut read = LabelDataQuery::ordered_read(&label, &subarray, 0, &out).unwrap();
        read.process().await.unwrap();
        assert!(read.completed());
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![-3, 0]);
    }

    #[tokio::test]
    async fn test_ordered_write_is_write_once() {
        let label = open_label(LabelOrder::Increasing, QueryType::Write).await;
        let subarray = parent_subarray(&label);
        let labels = QueryBuffer::from_vec(&[-9i64, -3, 0, 12]);
        let mut write =
            LabelDataQuery::ordered_write(&label, &subarray, 0, &labels, None, "__5_5_ab_4")
                .unwrap();
        write.process().await.unwrap();

        let result =
            LabelDataQuery::ordered_write(&label, &subarray, 0, &labels, None, "__6_6_ac_4");
        assert!(matches!(result, Err(Error::SingleFragmentLabel(_))));
    }

    #[tokio::test]
    async fn test_ordered_write_requires_default_subarray() {
        let label = open_label(LabelOrder::Increasing, QueryType::Write).await;
        let mut subarray = parent_subarray(&label);
        subarray
            .add_range(0, Range::from_scalars(1u64, 2u64))
            .unwrap();
        let labels = QueryBuffer::from_vec(&[-9i64, -3]);
        let result =
            LabelDataQuery::ordered_write(&label, &subarray, 0, &labels, None, "__5_5_ad_4");
        assert!(matches!(
            result,
            Err(Error::Core(axial_db_core::Error::InvalidArgument(_)))
        ));
    }

    #[tokio::test]
    async fn test_unordered_write_requires_index_buffer() {
        let label = open_label(LabelOrder::Unordered, QueryType::Write).await;
        let labels = QueryBuffer::from_vec(&[5i64, -7, 3, 1]);
        let result = LabelDataQuery::unordered_write(&label, &labels, None, "__5_5_ae_4");
        assert!(matches!(result, Err(Error::MissingIndexBuffer(_))));
    }

    #[tokio::test]
    async fn test_unordered_write_pairs_fragments() {
        let label = open_label(LabelOrder::Unordered, QueryType::Write).await;
        let labels = QueryBuffer::from_vec(&[5i64, -7, 3, 1]);
        let indices = QueryBuffer::from_vec(&[2u64, 4, 1, 3]);
        let mut write =
            LabelDataQuery::unordered_write(&label, &labels, Some(&indices), "__5_5_af_4")
                .unwrap();
        write.process().await.unwrap();
        assert!(write.completed());

        let indexed_fragments = label.indexed_array().fragments().unwrap();
        let labelled_fragments = label.labelled_array().fragments().unwrap();
        assert_eq!(indexed_fragments.len(), 1);
        assert_eq!(labelled_fragments.len(), 1);
        assert_eq!(indexed_fragments[0].name(), labelled_fragments[0].name());
        assert_eq!(
            indexed_fragments[0].timestamp(),
            labelled_fragments[0].timestamp()
        );
    }

    #[tokio::test]
    async fn test_status_composition_failed_child() {
        let label = open_label(LabelOrder::Unordered, QueryType::Write).await;
        let labels = QueryBuffer::from_vec(&[5i64, -7, 3, 1]);
        let indices = QueryBuffer::from_vec(&[2u64, 4, 1, 3]);
        let mut write =
            LabelDataQuery::unordered_write(&label, &labels, Some(&indices), "__5_5_ag_4")
                .unwrap();

        // Force the indexed child to failed while the labelled child is
        // still uninitialized, then run only the labelled side.
        write.indexed_query_mut().unwrap().cancel();
        assert_eq!(write.status().unwrap(), QueryStatus::Failed);

        write.cancel();
        assert_eq!(write.status().unwrap(), QueryStatus::Failed);
        write.cancel();
        assert_eq!(write.status().unwrap(), QueryStatus::Failed);
    }

    #[tokio::test]
    async fn test_read_requires_read_open() {
        let label = open_label(LabelOrder::Increasing, QueryType::Write).await;
        let subarray = parent_subarray(&label);
        let out = QueryBuffer::for_values::<i64>(4);
        assert!(LabelDataQuery::ordered_read(&label, &subarray, 0, &out).is_err());
    }
}
