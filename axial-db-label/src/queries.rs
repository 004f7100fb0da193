//! The dimension-label query aggregate.
//!
//! [`DimensionLabelQueries`] is what the parent query talks to: for one
//! parent array query it builds every range query and data query the
//! subarray and label buffers call for, runs the range queries and writes
//! the resolved index ranges back onto the subarray, then runs the data
//! queries. Range queries for all dimensions complete and install their
//! results before any data query runs.

use crate::data_query::LabelDataQuery;
use crate::dimension_label::DimensionLabel;
use crate::error::{Error, Result};
use crate::range_query::{IndexRanges, LabelRangeQuery};
use axial_db_core::{
    generate_fragment_name, Array, DimensionLabelReference, LabelOrder, QueryBuffer, QueryStatus,
    QueryType, Storage, Subarray,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// All dimension-label queries belonging to one parent array query
#[derive(Debug)]
pub struct DimensionLabelQueries {
    dimension_labels: HashMap<String, Arc<DimensionLabel>>,
    /// Range queries by parent dimension index
    range_queries: Vec<Option<LabelRangeQuery>>,
    /// Labels already consumed by a range query
    range_query_labels: HashSet<String>,
    data_queries: Vec<LabelDataQuery>,
    /// Label-value reads that must wait for range resolution: the read
    /// needs the index ranges the range query installs on the subarray
    pending_read_queries: Vec<(String, usize, QueryBuffer)>,
    range_query_status: QueryStatus,
    fragment_name: Option<String>,
}

impl DimensionLabelQueries {
    /// Build the aggregate for one parent query.
    ///
    /// `label_buffers` maps label names to label-value buffers supplied by
    /// the caller; `array_buffers` maps parent dimension names to index
    /// buffers. The optional `fragment_name` pins the name used for paired
    /// label writes; when absent on a write it is generated here.
    pub async fn new(
        storage: Arc<dyn Storage>,
        array: &Array,
        subarray: &Subarray,
        label_buffers: &HashMap<String, QueryBuffer>,
        array_buffers: &HashMap<String, QueryBuffer>,
        fragment_name: Option<String>,
    ) -> Result<Self> {
        let mut queries = Self {
            dimension_labels: HashMap::new(),
            range_queries: (0..subarray.dim_num()).map(|_| None).collect(),
            range_query_labels: HashSet::new(),
            data_queries: Vec::new(),
            pending_read_queries: Vec::new(),
            range_query_status: QueryStatus::Uninitialized,
            fragment_name,
        };

        let query_type = array.query_type()?;
        match query_type {
            QueryType::Read => {
                queries
                    .add_range_queries(&storage, array, subarray, array_buffers)
                    .await?;
                queries
                    .add_data_queries_for_read(&storage, array, subarray, label_buffers)
                    .await?;
            }
            QueryType::Write => {
                if queries.fragment_name.is_none() {
                    queries.fragment_name = Some(generate_fragment_name(
                        array.timestamp_end()?,
                        array.schema()?.write_version(),
                    ));
                }
                queries
                    .add_range_queries(&storage, array, subarray, array_buffers)
                    .await?;
                queries
                    .add_data_queries_for_write(
                        &storage,
                        array,
                        subarray,
                        label_buffers,
                        array_buffers,
                    )
                    .await?;
            }
            QueryType::Delete | QueryType::Update | QueryType::ModifyExclusive => {
                if !label_buffers.is_empty() || subarray.has_any_label_ranges() {
                    return Err(Error::unsupported_for_query_type(format!(
                        "query type {} does not support dimension labels",
                        query_type
                    )));
                }
            }
        }

        queries.range_query_status = if queries.range_queries.iter().all(|q| q.is_none()) {
            QueryStatus::Completed
        } else {
            QueryStatus::InProgress
        };
        Ok(queries)
    }

    /// Open (or fetch the already-open handle of) the label named by
    /// `reference`, validating its stored schemas.
    async fn open_dimension_label(
        &mut self,
        storage: &Arc<dyn Storage>,
        array: &Array,
        reference: &DimensionLabelReference,
        query_type: QueryType,
    ) -> Result<Arc<DimensionLabel>> {
        if let Some(existing) = self.dimension_labels.get(reference.name()) {
            return Ok(Arc::clone(existing));
        }
        let parent_dimension = array
            .schema()?
            .dimension(reference.dimension_index())?
            .clone();
        let label = DimensionLabel::new(
            Arc::clone(storage),
            array.uri(),
            reference.clone(),
            parent_dimension,
        );
        label
            .open(query_type, array.timestamp_start()?, array.timestamp_end()?)
            .await?;
        let label = Arc::new(label);
        self.dimension_labels
            .insert(reference.name().to_string(), Arc::clone(&label));
        Ok(label)
    }

    /// Build one range query per dimension carrying label ranges
    async fn add_range_queries(
        &mut self,
        storage: &Arc<dyn Storage>,
        array: &Array,
        subarray: &Subarray,
        array_buffers: &HashMap<String, QueryBuffer>,
    ) -> Result<()> {
        for dim_idx in 0..subarray.dim_num() {
            if !subarray.has_label_ranges(dim_idx) {
                continue;
            }
            let name = subarray
                .label_name(dim_idx)
                .ok_or_else(|| Error::internal("label ranges set without a label name"))?
                .to_string();
            let reference = array.schema()?.dimension_label_reference(&name)?.clone();

            match reference.order() {
                LabelOrder::Increasing | LabelOrder::Decreasing => {
                    let label = self
                        .open_dimension_label(storage, array, &reference, QueryType::Read)
                        .await?;
                    let label_ranges = subarray
                        .label_ranges(dim_idx)
                        .ok_or_else(|| Error::internal("label ranges vanished"))?;
                    let query = LabelRangeQuery::new(&label, dim_idx, label_ranges)?;
                    self.range_queries[dim_idx] = Some(query);
                    self.range_query_labels.insert(name);
                }
                LabelOrder::Unordered => {
                    let dim_name = array
                        .schema()?
                        .dimension(reference.dimension_index())?
                        .name()
                        .to_string();
                    if !array_buffers.contains_key(&dim_name) {
                        return Err(Error::missing_index_buffer(format!(
                            "resolving ranges on unordered label '{}' requires a buffer \
                             for dimension '{}'",
                            name, dim_name
                        )));
                    }
                    return Err(Error::unsupported_order(format!(
                        "reading ranges from unordered label '{}' is not implemented",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build an ordered read per label buffer not consumed by a range
    /// query
    async fn add_data_queries_for_read(
        &mut self,
        storage: &Arc<dyn Storage>,
        array: &Array,
        subarray: &Subarray,
        label_buffers: &HashMap<String, QueryBuffer>,
    ) -> Result<()> {
        for (name, buffer) in label_buffers {
            let reference = array.schema()?.dimension_label_reference(name)?.clone();
            if self.range_query_labels.contains(name) {
                // The read depends on index ranges the range query has not
                // resolved yet; built in process_range_queries instead.
                self.pending_read_queries.push((
                    name.clone(),
                    reference.dimension_index(),
                    buffer.clone(),
                ));
                continue;
            }
            let label = self
                .open_dimension_label(storage, array, &reference, QueryType::Read)
                .await?;
            let query = LabelDataQuery::ordered_read(
                &label,
                subarray,
                reference.dimension_index(),
                buffer,
            )?;
            self.data_queries.push(query);
        }
        Ok(())
    }

    /// Build a write per label buffer, dispatched on the label order
    async fn add_data_queries_for_write(
        &mut self,
        storage: &Arc<dyn Storage>,
        array: &Array,
        subarray: &Subarray,
        label_buffers: &HashMap<String, QueryBuffer>,
        array_buffers: &HashMap<String, QueryBuffer>,
    ) -> Result<()> {
        for (name, buffer) in label_buffers {
            if self.range_query_labels.contains(name) {
                continue;
            }
            let reference = array.schema()?.dimension_label_reference(name)?.clone();
            let label = self
                .open_dimension_label(storage, array, &reference, QueryType::Write)
                .await?;
            let dim_name = array
                .schema()?
                .dimension(reference.dimension_index())?
                .name()
                .to_string();
            let index_buffer = array_buffers.get(&dim_name);
            let fragment_name = self
                .fragment_name
                .as_deref()
                .ok_or_else(|| Error::internal("write started without a fragment name"))?;

            let query = match reference.order() {
                LabelOrder::Increasing | LabelOrder::Decreasing => {
                    LabelDataQuery::ordered_write(
                        &label,
                        subarray,
                        reference.dimension_index(),
                        buffer,
                        index_buffer,
                        fragment_name,
                    )?
                }
                LabelOrder::Unordered => {
                    LabelDataQuery::unordered_write(&label, buffer, index_buffer, fragment_name)?
                }
            };
            self.data_queries.push(query);
        }
        Ok(())
    }

    /// Run every range query and install the resolved index ranges on the
    /// subarray.
    ///
    /// All range queries must succeed before any result is installed; a
    /// failure leaves the subarray untouched.
    pub async fn process_range_queries(&mut self, subarray: &mut Subarray) -> Result<()> {
        if self.range_queries.iter().all(|q| q.is_none()) {
            self.range_query_status = QueryStatus::Completed;
            return Ok(());
        }

        let results = futures::future::join_all(
            self.range_queries
                .iter_mut()
                .flatten()
                .map(|query| query.process()),
        )
        .await;
        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            self.range_query_status = QueryStatus::Failed;
            return Err(err);
        }

        for query in self.range_queries.iter().flatten() {
            let IndexRanges {
                is_point_ranges,
                ranges,
            } = query.index_ranges();
            subarray
                .add_index_ranges(query.dim_idx(), is_point_ranges, &ranges)
                .map_err(Error::Core)?;
        }

        // Now that the index ranges are installed, build the deferred
        // label-value reads against the updated subarray.
        for (name, dim_idx, buffer) in std::mem::take(&mut self.pending_read_queries) {
            let label = self.dimension_labels.get(&name).ok_or_else(|| {
                Error::internal(format!("label '{}' was never opened", name))
            })?;
            let query = LabelDataQuery::ordered_read(label, subarray, dim_idx, &buffer)?;
            self.data_queries.push(query);
        }

        self.range_query_status = QueryStatus::Completed;
        Ok(())
    }

    /// Run every data query.
    ///
    /// Range queries act as a barrier: data queries may only run once
    /// every resolved index range has been installed on the subarray.
    pub async fn process_data_queries(&mut self) -> Result<()> {
        if self.range_query_status != QueryStatus::Completed {
            return Err(Error::internal(
                "cannot process data queries until range queries complete",
            ));
        }
        let results = futures::future::join_all(
            self.data_queries.iter_mut().map(|query| query.process()),
        )
        .await;
        results.into_iter().collect::<Result<()>>()
    }

    /// Cancel every owned query (idempotent)
    pub fn cancel(&mut self) {
        for query in self.range_queries.iter_mut().flatten() {
            query.cancel();
        }
        for query in &mut self.data_queries {
            query.cancel();
        }
    }

    /// Finalize every owned query
    pub fn finalize(&mut self) -> Result<()> {
        for query in self.range_queries.iter_mut().flatten() {
            query.finalize()?;
        }
        for query in &mut self.data_queries {
            query.finalize()?;
        }
        Ok(())
    }

    /// True when all range queries and data queries have completed
    pub fn completed(&self) -> bool {
        self.range_query_status == QueryStatus::Completed
            && self.data_queries.iter().all(|query| query.completed())
    }

    /// True when a range query exists for this dimension
    pub fn has_label_ranges(&self, dim_idx: usize) -> bool {
        self.range_queries
            .get(dim_idx)
            .map(|q| q.is_some())
            .unwrap_or(false)
    }

    /// The resolved index ranges for a dimension.
    ///
    /// Only valid after [`DimensionLabelQueries::process_range_queries`].
    pub fn index_ranges(&self, dim_idx: usize) -> Result<IndexRanges> {
        self.range_query(dim_idx).map(|q| q.index_ranges())
    }

    /// Status of the range query for a dimension
    pub fn status_range_query(&self, dim_idx: usize) -> Result<QueryStatus> {
        self.range_query(dim_idx).map(|q| q.status())
    }

    /// Aggregate status of the range-query stage
    pub fn range_query_status(&self) -> QueryStatus {
        self.range_query_status
    }

    /// The fragment name shared by this query's paired label writes
    pub fn fragment_name(&self) -> Option<&str> {
        self.fragment_name.as_deref()
    }

    /// Number of data queries owned by the aggregate
    pub fn num_data_queries(&self) -> usize {
        self.data_queries.len()
    }

    /// The opened dimension label behind a label name, if any
    pub fn dimension_label(&self, name: &str) -> Option<&Arc<DimensionLabel>> {
        self.dimension_labels.get(name)
    }

    fn range_query(&self, dim_idx: usize) -> Result<&LabelRangeQuery> {
        self.range_queries
            .get(dim_idx)
            .and_then(|q| q.as_ref())
            .ok_or_else(|| {
                Error::Core(axial_db_core::Error::invalid_argument(format!(
                    "no range query on dimension {}",
                    dim_idx
                )))
            })
    }
}
