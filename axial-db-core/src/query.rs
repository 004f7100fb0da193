//! Generic one-dimensional query engine.
//!
//! A [`Query`] reads or writes one open [`Array`]. The engine covers the
//! surface the dimension-label machinery drives: row-major dense reads and
//! writes, row-major sparse reads over the sorted dimension, and unordered
//! sparse/dense writes. Buffers are bound by field name; sizes are in-out.
//!
//! Reads resolve cells against the fragments visible in the array's opened
//! timestamp window, with later fragments taking precedence for dense
//! cells. Writes produce exactly one fragment, named by the query's
//! fragment name so sibling writes can share it.

use crate::array::Array;
use crate::buffer::QueryBuffer;
use crate::datatype::{compare_scalar_bytes, i128_to_scalar_bytes, scalar_bytes_to_i128};
use crate::error::{Error, Result};
use crate::fragment::{generate_fragment_name, Fragment};
use crate::range::Range;
use crate::status::{Layout, QueryStatus, QueryType};
use crate::subarray::Subarray;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One read or write against an open array
#[derive(Debug)]
pub struct Query {
    array: Arc<Array>,
    query_type: QueryType,
    layout: Layout,
    subarray: Option<Subarray>,
    buffers: BTreeMap<String, QueryBuffer>,
    fragment_name: Option<String>,
    status: QueryStatus,
    has_results: bool,
}

impl Query {
    /// Create a query against an open array.
    ///
    /// The query direction is taken from the query type the array was
    /// opened for.
    pub fn new(array: Arc<Array>) -> Result<Self> {
        let query_type = array.query_type()?;
        Ok(Self {
            array,
            query_type,
            layout: Layout::RowMajor,
            subarray: None,
            buffers: BTreeMap::new(),
            fragment_name: None,
            status: QueryStatus::Uninitialized,
            has_results: false,
        })
    }

    /// The array this query runs against
    pub fn array(&self) -> &Arc<Array> {
        &self.array
    }

    fn check_not_started(&self) -> Result<()> {
        if self.status != QueryStatus::Uninitialized {
            return Err(Error::invalid_argument(
                "cannot reconfigure a query that has started",
            ));
        }
        Ok(())
    }

    /// Set the cell layout
    pub fn set_layout(&mut self, layout: Layout) -> Result<()> {
        self.check_not_started()?;
        if layout == Layout::Unordered && self.query_type == QueryType::Read {
            return Err(Error::invalid_argument(
                "unordered layout is only valid for writes",
            ));
        }
        self.layout = layout;
        Ok(())
    }

    /// Set the subarray restricting the query
    pub fn set_subarray(&mut self, subarray: Subarray) -> Result<()> {
        self.check_not_started()?;
        let schema = self.array.schema()?;
        if subarray.dim_num() != schema.dim_num() {
            return Err(Error::invalid_argument(
                "subarray dimension count does not match the array schema",
            ));
        }
        self.subarray = Some(subarray);
        Ok(())
    }

    /// Bind a data buffer to a dimension or attribute
    pub fn set_data_buffer(&mut self, name: &str, buffer: QueryBuffer) -> Result<()> {
        self.check_not_started()?;
        let schema = self.array.schema()?;
        if !schema.is_field(name) {
            return Err(Error::invalid_argument(format!(
                "no dimension or attribute named '{}'",
                name
            )));
        }
        if let Ok(attribute) = schema.attribute(name) {
            if attribute.cell_val_num().is_var() && !buffer.has_offsets() {
                return Err(Error::invalid_argument(format!(
                    "attribute '{}' is variable-length and requires an offsets buffer",
                    name
                )));
            }
        }
        self.buffers.insert(name.to_string(), buffer);
        Ok(())
    }

    /// Pin the fragment name used by this query's write
    pub fn set_fragment_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.check_not_started()?;
        self.fragment_name = Some(name.into());
        Ok(())
    }

    /// Current status
    pub fn status(&self) -> QueryStatus {
        self.status
    }

    /// True when the last process produced at least one cell
    pub fn has_results(&self) -> bool {
        self.has_results
    }

    /// Mark a non-terminal query as failed (idempotent)
    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = QueryStatus::Failed;
        }
    }

    /// Finalize the query; no further processing is allowed
    pub fn finalize(&mut self) -> Result<()> {
        if self.status == QueryStatus::InProgress {
            return Err(Error::internal("cannot finalize a query mid-process"));
        }
        Ok(())
    }

    /// Validate the query configuration before processing
    pub fn init(&self) -> Result<()> {
        let schema = self.array.schema()?;
        if schema.dim_num() != 1 {
            return Err(Error::invalid_argument(
                "only one-dimensional arrays are supported",
            ));
        }
        if self.buffers.is_empty() {
            return Err(Error::invalid_argument("no buffers set on query"));
        }
        for name in self.buffers.keys() {
            if let Ok(attribute) = schema.attribute(name) {
                if attribute.cell_val_num().is_var() {
                    return Err(Error::unsupported_datatype(
                        "variable-length attributes are not supported",
                    ));
                }
            }
        }
        match self.query_type {
            QueryType::Read | QueryType::Write => Ok(()),
            other => Err(Error::invalid_argument(format!(
                "cannot process a query on an array opened for {}",
                other
            ))),
        }
    }

    /// Run the query to completion (or to buffer exhaustion for reads)
    pub async fn process(&mut self) -> Result<()> {
        match self.status {
            QueryStatus::Uninitialized => {}
            QueryStatus::Failed => {
                return Err(Error::invalid_argument("cannot process a failed query"))
            }
            _ => {
                return Err(Error::invalid_argument(
                    "query has already been processed",
                ))
            }
        }
        if let Err(e) = self.init() {
            self.status = QueryStatus::Failed;
            return Err(e);
        }
        self.status = QueryStatus::InProgress;

        let result = match self.query_type {
            QueryType::Read => self.process_read(),
            QueryType::Write => self.process_write().await,
            _ => unreachable!("rejected by init"),
        };
        match result {
            Ok(status) => {
                self.status = status;
                Ok(())
            }
            Err(e) => {
                self.status = QueryStatus::Failed;
                Err(e)
            }
        }
    }

    /// Alias for [`Query::process`]
    pub async fn submit(&mut self) -> Result<()> {
        self.process().await
    }

    fn resolved_ranges(&self) -> Result<Vec<Range>> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        match &self.subarray {
            None => Ok(vec![dim.domain().clone()]),
            Some(subarray) => {
                let set = subarray.ranges_for_dim(0)?;
                if set.is_default() {
                    Ok(vec![dim.domain().clone()])
                } else {
                    Ok(set.ranges().to_vec())
                }
            }
        }
    }

    fn process_read(&mut self) -> Result<QueryStatus> {
        let schema = self.array.schema()?;
        let ranges = self.resolved_ranges()?;
        let truncated = if schema.dense() {
            self.read_dense(&ranges)?
        } else {
            self.read_sparse(&ranges)?
        };
        Ok(if truncated {
            QueryStatus::Incomplete
        } else {
            QueryStatus::Completed
        })
    }

    /// Width in bytes of one cell of a field
    fn field_width(&self, name: &str) -> Result<usize> {
        let schema = self.array.schema()?;
        if let Some(dim) = schema.dimensions().iter().find(|d| d.name() == name) {
            return Ok(dim.datatype().size());
        }
        Ok(schema.attribute(name)?.datatype().size())
    }

    /// Cells that fit in every bound buffer
    fn cell_capacity(&self) -> Result<usize> {
        let mut capacity = usize::MAX;
        for (name, buffer) in &self.buffers {
            let width = self.field_width(name)?;
            capacity = capacity.min(buffer.capacity() / width);
        }
        Ok(capacity)
    }

    fn read_dense(&mut self, ranges: &[Range]) -> Result<bool> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        let dim_dtype = dim.datatype();
        let fragments = self.array.fragments()?;
        let capacity = self.cell_capacity()?;

        // Dense coverage per fragment: [domain_start, domain_start + count)
        let coverage: Vec<(i128, u64)> = fragments
            .iter()
            .map(|f| {
                let start = f
                    .domain_start()
                    .ok_or_else(|| Error::internal("dense fragment missing domain start"))
                    .and_then(|bytes| scalar_bytes_to_i128(dim_dtype, bytes))?;
                Ok((start, f.cell_count()))
            })
            .collect::<Result<_>>()?;

        let mut out: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        let mut cells = 0usize;
        let mut truncated = false;

        'ranges: for range in ranges {
            let lo = scalar_bytes_to_i128(dim_dtype, range.start_bytes())?;
            let hi = scalar_bytes_to_i128(dim_dtype, range.end_bytes())?;
            for idx in lo..=hi {
                if cells >= capacity {
                    truncated = true;
                    break 'ranges;
                }
                // Latest fragment covering this index wins.
                let (frag_idx, offset) = coverage
                    .iter()
                    .enumerate()
                    .rev()
                    .find(|(_, (start, count))| idx >= *start && idx < start + *count as i128)
                    .map(|(i, (start, _))| (i, (idx - start) as usize))
                    .ok_or_else(|| {
                        Error::invalid_argument(format!(
                            "no data written for index {} of '{}'",
                            idx,
                            self.array.uri()
                        ))
                    })?;
                for (name, _) in &self.buffers {
                    let width = self.field_width(name)?;
                    let bytes = if name == dim.name() {
                        i128_to_scalar_bytes(dim_dtype, idx)
                    } else {
                        let column = fragments[frag_idx].column(name).ok_or_else(|| {
                            Error::internal(format!("fragment missing column '{}'", name))
                        })?;
                        column[offset * width..(offset + 1) * width].to_vec()
                    };
                    out.entry(name.as_str()).or_default().extend_from_slice(&bytes);
                }
                cells += 1;
            }
        }

        for (name, buffer) in &self.buffers {
            buffer.write_bytes(out.get(name.as_str()).map(|v| v.as_slice()).unwrap_or(&[]));
        }
        self.has_results = cells > 0;
        Ok(truncated)
    }

    fn read_sparse(&mut self, ranges: &[Range]) -> Result<bool> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        let dim_dtype = dim.datatype();
        let dim_width = dim_dtype.size();
        let fragments = self.array.fragments()?;
        let capacity = self.cell_capacity()?;

        // Merge all fragment cells and sort them by dimension value.
        let mut cells: Vec<(usize, usize)> = Vec::new();
        for (frag_idx, fragment) in fragments.iter().enumerate() {
            for cell_idx in 0..fragment.cell_count() as usize {
                cells.push((frag_idx, cell_idx));
            }
        }
        cells.sort_by(|a, b| {
            compare_scalar_bytes(
                dim_dtype,
                cell_dim_bytes(&fragments, dim.name(), dim_width, *a),
                cell_dim_bytes(&fragments, dim.name(), dim_width, *b),
            )
        });

        let mut out: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        let mut matched = 0usize;
        let mut truncated = false;

        'ranges: for range in ranges {
            let first = cells.partition_point(|cell| {
                compare_scalar_bytes(
                    dim_dtype,
                    cell_dim_bytes(&fragments, dim.name(), dim_width, *cell),
                    range.start_bytes(),
                ) == Ordering::Less
            });
            for cell in &cells[first..] {
                if compare_scalar_bytes(
                    dim_dtype,
                    cell_dim_bytes(&fragments, dim.name(), dim_width, *cell),
                    range.end_bytes(),
                ) == Ordering::Greater
                {
                    break;
                }
                if matched >= capacity {
                    truncated = true;
                    break 'ranges;
                }
                let (frag_idx, cell_idx) = *cell;
                for (name, _) in &self.buffers {
                    let width = self.field_width(name)?;
                    let column = fragments[frag_idx].column(name).ok_or_else(|| {
                        Error::internal(format!("fragment missing column '{}'", name))
                    })?;
                    out.entry(name.as_str())
                        .or_default()
                        .extend_from_slice(&column[cell_idx * width..(cell_idx + 1) * width]);
                }
                matched += 1;
            }
        }

        for (name, buffer) in &self.buffers {
            buffer.write_bytes(out.get(name.as_str()).map(|v| v.as_slice()).unwrap_or(&[]));
        }
        self.has_results = matched > 0;
        Ok(truncated)
    }

    async fn process_write(&mut self) -> Result<QueryStatus> {
        let schema = self.array.schema()?;
        let fragment = if schema.dense() {
            match self.layout {
                Layout::RowMajor => self.build_dense_fragment()?,
                Layout::Unordered => self.build_dense_unordered_fragment()?,
            }
        } else {
            if self.layout != Layout::Unordered {
                return Err(Error::invalid_argument(
                    "sparse writes must use the unordered layout",
                ));
            }
            self.build_sparse_fragment()?
        };
        self.array.append_fragment(fragment).await?;
        self.has_results = true;
        Ok(QueryStatus::Completed)
    }

    fn new_fragment(&self, cell_count: u64) -> Result<Fragment> {
        let timestamp = self.array.timestamp_end()?;
        let name = match &self.fragment_name {
            Some(name) => name.clone(),
            None => generate_fragment_name(timestamp, self.array.schema()?.write_version()),
        };
        Ok(Fragment::new(name, timestamp, cell_count))
    }

    /// Row-major dense write: attribute cells in index order
    fn build_dense_fragment(&self) -> Result<Fragment> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        let ranges = self.resolved_ranges()?;
        if ranges.len() != 1 {
            return Err(Error::invalid_argument(
                "dense writes cover exactly one contiguous range",
            ));
        }
        let range = &ranges[0];
        let lo = scalar_bytes_to_i128(dim.datatype(), range.start_bytes())?;
        let hi = scalar_bytes_to_i128(dim.datatype(), range.end_bytes())?;
        let cell_count = (hi - lo + 1) as u64;

        let mut fragment = self
            .new_fragment(cell_count)?
            .with_domain_start(range.start_bytes().to_vec());
        for (name, buffer) in &self.buffers {
            let attribute = schema.attribute(name).map_err(|_| {
                Error::invalid_argument(format!(
                    "'{}' is not an attribute; dense row-major writes take attribute buffers only",
                    name
                ))
            })?;
            let width = attribute.datatype().size();
            if buffer.size() != cell_count as usize * width {
                return Err(Error::invalid_argument(format!(
                    "buffer for '{}' holds {} bytes but the write covers {} cells",
                    name,
                    buffer.size(),
                    cell_count
                )));
            }
            fragment = fragment.with_column(name.clone(), buffer.bytes());
        }
        Ok(fragment)
    }

    /// Unordered dense write: explicit dimension buffer, cells sorted and
    /// checked for contiguity before the fragment is built
    fn build_dense_unordered_fragment(&self) -> Result<Fragment> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        let dim_dtype = dim.datatype();
        let dim_buffer = self.buffers.get(dim.name()).ok_or_else(|| {
            Error::invalid_argument(format!(
                "unordered dense write requires a buffer for dimension '{}'",
                dim.name()
            ))
        })?;

        let dim_width = dim_dtype.size();
        let dim_bytes = dim_buffer.bytes();
        let cell_count = dim_bytes.len() / dim_width;
        if cell_count == 0 {
            return Err(Error::invalid_argument("cannot write zero cells"));
        }
        let mut order: Vec<usize> = (0..cell_count).collect();
        order.sort_by(|&a, &b| {
            compare_scalar_bytes(
                dim_dtype,
                &dim_bytes[a * dim_width..(a + 1) * dim_width],
                &dim_bytes[b * dim_width..(b + 1) * dim_width],
            )
        });

        let indices: Vec<i128> = order
            .iter()
            .map(|&i| scalar_bytes_to_i128(dim_dtype, &dim_bytes[i * dim_width..]))
            .collect::<Result<_>>()?;
        for pair in indices.windows(2) {
            if pair[1] != pair[0] + 1 {
                return Err(Error::invalid_argument(
                    "dense writes require contiguous index values",
                ));
            }
        }
        let domain_start = i128_to_scalar_bytes(dim_dtype, indices[0]);

        let mut fragment = self
            .new_fragment(cell_count as u64)?
            .with_domain_start(domain_start);
        for (name, buffer) in &self.buffers {
            if name == dim.name() {
                continue;
            }
            let width = self.field_width(name)?;
            fragment = fragment.with_column(
                name.clone(),
                permute_column(&buffer.bytes(), width, cell_count, &order)?,
            );
        }
        Ok(fragment)
    }

    /// Unordered sparse write: cells sorted by dimension value
    fn build_sparse_fragment(&self) -> Result<Fragment> {
        let schema = self.array.schema()?;
        let dim = schema.dimension(0)?;
        let dim_dtype = dim.datatype();
        let dim_buffer = self.buffers.get(dim.name()).ok_or_else(|| {
            Error::invalid_argument(format!(
                "sparse write requires a buffer for dimension '{}'",
                dim.name()
            ))
        })?;

        let dim_width = dim_dtype.size();
        let dim_bytes = dim_buffer.bytes();
        let cell_count = dim_bytes.len() / dim_width;
        if cell_count == 0 {
            return Err(Error::invalid_argument("cannot write zero cells"));
        }
        let mut order: Vec<usize> = (0..cell_count).collect();
        order.sort_by(|&a, &b| {
            compare_scalar_bytes(
                dim_dtype,
                &dim_bytes[a * dim_width..(a + 1) * dim_width],
                &dim_bytes[b * dim_width..(b + 1) * dim_width],
            )
        });

        let mut fragment = self.new_fragment(cell_count as u64)?;
        for (name, buffer) in &self.buffers {
            let width = self.field_width(name)?;
            fragment = fragment.with_column(
                name.clone(),
                permute_column(&buffer.bytes(), width, cell_count, &order)?,
            );
        }
        Ok(fragment)
    }
}

/// The dimension bytes of one sparse cell, addressed by
/// `(fragment index, cell index)`
fn cell_dim_bytes<'f>(
    fragments: &'f [Fragment],
    dim_name: &str,
    dim_width: usize,
    (frag_idx, cell_idx): (usize, usize),
) -> &'f [u8] {
    let column = fragments[frag_idx]
        .column(dim_name)
        .expect("sparse fragment has its dimension column");
    &column[cell_idx * dim_width..(cell_idx + 1) * dim_width]
}

/// Reorder a column's cells by `order`
fn permute_column(
    bytes: &[u8],
    width: usize,
    cell_count: usize,
    order: &[usize],
) -> Result<Vec<u8>> {
    if bytes.len() != cell_count * width {
        return Err(Error::invalid_argument(format!(
            "buffer holds {} bytes but the write covers {} cells of width {}",
            bytes.len(),
            cell_count,
            width
        )));
    }
    let mut out = Vec::with_capacity(bytes.len());
    for &i in order {
        out.extend_from_slice(&bytes[i * width..(i + 1) * width]);
    }
    Ok(out)
}
