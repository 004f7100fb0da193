//! Array schema types.
//!
//! An [`ArraySchema`] describes one dense or sparse array: its dimensions,
//! attributes, and any dimension-label references declared on it. The
//! label reference carried here is authoritative: when the physical label
//! arrays are opened their stored schemas are validated against it.

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::range::Range;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of values per cell for an attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellValNum {
    /// Fixed number of values per cell
    Fixed(u32),
    /// Variable-length cells
    Var,
}

impl CellValNum {
    /// The common single-value case
    pub fn single() -> Self {
        CellValNum::Fixed(1)
    }

    /// True for variable-length cells
    pub fn is_var(&self) -> bool {
        matches!(self, CellValNum::Var)
    }
}

/// Ordering relationship between a label and its dimension index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelOrder {
    /// Labels are a monotonically non-decreasing function of index
    Increasing,
    /// Labels are a monotonically non-increasing function of index
    Decreasing,
    /// No monotonic relationship
    Unordered,
}

impl LabelOrder {
    /// Get the short name of this order
    pub fn name(&self) -> &'static str {
        match self {
            LabelOrder::Increasing => "increasing",
            LabelOrder::Decreasing => "decreasing",
            LabelOrder::Unordered => "unordered",
        }
    }
}

impl fmt::Display for LabelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for LabelOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "increasing" => Ok(LabelOrder::Increasing),
            "decreasing" => Ok(LabelOrder::Decreasing),
            "unordered" => Ok(LabelOrder::Unordered),
            _ => Err(Error::invalid_argument(format!(
                "unknown label order: {}",
                s
            ))),
        }
    }
}

/// One array dimension: a name, a datatype, and a declared domain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
    datatype: Datatype,
    domain: Range,
}

impl Dimension {
    /// Create a dimension
    pub fn new(name: impl Into<String>, datatype: Datatype, domain: Range) -> Self {
        Self {
            name: name.into(),
            datatype,
            domain,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn domain(&self) -> &Range {
        &self.domain
    }
}

/// One array attribute
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    datatype: Datatype,
    cell_val_num: CellValNum,
}

impl Attribute {
    /// Create a single-value attribute
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: CellValNum::single(),
        }
    }

    /// Override the cell value number
    pub fn with_cell_val_num(mut self, cell_val_num: CellValNum) -> Self {
        self.cell_val_num = cell_val_num;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn cell_val_num(&self) -> CellValNum {
        self.cell_val_num
    }
}

/// Declaration of a dimension label on a parent array schema.
///
/// This is the authoritative description the aggregate validates physical
/// label arrays against when they are opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionLabelReference {
    name: String,
    dimension_index: usize,
    order: LabelOrder,
    label_datatype: Datatype,
    label_domain: Range,
    label_cell_val_num: CellValNum,
    uri: String,
}

impl DimensionLabelReference {
    /// Create a label reference.
    ///
    /// `uri` is relative to the parent array URI.
    pub fn new(
        name: impl Into<String>,
        dimension_index: usize,
        order: LabelOrder,
        label_datatype: Datatype,
        label_domain: Range,
        label_cell_val_num: CellValNum,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dimension_index,
            order,
            label_datatype,
            label_domain,
            label_cell_val_num,
            uri: uri.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the parent dimension this label attaches to
    pub fn dimension_index(&self) -> usize {
        self.dimension_index
    }

    pub fn order(&self) -> LabelOrder {
        self.order
    }

    pub fn label_datatype(&self) -> Datatype {
        self.label_datatype
    }

    pub fn label_domain(&self) -> &Range {
        &self.label_domain
    }

    pub fn label_cell_val_num(&self) -> CellValNum {
        self.label_cell_val_num
    }

    /// Label URI relative to the parent array URI
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Schema of one dense or sparse array
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArraySchema {
    dense: bool,
    dimensions: Vec<Dimension>,
    attributes: Vec<Attribute>,
    dimension_labels: Vec<DimensionLabelReference>,
    /// Set on the backing arrays of a dimension label: the label order
    /// this array was created for
    #[serde(default)]
    label_order: Option<LabelOrder>,
    write_version: u32,
}

/// Current write version stamped into fragment names
pub const WRITE_VERSION: u32 = 4;

impl ArraySchema {
    /// Create a schema
    pub fn new(dense: bool, dimensions: Vec<Dimension>, attributes: Vec<Attribute>) -> Self {
        Self {
            dense,
            dimensions,
            attributes,
            dimension_labels: Vec::new(),
            label_order: None,
            write_version: WRITE_VERSION,
        }
    }

    /// Attach a dimension label reference
    pub fn with_dimension_label(mut self, label: DimensionLabelReference) -> Self {
        self.dimension_labels.push(label);
        self
    }

    /// Record the label order this backing array was created for
    pub fn with_label_order(mut self, order: LabelOrder) -> Self {
        self.label_order = Some(order);
        self
    }

    /// The stored label order, when this is a label backing array
    pub fn label_order(&self) -> Option<LabelOrder> {
        self.label_order
    }

    /// True for dense arrays
    pub fn dense(&self) -> bool {
        self.dense
    }

    /// Number of dimensions
    pub fn dim_num(&self) -> usize {
        self.dimensions.len()
    }

    /// Dimension by index
    pub fn dimension(&self, idx: usize) -> Result<&Dimension> {
        self.dimensions
            .get(idx)
            .ok_or_else(|| Error::invalid_argument(format!("no dimension at index {}", idx)))
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Result<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::not_found(format!("attribute '{}'", name)))
    }

    /// True when `name` is a dimension or attribute of this schema
    pub fn is_field(&self, name: &str) -> bool {
        self.dimensions.iter().any(|d| d.name() == name)
            || self.attributes.iter().any(|a| a.name() == name)
    }

    /// All dimension label references
    pub fn dimension_labels(&self) -> &[DimensionLabelReference] {
        &self.dimension_labels
    }

    /// Dimension label reference by name
    pub fn dimension_label_reference(&self, name: &str) -> Result<&DimensionLabelReference> {
        self.dimension_labels
            .iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| Error::not_found(format!("dimension label '{}'", name)))
    }

    /// Label reference attached to a dimension, if any
    pub fn dimension_label_for_dim(&self, dim_idx: usize) -> Option<&DimensionLabelReference> {
        self.dimension_labels
            .iter()
            .find(|l| l.dimension_index() == dim_idx)
    }

    /// Version stamped into fragment names on write
    pub fn write_version(&self) -> u32 {
        self.write_version
    }
}
