//! Dimension labels: the sibling-array pair behind one labelled dimension.
//!
//! A dimension label is backed by two physical arrays:
//!
//! - the *indexed* array: dense, one dimension `index` whose domain equals
//!   the parent dimension's domain, one attribute `label` holding the
//!   label value at each index;
//! - the *labelled* array: sparse, one dimension `label` over the declared
//!   label domain, one attribute `index` holding the parent index at each
//!   label.
//!
//! The labelled array exists solely to make the reverse lookup
//! `label -> index` an ordinary range read on a sorted sparse array.
//!
//! Both arrays open and close together under one query type and one
//! timestamp window, and the stored schemas are validated against the
//! parent schema's [`DimensionLabelReference`] on every open.

use crate::error::{Error, Result};
use axial_db_core::{
    Array, ArraySchema, Attribute, Datatype, Dimension, DimensionLabelReference, LabelOrder,
    QueryType, Storage,
};
use std::sync::Arc;

/// Name of the dimension of the indexed array
pub const INDEX_DIMENSION_NAME: &str = "index";

/// Name of the label attribute of the indexed array
pub const LABEL_ATTRIBUTE_NAME: &str = "label";

/// Name of the dimension of the labelled array
pub const LABEL_DIMENSION_NAME: &str = "label";

/// Name of the index attribute of the labelled array
pub const INDEX_ATTRIBUTE_NAME: &str = "index";

/// The sibling-array pair representing one dimension label
#[derive(Debug)]
pub struct DimensionLabel {
    reference: DimensionLabelReference,
    parent_dimension: Dimension,
    indexed_array: Arc<Array>,
    labelled_array: Arc<Array>,
}

/// Resolve the backing-array URIs of a label rooted at `parent_uri`
fn backing_uris(parent_uri: &str, reference: &DimensionLabelReference) -> (String, String) {
    let root = format!("{}/{}", parent_uri, reference.uri());
    (format!("{}/indexed", root), format!("{}/labelled", root))
}

impl DimensionLabel {
    /// Create the backing arrays for a label on storage.
    ///
    /// Called at parent-array creation time, once per declared label.
    pub async fn create(
        storage: &Arc<dyn Storage>,
        parent_uri: &str,
        reference: &DimensionLabelReference,
        parent_dimension: &Dimension,
    ) -> Result<()> {
        let (indexed_uri, labelled_uri) = backing_uris(parent_uri, reference);

        let indexed_schema = ArraySchema::new(
            true,
            vec![Dimension::new(
                INDEX_DIMENSION_NAME,
                parent_dimension.datatype(),
                parent_dimension.domain().clone(),
            )],
            vec![
                Attribute::new(LABEL_ATTRIBUTE_NAME, reference.label_datatype())
                    .with_cell_val_num(reference.label_cell_val_num()),
            ],
        )
        .with_label_order(reference.order());

        let labelled_schema = ArraySchema::new(
            false,
            vec![Dimension::new(
                LABEL_DIMENSION_NAME,
                reference.label_datatype(),
                reference.label_domain().clone(),
            )],
            vec![Attribute::new(
                INDEX_ATTRIBUTE_NAME,
                parent_dimension.datatype(),
            )],
        )
        .with_label_order(reference.order());

        Array::create(storage, &indexed_uri, &indexed_schema).await?;
        Array::create(storage, &labelled_uri, &labelled_schema).await?;
        Ok(())
    }

    /// Create a handle to the label's backing arrays (not yet opened)
    pub fn new(
        storage: Arc<dyn Storage>,
        parent_uri: &str,
        reference: DimensionLabelReference,
        parent_dimension: Dimension,
    ) -> Self {
        let (indexed_uri, labelled_uri) = backing_uris(parent_uri, &reference);
        Self {
            reference,
            parent_dimension,
            indexed_array: Arc::new(Array::new(Arc::clone(&storage), indexed_uri)),
            labelled_array: Arc::new(Array::new(storage, labelled_uri)),
        }
    }

    /// Open both backing arrays under one query type and timestamp window,
    /// validating the stored schemas against the label reference.
    pub async fn open(
        &self,
        query_type: QueryType,
        timestamp_start: u64,
        timestamp_end: u64,
    ) -> Result<()> {
        tracing::debug!(
            label = %self.reference.name(),
            query_type = %query_type,
            "opening dimension label"
        );
        self.indexed_array
            .open(query_type, timestamp_start, timestamp_end)
            .await?;
        if let Err(e) = self
            .labelled_array
            .open(query_type, timestamp_start, timestamp_end)
            .await
        {
            self.indexed_array.close();
            return Err(e.into());
        }
        if let Err(e) = self.validate_schemas() {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Close both backing arrays
    pub fn close(&self) {
        self.indexed_array.close();
        self.labelled_array.close();
    }

    fn validate_schemas(&self) -> Result<()> {
        let reference = &self.reference;
        let indexed = self.indexed_array.schema().map_err(Error::Core)?;
        let labelled = self.labelled_array.schema().map_err(Error::Core)?;

        let index_dim = indexed.dimension(0).map_err(Error::Core)?;
        if index_dim.datatype() != self.parent_dimension.datatype()
            || index_dim.domain() != self.parent_dimension.domain()
        {
            return Err(Error::label_schema_mismatch(format!(
                "index dimension of label '{}' does not match the parent dimension",
                reference.name()
            )));
        }

        for (side, schema) in [("indexed", &indexed), ("labelled", &labelled)] {
            match schema.label_order() {
                Some(order) if order == reference.order() => {}
                Some(order) => {
                    return Err(Error::label_schema_mismatch(format!(
                        "label '{}' is stored with {} order but declared {}",
                        reference.name(),
                        order,
                        reference.order()
                    )));
                }
                None => {
                    return Err(Error::label_schema_mismatch(format!(
                        "{} array of label '{}' carries no label order",
                        side,
                        reference.name()
                    )));
                }
            }
        }

        let label_attr = indexed.attribute(LABEL_ATTRIBUTE_NAME).map_err(Error::Core)?;
        if label_attr.datatype() != reference.label_datatype() {
            return Err(Error::label_schema_mismatch(format!(
                "label '{}' is stored as {} but declared {}",
                reference.name(),
                label_attr.datatype(),
                reference.label_datatype()
            )));
        }
        if label_attr.cell_val_num() != reference.label_cell_val_num() {
            return Err(Error::label_schema_mismatch(format!(
                "label '{}' cell value number does not match its declaration",
                reference.name()
            )));
        }

        let label_dim = labelled.dimension(0).map_err(Error::Core)?;
        if label_dim.datatype() != reference.label_datatype()
            || label_dim.domain() != reference.label_domain()
        {
            return Err(Error::label_schema_mismatch(format!(
                "label dimension of '{}' does not match the declared label domain",
                reference.name()
            )));
        }

        let index_attr = labelled.attribute(INDEX_ATTRIBUTE_NAME).map_err(Error::Core)?;
        if index_attr.datatype() != self.parent_dimension.datatype() {
            return Err(Error::label_schema_mismatch(format!(
                "index attribute of label '{}' does not match the parent dimension type",
                reference.name()
            )));
        }

        Ok(())
    }

    /// The label reference this handle was resolved from
    pub fn reference(&self) -> &DimensionLabelReference {
        &self.reference
    }

    /// The declared label order
    pub fn label_order(&self) -> LabelOrder {
        self.reference.order()
    }

    /// The query type the label is currently open for
    pub fn query_type(&self) -> Result<QueryType> {
        Ok(self.indexed_array.query_type()?)
    }

    /// The dense index -> label array
    pub fn indexed_array(&self) -> &Arc<Array> {
        &self.indexed_array
    }

    /// The sparse label -> index array
    pub fn labelled_array(&self) -> &Arc<Array> {
        &self.labelled_array
    }

    /// Dimension of the indexed array
    pub fn index_dimension(&self) -> Result<Dimension> {
        Ok(self.indexed_array.schema()?.dimension(0)?.clone())
    }

    /// Dimension of the labelled array
    pub fn label_dimension(&self) -> Result<Dimension> {
        Ok(self.labelled_array.schema()?.dimension(0)?.clone())
    }

    /// Label attribute of the indexed array
    pub fn label_attribute(&self) -> Result<Attribute> {
        Ok(self
            .indexed_array
            .schema()?
            .attribute(LABEL_ATTRIBUTE_NAME)?
            .clone())
    }

    /// Index attribute of the labelled array
    pub fn index_attribute(&self) -> Result<Attribute> {
        Ok(self
            .labelled_array
            .schema()?
            .attribute(INDEX_ATTRIBUTE_NAME)?
            .clone())
    }

    /// Datatype of the label values
    pub fn label_datatype(&self) -> Datatype {
        self.reference.label_datatype()
    }

    /// Datatype of the parent index values
    pub fn index_datatype(&self) -> Datatype {
        self.parent_dimension.datatype()
    }
}
