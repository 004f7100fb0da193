//! End-to-end dimension-label query scenarios.
//!
//! Each test builds a parent array with a declared dimension label on
//! in-memory storage, writes label data through the query aggregate, and
//! drives reads the way the parent query would: resolve label ranges onto
//! the subarray first, then run the data queries.

use axial_db_core::{
    Array, ArraySchema, Attribute, CellValNum, Datatype, Dimension, DimensionLabelReference,
    LabelOrder, MemoryStorage, Query, QueryBuffer, QueryStatus, QueryType, Range, Scalar,
    Storage, Subarray,
};
use axial_db_label::{DimensionLabel, DimensionLabelQueries, Error};
use std::collections::HashMap;
use std::sync::Arc;

const PARENT_URI: &str = "arrays/parent";
const LABEL_NAME: &str = "height";

/// Parent schema: dense `d0` over `index_domain` with one f64 attribute
/// and one label declared over `label_domain`.
fn parent_schema(
    index_domain: (u64, u64),
    order: LabelOrder,
    label_datatype: Datatype,
    label_domain: Range,
) -> ArraySchema {
    ArraySchema::new(
        true,
        vec![Dimension::new(
            "d0",
            Datatype::UInt64,
            Range::from_scalars(index_domain.0, index_domain.1),
        )],
        vec![Attribute::new("a1", Datatype::Float64)],
    )
    .with_dimension_label(DimensionLabelReference::new(
        LABEL_NAME,
        0,
        order,
        label_datatype,
        label_domain,
        CellValNum::single(),
        "__labels/l0",
    ))
}

fn storage() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new())
}

/// Create the parent array and its label's backing arrays on storage
async fn create_parent(storage: &Arc<dyn Storage>, schema: &ArraySchema) {
    Array::create(storage, PARENT_URI, schema).await.unwrap();
    let reference = schema.dimension_label_reference(LABEL_NAME).unwrap();
    DimensionLabel::create(storage, PARENT_URI, reference, schema.dimension(0).unwrap())
        .await
        .unwrap();
}

/// Open a fresh parent handle
async fn open_parent(
    storage: &Arc<dyn Storage>,
    query_type: QueryType,
    timestamp_end: u64,
) -> Arc<Array> {
    let parent = Arc::new(Array::new(Arc::clone(storage), PARENT_URI));
    parent.open(query_type, 0, timestamp_end).await.unwrap();
    parent
}

/// Write label values through the aggregate's ordered-write path
async fn write_label<T: Scalar>(storage: &Arc<dyn Storage>, labels: &[T], timestamp: u64) {
    let parent = open_parent(storage, QueryType::Write, timestamp).await;
    let subarray = Subarray::new(parent.schema().unwrap());
    let label_buffers =
        HashMap::from([(LABEL_NAME.to_string(), QueryBuffer::from_vec(labels))]);
    let mut queries = DimensionLabelQueries::new(
        Arc::clone(storage),
        &parent,
        &subarray,
        &label_buffers,
        &HashMap::new(),
        None,
    )
    .await
    .unwrap();
    queries.process_data_queries().await.unwrap();
    assert!(queries.completed());
    queries.finalize().unwrap();
    parent.close();
}

/// Open the parent for reading and resolve one label range, returning the
/// parent handle, the aggregate, and the updated subarray.
async fn resolve_label_range<T: Scalar>(
    storage: &Arc<dyn Storage>,
    range: (T, T),
    label_buffer: Option<QueryBuffer>,
) -> (Arc<Array>, DimensionLabelQueries, Subarray) {
    let parent = open_parent(storage, QueryType::Read, u64::MAX).await;

    let mut subarray = Subarray::new(parent.schema().unwrap());
    subarray
        .add_label_range(0, LABEL_NAME, Range::from_scalars(range.0, range.1))
        .unwrap();

    let label_buffers = match label_buffer {
        Some(buffer) => HashMap::from([(LABEL_NAME.to_string(), buffer)]),
        None => HashMap::new(),
    };
    let mut queries = DimensionLabelQueries::new(
        Arc::clone(storage),
        &parent,
        &subarray,
        &label_buffers,
        &HashMap::new(),
        None,
    )
    .await
    .unwrap();
    assert!(queries.has_label_ranges(0));
    queries.process_range_queries(&mut subarray).await.unwrap();
    // Range queries complete before any data query may run.
    assert_eq!(
        queries.status_range_query(0).unwrap(),
        QueryStatus::Completed
    );
    (parent, queries, subarray)
}

fn resolved_bounds(subarray: &Subarray) -> Vec<(u64, u64)> {
    subarray
        .ranges_for_dim(0)
        .unwrap()
        .ranges()
        .iter()
        .map(|r| (r.start_as::<u64>(), r.end_as::<u64>()))
        .collect()
}

#[tokio::test]
async fn exact_label_range_resolves_increasing() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[10u64, 20, 30, 40], 5).await;

    let (_parent, _queries, subarray) =
        resolve_label_range(&storage, (20u64, 30u64), None).await;
    assert_eq!(resolved_bounds(&subarray), vec![(2, 3)]);
}

#[tokio::test]
async fn inexact_label_range_corrects_overshoot() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[10u64, 20, 30, 40], 5).await;

    // Lower probe lands on 20 (>= 12); upper probe lands on 40 (> 35) and
    // is stepped back to index 3.
    let (_parent, _queries, subarray) =
        resolve_label_range(&storage, (12u64, 35u64), None).await;
    assert_eq!(resolved_bounds(&subarray), vec![(2, 3)]);
}

#[tokio::test]
async fn exact_singleton_resolves_decreasing() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Decreasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[40u64, 30, 20, 10], 5).await;

    let (_parent, _queries, subarray) =
        resolve_label_range(&storage, (20u64, 20u64), None).await;
    assert_eq!(resolved_bounds(&subarray), vec![(3, 3)]);
}

#[tokio::test]
async fn label_range_between_stored_labels_resolves_empty() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[10u64, 20, 30, 40], 5).await;

    let (parent, queries, subarray) =
        resolve_label_range(&storage, (12u64, 18u64), None).await;
    // Both probes land on 20; the corrected range is empty.
    assert_eq!(resolved_bounds(&subarray), vec![]);
    assert!(!subarray.is_default(0).unwrap());
    assert!(queries.index_ranges(0).unwrap().ranges.is_empty());

    // The parent query sees an explicitly empty selection.
    let out = QueryBuffer::for_values::<f64>(4);
    let mut read = Query::new(Arc::clone(&parent)).unwrap();
    read.set_subarray(subarray).unwrap();
    read.set_data_buffer("a1", out.clone()).unwrap();
    read.process().await.unwrap();
    assert!(!read.has_results());
    assert_eq!(out.size(), 0);
}

#[tokio::test]
async fn range_containment_and_minimality_spot_checks() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    let labels = [10u64, 20, 30, 40];
    write_label(&storage, &labels, 5).await;

    for (lo, hi, expected) in [
        (10u64, 40u64, Some((1u64, 4u64))),
        (15, 25, Some((2, 2))),
        (10, 10, Some((1, 1))),
        (31, 40, Some((4, 4))),
        (31, 39, None),
    ] {
        let (_parent, _queries, subarray) =
            resolve_label_range(&storage, (lo, hi), None).await;
        let bounds = resolved_bounds(&subarray);
        match expected {
            Some((i0, i1)) => {
                assert_eq!(bounds, vec![(i0, i1)], "range [{lo}, {hi}]");
                // Containment: every selected label is inside the range.
                for k in i0..=i1 {
                    let label = labels[(k - 1) as usize];
                    assert!(label >= lo && label <= hi);
                }
                // Minimality: the neighbors fall outside the range.
                if i0 > 1 {
                    assert!(labels[(i0 - 2) as usize] < lo);
                }
                if (i1 as usize) < labels.len() {
                    assert!(labels[i1 as usize] > hi);
                }
            }
            None => assert_eq!(bounds, vec![], "range [{lo}, {hi}]"),
        }
    }
}

#[tokio::test]
async fn ordered_label_is_write_once() {
    let storage = storage();
    let schema = parent_schema(
        (1, 16),
        LabelOrder::Increasing,
        Datatype::Int64,
        Range::from_scalars(-16i64, 16i64),
    );
    create_parent(&storage, &schema).await;

    // Labels -15, -13, ..., 15.
    let labels: Vec<i64> = (-15..=15).step_by(2).collect();
    assert_eq!(labels.len(), 16);
    write_label(&storage, &labels, 5).await;

    // A second ordered write must be rejected at construction.
    let parent = open_parent(&storage, QueryType::Write, 6).await;
    let subarray = Subarray::new(parent.schema().unwrap());
    let label_buffers =
        HashMap::from([(LABEL_NAME.to_string(), QueryBuffer::from_vec(&labels))]);
    let result = DimensionLabelQueries::new(
        Arc::clone(&storage),
        &parent,
        &subarray,
        &label_buffers,
        &HashMap::new(),
        None,
    )
    .await;
    assert!(matches!(result, Err(Error::SingleFragmentLabel(_))));
}

#[tokio::test]
async fn paired_writes_share_fragment_name_and_timestamp() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;

    let parent = open_parent(&storage, QueryType::Write, 7).await;
    let subarray = Subarray::new(parent.schema().unwrap());
    let label_buffers = HashMap::from([(
        LABEL_NAME.to_string(),
        QueryBuffer::from_vec(&[10u64, 20, 30, 40]),
    )]);
    let mut queries = DimensionLabelQueries::new(
        Arc::clone(&storage),
        &parent,
        &subarray,
        &label_buffers,
        &HashMap::new(),
        None,
    )
    .await
    .unwrap();
    queries.process_data_queries().await.unwrap();

    let label = queries.dimension_label(LABEL_NAME).unwrap();
    let indexed = label.indexed_array().fragments().unwrap();
    let labelled = label.labelled_array().fragments().unwrap();
    assert_eq!(indexed.len(), 1);
    assert_eq!(labelled.len(), 1);
    assert_eq!(indexed[0].name(), labelled[0].name());
    assert_eq!(indexed[0].timestamp(), labelled[0].timestamp());
    assert_eq!(Some(indexed[0].name()), queries.fragment_name());
}

#[tokio::test]
async fn read_by_external_label_fills_attribute_and_label_buffers() {
    let storage = storage();
    let schema = parent_schema(
        (1, 16),
        LabelOrder::Increasing,
        Datatype::Int64,
        Range::from_scalars(-16i64, -1i64),
    );
    create_parent(&storage, &schema).await;

    // Parent attribute a1[i] = 0.1 * i for i in [1, 16].
    let parent = open_parent(&storage, QueryType::Write, 5).await;
    let a1: Vec<f64> = (1..=16).map(|i| i as f64 * 0.1).collect();
    let mut attr_write = Query::new(Arc::clone(&parent)).unwrap();
    attr_write
        .set_data_buffer("a1", QueryBuffer::from_vec(&a1))
        .unwrap();
    attr_write.process().await.unwrap();
    parent.close();

    // Label values: label[i] = i - 17, covering [-16, -1].
    let labels: Vec<i64> = (1..=16).map(|i| i - 17).collect();
    write_label(&storage, &labels, 6).await;

    // Read with label range [-8, -5] and a 4-cell label buffer.
    let label_out = QueryBuffer::for_values::<i64>(4);
    let (parent, mut queries, subarray) =
        resolve_label_range(&storage, (-8i64, -5i64), Some(label_out.clone())).await;
    assert_eq!(resolved_bounds(&subarray), vec![(9, 12)]);

    queries.process_data_queries().await.unwrap();
    assert!(queries.completed());
    assert_eq!(label_out.to_vec::<i64>().unwrap(), vec![-8, -7, -6, -5]);

    // The parent attribute read over the resolved subarray.
    let attr_out = QueryBuffer::for_values::<f64>(4);
    let mut read = Query::new(Arc::clone(&parent)).unwrap();
    read.set_subarray(subarray).unwrap();
    read.set_data_buffer("a1", attr_out.clone()).unwrap();
    read.process().await.unwrap();
    let expected: Vec<f64> = (9..=12).map(|i| i as f64 * 0.1).collect();
    assert_eq!(attr_out.to_vec::<f64>().unwrap(), expected);
}

#[tokio::test]
async fn labels_rejected_for_delete_update_and_modify() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[10u64, 20, 30, 40], 5).await;

    for query_type in [
        QueryType::Delete,
        QueryType::Update,
        QueryType::ModifyExclusive,
    ] {
        let parent = open_parent(&storage, query_type, u64::MAX).await;

        // With label buffers present the aggregate refuses.
        let subarray = Subarray::new(parent.schema().unwrap());
        let label_buffers = HashMap::from([(
            LABEL_NAME.to_string(),
            QueryBuffer::for_values::<u64>(4),
        )]);
        let result = DimensionLabelQueries::new(
            Arc::clone(&storage),
            &parent,
            &subarray,
            &label_buffers,
            &HashMap::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::UnsupportedForQueryType(_))));

        // Without labels the aggregate is an empty no-op.
        let queries = DimensionLabelQueries::new(
            Arc::clone(&storage),
            &parent,
            &subarray,
            &HashMap::new(),
            &HashMap::new(),
            None,
        )
        .await
        .unwrap();
        assert!(queries.completed());
        assert_eq!(queries.num_data_queries(), 0);
        parent.close();
    }
}

#[tokio::test]
async fn unordered_label_ranges_are_unimplemented() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Unordered,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;

    let parent = open_parent(&storage, QueryType::Read, u64::MAX).await;
    let mut subarray = Subarray::new(parent.schema().unwrap());
    subarray
        .add_label_range(0, LABEL_NAME, Range::from_scalars(20u64, 30u64))
        .unwrap();

    // Without the dimension buffer the failure is the missing buffer.
    let result = DimensionLabelQueries::new(
        Arc::clone(&storage),
        &parent,
        &subarray,
        &HashMap::new(),
        &HashMap::new(),
        None,
    )
    .await;
    assert!(matches!(result, Err(Error::MissingIndexBuffer(_))));

    // With it, the unordered read path is explicitly unimplemented.
    let array_buffers =
        HashMap::from([("d0".to_string(), QueryBuffer::for_values::<u64>(4))]);
    let result = DimensionLabelQueries::new(
        Arc::clone(&storage),
        &parent,
        &subarray,
        &HashMap::new(),
        &array_buffers,
        None,
    )
    .await;
    assert!(matches!(result, Err(Error::UnsupportedOrder(_))));
}

#[tokio::test]
async fn cancel_is_idempotent_on_the_aggregate() {
    let storage = storage();
    let schema = parent_schema(
        (1, 4),
        LabelOrder::Increasing,
        Datatype::UInt64,
        Range::from_scalars(0u64, 400u64),
    );
    create_parent(&storage, &schema).await;
    write_label(&storage, &[10u64, 20, 30, 40], 5).await;

    let parent = open_parent(&storage, QueryType::Read, u64::MAX).await;
    let mut subarray = Subarray::new(parent.schema().unwrap());
    subarray
        .add_label_range(0, LABEL_NAME, Range::from_scalars(20u64, 30u64))
        .unwrap();
    let mut queries = DimensionLabelQueries::new(
        Arc::clone(&storage),
        &parent,
        &subarray,
        &HashMap::new(),
        &HashMap::new(),
        None,
    )
    .await
    .unwrap();

    queries.cancel();
    assert_eq!(queries.status_range_query(0).unwrap(), QueryStatus::Failed);
    queries.cancel();
    assert_eq!(queries.status_range_query(0).unwrap(), QueryStatus::Failed);
    assert!(!queries.completed());

    // A cancelled range query must not install results.
    assert!(queries.process_range_queries(&mut subarray).await.is_err());
    assert!(subarray.is_default(0).unwrap());
}
