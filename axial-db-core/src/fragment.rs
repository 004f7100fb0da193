//! Fragments: timestamped appends to an array.
//!
//! Every write produces one fragment holding the written cells column by
//! column. Fragment names embed the write timestamp; paired writes to the
//! sibling arrays of a dimension label reuse one generated name so that a
//! later read sees both fragments or neither.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One timestamped append to an array
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fragment {
    name: String,
    timestamp: u64,
    cell_count: u64,
    /// For dense fragments: the first index covered, encoded in the
    /// dimension's datatype. Sparse fragments leave this empty.
    domain_start: Vec<u8>,
    columns: BTreeMap<String, Vec<u8>>,
}

impl Fragment {
    /// Create a fragment
    pub fn new(name: impl Into<String>, timestamp: u64, cell_count: u64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            cell_count,
            domain_start: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    /// Set the first dense index covered by this fragment
    pub fn with_domain_start(mut self, start: Vec<u8>) -> Self {
        self.domain_start = start;
        self
    }

    /// Add one column of cell data
    pub fn with_column(mut self, field: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.columns.insert(field.into(), bytes);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn cell_count(&self) -> u64 {
        self.cell_count
    }

    /// First dense index covered, if set
    pub fn domain_start(&self) -> Option<&[u8]> {
        if self.domain_start.is_empty() {
            None
        } else {
            Some(&self.domain_start)
        }
    }

    /// Column bytes for a field
    pub fn column(&self, field: &str) -> Option<&[u8]> {
        self.columns.get(field).map(|c| c.as_slice())
    }
}

static FRAGMENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fragment name for a write at `timestamp`.
///
/// The name embeds the timestamp twice (start and end of the covered
/// window), a process-unique sequence number, and the write version.
/// Callers pairing writes across sibling arrays must reuse one generated
/// name for both.
pub fn generate_fragment_name(timestamp: u64, write_version: u32) -> String {
    let seq = FRAGMENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("__{}_{}_{:016x}_{}", timestamp, timestamp, seq, write_version)
}

/// Parse the timestamp back out of a generated fragment name
pub fn fragment_name_timestamp(name: &str) -> Option<u64> {
    name.strip_prefix("__")?
        .split('_')
        .next()?
        .parse::<u64>()
        .ok()
}
