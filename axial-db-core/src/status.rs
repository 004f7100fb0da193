//! Query status and query type enumerations.

use crate::error::{Error, Result};
use std::fmt;

/// Lifecycle status of a query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStatus {
    /// Constructed but not yet initialized
    Uninitialized,
    /// Submitted and running
    InProgress,
    /// Ran out of buffer space; can be resumed
    Incomplete,
    /// Finished successfully
    Completed,
    /// Failed or cancelled
    Failed,
}

impl QueryStatus {
    /// True for Completed and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Completed | QueryStatus::Failed)
    }

    /// Get the short name of this status
    pub fn name(&self) -> &'static str {
        match self {
            QueryStatus::Uninitialized => "uninitialized",
            QueryStatus::InProgress => "in-progress",
            QueryStatus::Incomplete => "incomplete",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The operation a query (or an array open) is for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    Read,
    Write,
    Delete,
    Update,
    ModifyExclusive,
}

impl QueryType {
    /// Get the short name of this query type
    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Read => "read",
            QueryType::Write => "write",
            QueryType::Delete => "delete",
            QueryType::Update => "update",
            QueryType::ModifyExclusive => "modify-exclusive",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(QueryType::Read),
            "write" => Ok(QueryType::Write),
            "delete" => Ok(QueryType::Delete),
            "update" => Ok(QueryType::Update),
            "modify-exclusive" => Ok(QueryType::ModifyExclusive),
            _ => Err(Error::UnknownQueryType(s.to_string())),
        }
    }
}

/// Cell layout for reads and writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Cells ordered by dimension value
    RowMajor,
    /// Cells in caller order; valid for sparse writes only
    Unordered,
}
