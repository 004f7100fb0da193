//! Range sets constrained by a declared domain.
//!
//! A [`RangeSetAndSuperset`] holds the ranges selected on one dimension
//! together with the dimension's declared domain (the superset). A set can
//! be *default* (implicitly the whole domain) or hold explicit ranges;
//! emptiness and default are distinct states.

use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::range::Range;
use std::cmp::Ordering;

/// A list of ranges constrained to a declared domain
#[derive(Clone, Debug)]
pub struct RangeSetAndSuperset {
    datatype: Datatype,
    superset: Range,
    ranges: Vec<Range>,
    is_default: bool,
    is_explicitly_initialized: bool,
}

impl RangeSetAndSuperset {
    /// Create a set that implicitly selects the full domain
    pub fn new_default(datatype: Datatype, superset: Range) -> Self {
        Self {
            datatype,
            superset,
            ranges: Vec::new(),
            is_default: true,
            is_explicitly_initialized: false,
        }
    }

    /// Create an explicitly initialized set with no ranges
    pub fn new_empty(datatype: Datatype, superset: Range) -> Self {
        Self {
            datatype,
            superset,
            ranges: Vec::new(),
            is_default: false,
            is_explicitly_initialized: true,
        }
    }

    /// The declared domain this set is constrained to
    pub fn superset(&self) -> &Range {
        &self.superset
    }

    /// Datatype of the range values
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Add a range after checking containment in the superset.
    ///
    /// `read_only` rejects the mutation outright; used when a set has been
    /// frozen after the owning query started executing.
    pub fn add_range(&mut self, range: Range, read_only: bool) -> Result<()> {
        if read_only {
            return Err(Error::invalid_argument(
                "cannot add range; the range set is read-only",
            ));
        }
        if range.is_empty() {
            return Err(Error::invalid_argument("cannot add an absent range"));
        }
        if range.lower_vs_upper(&range, self.datatype) == Ordering::Greater {
            return Err(Error::invalid_argument(
                "cannot add range; lower bound is greater than upper bound",
            ));
        }
        if !range.is_contained_in(&self.superset, self.datatype) {
            return Err(Error::out_of_domain(
                "range is not contained in the declared domain",
            ));
        }
        self.is_default = false;
        self.is_explicitly_initialized = true;
        self.ranges.push(range);
        Ok(())
    }

    /// The ordered list of explicit ranges
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Number of explicit ranges
    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    /// True when no explicit range has been added
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True when the set implicitly selects the full domain
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// True once a caller has explicitly initialized the set
    pub fn is_explicitly_initialized(&self) -> bool {
        self.is_explicitly_initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint_set() -> RangeSetAndSuperset {
        RangeSetAndSuperset::new_default(Datatype::UInt64, Range::from_scalars(0u64, 400u64))
    }

    #[test]
    fn test_default_state() {
        let set = uint_set();
        assert!(set.is_default());
        assert!(set.is_empty());
        assert!(!set.is_explicitly_initialized());
    }

    #[test]
    fn test_add_range_clears_default() {
        let mut set = uint_set();
        set.add_range(Range::from_scalars(20u64, 30u64), false)
            .unwrap();
        assert!(!set.is_default());
        assert!(set.is_explicitly_initialized());
        assert_eq!(set.num_ranges(), 1);
        assert_eq!(set.ranges()[0].start_as::<u64>(), 20);
        assert_eq!(set.ranges()[0].end_as::<u64>(), 30);
    }

    #[test]
    fn test_out_of_domain_rejected() {
        let mut set = uint_set();
        let result = set.add_range(Range::from_scalars(390u64, 500u64), false);
        assert!(matches!(result, Err(Error::OutOfDomain(_))));
        assert!(set.is_empty());
        assert!(set.is_default());
    }

    #[test]
    fn test_read_only_rejected() {
        let mut set = uint_set();
        let result = set.add_range(Range::from_scalars(1u64, 2u64), true);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut set = uint_set();
        let result = set.add_range(Range::from_scalars(30u64, 20u64), false);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_vs_default_distinct() {
        let set = RangeSetAndSuperset::new_empty(
            Datatype::Int32,
            Range::from_scalars(-100i32, 100i32),
        );
        assert!(set.is_empty());
        assert!(!set.is_default());
        assert!(set.is_explicitly_initialized());
    }
}
