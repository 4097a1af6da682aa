//! Aggregate Statistics
//!
//! The counter block carried by every classifier-set node. Counts are
//! signed so add/remove paths can move them by +1/-1; byte totals treat the
//! recorder's invalid sentinel as zero.

/// Aggregate counters of one classifier-set node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetStats {
    /// Objects present at the baseline snapshot
    pub snapshot_count: i64,
    /// Allocation events within the delta window (non-deduplicated)
    pub delta_allocations: i64,
    /// Deallocation events within the delta window (non-deduplicated)
    pub delta_deallocations: i64,
    /// Bytes allocated within the delta window
    pub allocated_bytes: i64,
    /// Bytes deallocated within the delta window
    pub deallocated_bytes: i64,
    /// Shallow size of live objects
    pub total_shallow_size: i64,
    /// Native size of live objects
    pub total_native_size: i64,
    /// Retained size of live objects
    pub total_retained_size: i64,
    /// Instances carrying call-stack information
    pub instances_with_stack: i64,
    /// Descendant classifier sets (all of them)
    pub classifier_set_count: i64,
    /// Descendant classifier sets surviving the current filter
    pub filtered_set_count: i64,
    /// Instances under nodes matched by the current filter
    pub filter_match_count: i64,
}

impl SetStats {
    /// Live object count: `snapshot + allocations - deallocations`.
    /// This identity holds after every mutation.
    pub fn total_object_count(&self) -> i64 {
        self.snapshot_count + self.delta_allocations - self.delta_deallocations
    }

    /// Whether the node has no instance content at all
    pub fn is_empty(&self) -> bool {
        self.snapshot_count == 0 && self.delta_allocations == 0 && self.delta_deallocations == 0
    }

    /// Fold a surviving child's instance-level counters into this node.
    /// Set-count fields are accumulated separately by the filter pass.
    pub fn accumulate(&mut self, child: &SetStats) {
        self.snapshot_count += child.snapshot_count;
        self.delta_allocations += child.delta_allocations;
        self.delta_deallocations += child.delta_deallocations;
        self.allocated_bytes += child.allocated_bytes;
        self.deallocated_bytes += child.deallocated_bytes;
        self.total_shallow_size += child.total_shallow_size;
        self.total_native_size += child.total_native_size;
        self.total_retained_size += child.total_retained_size;
        self.instances_with_stack += child.instances_with_stack;
    }
}
