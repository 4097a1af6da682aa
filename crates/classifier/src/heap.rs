//! Per-Heap Set
//!
//! [`HeapSet`] wraps one [`ClassifierTree`] together with the heap's active
//! grouping and filter. Regrouping drains the instance streams out of the
//! old tree and re-routes them under the new grouping; filter selection
//! runs the incremental filter pass only when it could change anything.

use tracing::{debug, info};

use heaplens_capture::{Capture, HeapId, InstanceId};

use crate::filter::Filter;
use crate::grouping::ClassGrouping;
use crate::stats::SetStats;
use crate::tree::{ClassifierTree, DeltaRoles, Node, NodeId, ROOT};

/// One heap's classifier tree plus its live view state
#[derive(Debug, Clone)]
pub struct HeapSet {
    heap: HeapId,
    name: String,
    tree: ClassifierTree,
    filter: Filter,
}

impl HeapSet {
    /// Create an empty heap set with the default grouping
    pub fn new(heap: HeapId, name: &str) -> Self {
        Self::with_grouping(heap, name, ClassGrouping::default())
    }

    /// Create an empty heap set with an explicit grouping
    pub fn with_grouping(heap: HeapId, name: &str, grouping: ClassGrouping) -> Self {
        Self {
            heap,
            name: name.to_string(),
            tree: ClassifierTree::new(heap, name, grouping),
            filter: Filter::empty(),
        }
    }

    /// The heap this set covers
    pub fn heap_id(&self) -> HeapId {
        self.heap
    }

    /// Display name of the heap
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The active grouping mode
    pub fn grouping(&self) -> ClassGrouping {
        self.tree.grouping()
    }

    /// The active filter
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// The underlying tree, for read-only traversal
    pub fn tree(&self) -> &ClassifierTree {
        &self.tree
    }

    /// Mutable access to the tree for instance accounting
    pub fn tree_mut(&mut self) -> &mut ClassifierTree {
        &mut self.tree
    }

    /// Root-level aggregate counters
    pub fn stats(&self) -> &SetStats {
        self.tree.node(ROOT).stats()
    }

    /// Borrow a node of the tree
    pub fn node(&self, id: NodeId) -> &Node {
        self.tree.node(id)
    }

    /// Currently-visible children of a node
    pub fn child_sets(&mut self, capture: &Capture, id: NodeId) -> Vec<NodeId> {
        self.tree.child_sets(capture, id)
    }

    /// Switch the grouping mode, rebuilding the tree from its own instance
    /// streams. A no-op when the grouping is unchanged.
    pub fn set_class_grouping(&mut self, capture: &Capture, grouping: ClassGrouping) {
        if self.tree.grouping() == grouping {
            return;
        }
        info!(heap = %self.name, %grouping, "switching class grouping");

        let snapshot = self.tree.snapshot_instances(ROOT);
        let delta = self.tree.delta_instances(ROOT);
        self.tree.clear_classifier_sets();
        self.tree.set_grouping(grouping);

        for instance in snapshot {
            self.tree.add_snapshot_instance(capture, ROOT, instance);
        }
        for (instance, roles) in delta {
            self.route_delta(capture, instance, roles);
        }

        if !self.filter.is_empty() {
            self.tree.apply_filter(capture, &self.filter, true);
        }
    }

    fn route_delta(&mut self, capture: &Capture, instance: InstanceId, roles: DeltaRoles) {
        if roles.allocated {
            self.tree.add_delta_instance(capture, ROOT, instance);
        }
        if roles.freed {
            self.tree.free_delta_instance(capture, ROOT, instance);
        }
    }

    /// Select a new filter, running the filter pass over the tree. When the
    /// old and new filters are both empty nothing can change, so the pass
    /// is skipped entirely.
    pub fn select_filter(&mut self, capture: &Capture, filter: Filter) {
        if self.filter.is_empty() && filter.is_empty() {
            return;
        }
        let changed = self.filter != filter;
        debug!(heap = %self.name, text = filter.text(), changed, "selecting filter");
        self.filter = filter;
        self.tree.apply_filter(capture, &self.filter, changed);
    }

    /// Re-run the current filter over content that changed since the last
    /// pass. Used after instance accounting while a filter is active.
    pub fn refresh_filter(&mut self, capture: &Capture) {
        if self.filter.is_empty() {
            return;
        }
        self.tree.apply_filter(capture, &self.filter, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heaplens_capture::Instance;

    fn populated() -> (Capture, HeapSet) {
        let mut capture = Capture::new();
        let mut heap_set = HeapSet::new(HeapId(0), "app heap");
        for name in ["com.x.Foo", "com.x.Foo", "com.y.Bar"] {
            let class = capture.classes_mut().register(name);
            let mut instance = Instance::new(class, 0);
            instance.shallow_size = 8;
            let id = capture.add_instance(instance);
            heap_set.tree_mut().add_snapshot_instance(&capture, ROOT, id);
        }
        (capture, heap_set)
    }

    #[test]
    fn test_regroup_preserves_totals() {
        let (capture, mut heap_set) = populated();
        let before = *heap_set.stats();
        assert_eq!(before.total_object_count(), 3);

        heap_set.set_class_grouping(&capture, ClassGrouping::ByPackage);
        let after = *heap_set.stats();
        assert_eq!(after.snapshot_count, before.snapshot_count);
        assert_eq!(after.total_shallow_size, before.total_shallow_size);
        assert_eq!(after.total_object_count(), 3);

        // The new arrangement is package-shaped.
        let top = heap_set.child_sets(&capture, ROOT);
        assert_eq!(top.len(), 1);
        assert_eq!(heap_set.node(top[0]).name(), "com");
    }

    #[test]
    fn test_regroup_preserves_delta_roles() {
        let mut capture = Capture::new();
        let mut heap_set = HeapSet::new(HeapId(0), "app heap");
        let class = capture.classes_mut().register("com.x.Foo");
        let mut allocated = Instance::new(class, 0);
        allocated.shallow_size = 4;
        let allocated = capture.add_instance(allocated);
        let mut freed = Instance::new(class, 0);
        freed.shallow_size = 4;
        let freed = capture.add_instance(freed);

        heap_set.tree_mut().add_delta_instance(&capture, ROOT, allocated);
        heap_set.tree_mut().free_delta_instance(&capture, ROOT, freed);

        heap_set.set_class_grouping(&capture, ClassGrouping::ByPackage);
        let stats = *heap_set.stats();
        assert_eq!(stats.delta_allocations, 1);
        assert_eq!(stats.delta_deallocations, 1);
        assert_eq!(stats.allocated_bytes, 4);
        assert_eq!(stats.deallocated_bytes, 4);
        assert_eq!(stats.total_object_count(), 0);
    }

    #[test]
    fn test_regroup_same_grouping_is_noop() {
        let (capture, mut heap_set) = populated();
        heap_set.child_sets(&capture, ROOT);
        let nodes_before = heap_set.tree().node_count();
        heap_set.set_class_grouping(&capture, ClassGrouping::ByClass);
        assert_eq!(heap_set.tree().node_count(), nodes_before);
    }

    #[test]
    fn test_select_filter_empty_to_empty_is_noop() {
        let (capture, mut heap_set) = populated();
        heap_set.select_filter(&capture, Filter::empty());
        // The pass never ran: the tree was not even partitioned.
        assert_eq!(heap_set.tree().node_count(), 1);
    }

    #[test]
    fn test_select_filter_restricts_and_clears() {
        let (capture, mut heap_set) = populated();
        heap_set.select_filter(&capture, Filter::substring("Foo"));
        assert_eq!(heap_set.stats().total_object_count(), 2);

        heap_set.select_filter(&capture, Filter::empty());
        assert_eq!(heap_set.stats().total_object_count(), 3);
    }

    #[test]
    fn test_regroup_reapplies_active_filter() {
        let (capture, mut heap_set) = populated();
        heap_set.select_filter(&capture, Filter::substring("Foo"));
        heap_set.set_class_grouping(&capture, ClassGrouping::ByPackage);
        // Filter survives the regroup: only the two Foo instances count.
        assert_eq!(heap_set.stats().total_object_count(), 2);
    }
}
