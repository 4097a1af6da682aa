//! Classifier-Set Tree
//!
//! The tree of classifier sets for one heap, stored as an arena of nodes
//! addressed by [`NodeId`]. Each node holds the instances assigned directly
//! to it (split into the baseline snapshot and the incremental delta),
//! aggregate statistics, and a lazily-created [`Classifier`] for its
//! children: subtrees are only partitioned when something walks into them.
//!
//! All operations are synchronous, single-threaded tree traversals; callers
//! feeding the tree from a live source must serialize access externally.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use heaplens_capture::{Capture, HeapId, InstanceId};

use crate::classify::{BucketKey, Classifier, ClassifierRule};
use crate::filter::Filter;
use crate::grouping::ClassGrouping;
use crate::stats::SetStats;

/// Stable handle to a node in the tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// The root (heap) node of every tree
pub const ROOT: NodeId = NodeId(0);

/// What a node represents within its grouping family
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The heap root
    Heap {
        /// Heap this tree belongs to
        heap: HeapId,
    },
    /// A package segment at the given depth
    Package {
        /// Segment index, 0 = outermost
        depth: usize,
    },
    /// A class leaf
    Class {
        /// The class
        class: heaplens_capture::ClassId,
    },
    /// A call-stack frame at the given depth
    Frame {
        /// Frame index, 0 = innermost
        depth: usize,
        /// The frame
        frame: heaplens_capture::FrameId,
    },
    /// An allocating thread
    Thread {
        /// The thread
        thread: heaplens_capture::ThreadId,
    },
    /// A native allocation function
    NativeFunction {
        /// Raw function symbol (the display name may be decorated)
        function: String,
    },
}

/// How an instance participates in the delta window. Roles are remembered so
/// repartitioning can redistribute allocation and deallocation events
/// without re-deriving them from timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRoles {
    /// Counted as an allocation within the window
    pub allocated: bool,
    /// Counted as a deallocation within the window
    pub freed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Add,
    Remove,
}

impl SetOp {
    fn sign(self) -> i64 {
        match self {
            SetOp::Add => 1,
            SetOp::Remove => -1,
        }
    }
}

/// One classifier set: a tree node aggregating instances and owning a
/// classifier for its children
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    classifier: Option<Classifier>,
    snapshot: IndexSet<InstanceId>,
    delta: IndexMap<InstanceId, DeltaRoles>,
    stats: SetStats,
    is_filtered: bool,
    is_matched: bool,
    needs_refiltering: bool,
    match_memo: IndexMap<u64, i64>,
}

impl Node {
    fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            kind,
            classifier: None,
            snapshot: IndexSet::new(),
            delta: IndexMap::new(),
            stats: SetStats::default(),
            is_filtered: false,
            is_matched: false,
            needs_refiltering: false,
            match_memo: IndexMap::new(),
        }
    }

    /// Display label of the node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the node represents
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Aggregate counters
    pub fn stats(&self) -> &SetStats {
        &self.stats
    }

    /// Whether the node contributes nothing visible under the active filter
    pub fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    /// Whether the node's own name matched the active filter
    pub fn is_matched(&self) -> bool {
        self.is_matched
    }

    /// Dirty bit: content changed since the last filter pass
    pub fn needs_refiltering(&self) -> bool {
        self.needs_refiltering
    }

    fn contains(&self, instance: InstanceId) -> bool {
        self.snapshot.contains(&instance) || self.delta.contains_key(&instance)
    }

    fn mark_dirty(&mut self) {
        self.needs_refiltering = true;
        self.match_memo.clear();
    }
}

/// The classifier-set tree of one heap
#[derive(Debug, Clone)]
pub struct ClassifierTree {
    nodes: Vec<Node>,
    grouping: ClassGrouping,
    max_stack_depth: usize,
    memo_capacity: usize,
}

impl ClassifierTree {
    /// Create a tree rooted at a heap node
    pub fn new(heap: HeapId, heap_name: &str, grouping: ClassGrouping) -> Self {
        Self {
            nodes: vec![Node::new(heap_name.to_string(), NodeKind::Heap { heap })],
            grouping,
            max_stack_depth: 64,
            memo_capacity: 16,
        }
    }

    /// Bound the call-stack decomposition depth and the per-node match memo
    pub fn set_limits(&mut self, max_stack_depth: usize, memo_capacity: usize) {
        self.max_stack_depth = max_stack_depth;
        self.memo_capacity = memo_capacity;
    }

    /// The active grouping mode
    pub fn grouping(&self) -> ClassGrouping {
        self.grouping
    }

    /// Switch the grouping mode. Only meaningful together with
    /// [`ClassifierTree::clear_classifier_sets`]; `HeapSet` drives both.
    pub fn set_grouping(&mut self, grouping: ClassGrouping) {
        self.grouping = grouping;
    }

    /// Borrow a node
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Number of nodes currently materialized (including the root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The grouping rule this node applies to its children
    fn sub_classifier_rule(&self, id: NodeId) -> ClassifierRule {
        match &self.node(id).kind {
            NodeKind::Heap { .. } => match self.grouping {
                ClassGrouping::ByClass => ClassifierRule::ByClass,
                ClassGrouping::ByPackage => ClassifierRule::ByPackage { depth: 0 },
                ClassGrouping::ByCallstack => ClassifierRule::ByThread,
                ClassGrouping::NativeByAllocationMethod => ClassifierRule::ByNativeFunction,
                ClassGrouping::NativeByCallstack => ClassifierRule::ByFrame { depth: 0 },
            },
            NodeKind::Package { depth } => ClassifierRule::ByPackage { depth: depth + 1 },
            NodeKind::Class { .. } => ClassifierRule::Terminal,
            NodeKind::Frame { depth, .. } => ClassifierRule::ByFrame { depth: depth + 1 },
            NodeKind::Thread { .. } => ClassifierRule::ByFrame { depth: 0 },
            NodeKind::NativeFunction { .. } => ClassifierRule::Terminal,
        }
    }

    /// Obtain a node's classifier and redistribute its directly-held
    /// instances into child buckets. No-op once partitioned.
    pub fn ensure_partition(&mut self, capture: &Capture, id: NodeId) {
        if self.node(id).classifier.is_some() {
            return;
        }
        let rule = self.sub_classifier_rule(id);
        self.node_mut(id).classifier = Some(Classifier::new(rule));
        if rule == ClassifierRule::Terminal {
            return;
        }

        let snapshot = std::mem::take(&mut self.node_mut(id).snapshot);
        let delta = std::mem::take(&mut self.node_mut(id).delta);
        for &instance in &snapshot {
            if let Some(child) = self.resolve_child(capture, id, instance, true) {
                self.change_snapshot(capture, child, instance, SetOp::Add);
            }
        }
        for (&instance, roles) in &delta {
            if let Some(child) = self.resolve_child(capture, id, instance, true) {
                if roles.allocated {
                    self.change_delta(capture, child, instance, true, SetOp::Add);
                }
                if roles.freed {
                    self.change_delta(capture, child, instance, false, SetOp::Add);
                }
            }
        }
    }

    /// Currently-visible children (non-empty, not filtered out), forcing
    /// partition first. Creation order is stable.
    pub fn child_sets(&mut self, capture: &Capture, id: NodeId) -> Vec<NodeId> {
        self.ensure_partition(capture, id);
        self.all_child_sets(id)
            .into_iter()
            .filter(|&child| {
                let node = self.node(child);
                !node.is_filtered && !node.stats.is_empty()
            })
            .collect()
    }

    /// Every materialized child regardless of filter state; superset of the
    /// filtered view. Does not force partition.
    pub fn all_child_sets(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).classifier {
            Some(classifier) => classifier.all_classifier_sets().collect(),
            None => Vec::new(),
        }
    }

    /// Total number of descendant classifier sets
    pub fn descendant_set_count(&self, id: NodeId) -> usize {
        self.all_child_sets(id)
            .into_iter()
            .map(|child| 1 + self.descendant_set_count(child))
            .sum()
    }

    fn resolve_child(
        &mut self,
        capture: &Capture,
        parent: NodeId,
        instance: InstanceId,
        create: bool,
    ) -> Option<NodeId> {
        let max_depth = self.max_stack_depth;
        let (key, parent_rule) = {
            let classifier = self
                .node(parent)
                .classifier
                .as_ref()
                .expect("resolve_child on unpartitioned node");
            let key = classifier.classify(capture, instance, max_depth)?;
            (key, classifier.rule())
        };
        if let Some(existing) = self.node(parent).classifier.as_ref().unwrap().get(&key) {
            return Some(existing);
        }
        if !create {
            return None;
        }
        let node = Self::make_child(capture, parent_rule, &key, instance);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.node_mut(parent)
            .classifier
            .as_mut()
            .unwrap()
            .insert(key, id);
        Some(id)
    }

    fn make_child(
        capture: &Capture,
        parent_rule: ClassifierRule,
        key: &BucketKey,
        instance: InstanceId,
    ) -> Node {
        match (parent_rule, key) {
            (_, BucketKey::Class(class)) => Node::new(
                capture.class_simple_name(*class).to_string(),
                NodeKind::Class { class: *class },
            ),
            (ClassifierRule::ByPackage { depth }, BucketKey::Package(segment)) => {
                Node::new(segment.clone(), NodeKind::Package { depth })
            }
            (ClassifierRule::ByFrame { depth }, BucketKey::Frame(frame)) => Node::new(
                capture.frame_function(*frame).to_string(),
                NodeKind::Frame {
                    depth,
                    frame: *frame,
                },
            ),
            (ClassifierRule::ByThread, BucketKey::Thread(thread)) => Node::new(
                capture.thread_name(*thread).to_string(),
                NodeKind::Thread { thread: *thread },
            ),
            (ClassifierRule::ByNativeFunction, BucketKey::NativeFunction(function)) => {
                // Display decorates with the module; matching stays on the
                // raw symbol.
                let module = capture
                    .frame_at(instance, 0)
                    .and_then(|frame| capture.frame_module(frame));
                let name = match module {
                    Some(module) => format!("{} ({})", function, module),
                    None => function.clone(),
                };
                Node::new(
                    name,
                    NodeKind::NativeFunction {
                        function: function.clone(),
                    },
                )
            }
            (rule, key) => {
                debug_assert!(false, "rule {:?} produced foreign key {:?}", rule, key);
                Node::new(String::new(), NodeKind::Heap { heap: HeapId(0) })
            }
        }
    }

    fn routes_to_children(&self, id: NodeId) -> bool {
        matches!(&self.node(id).classifier, Some(c) if !c.is_terminal())
    }

    // ---- instance accounting -------------------------------------------

    /// Add a baseline instance, routing it to the correct descendant and
    /// updating counters along the path. Returns whether membership changed.
    pub fn add_snapshot_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_snapshot(capture, id, instance, SetOp::Add)
    }

    /// Remove a baseline instance. Never forces partitioning; removing an
    /// absent instance is a no-op.
    pub fn remove_snapshot_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_snapshot(capture, id, instance, SetOp::Remove)
    }

    fn change_snapshot(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
        op: SetOp,
    ) -> bool {
        let changed = if self.routes_to_children(id) {
            match self.resolve_child(capture, id, instance, op == SetOp::Add) {
                Some(child) => self.change_snapshot(capture, child, instance, op),
                None => false,
            }
        } else {
            let node = self.node_mut(id);
            match op {
                SetOp::Add => node.snapshot.insert(instance),
                SetOp::Remove => node.snapshot.swap_remove(&instance),
            }
        };
        if changed {
            let record = capture.instance(instance);
            let sign = op.sign();
            let node = self.node_mut(id);
            node.stats.snapshot_count += sign;
            node.stats.total_shallow_size += sign * record.shallow_or_zero();
            node.stats.total_native_size += sign * record.native_or_zero();
            node.stats.total_retained_size += sign * record.retained_or_zero();
            if record.has_stack_info() {
                node.stats.instances_with_stack += sign;
            }
            node.mark_dirty();
        }
        changed
    }

    /// Register a delta allocation. Numeric counters always move; the
    /// returned bool reflects only whether set membership changed.
    pub fn add_delta_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_delta(capture, id, instance, true, SetOp::Add)
    }

    /// Register a delta deallocation. Numeric counters always move; the
    /// returned bool reflects only whether set membership changed.
    pub fn free_delta_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_delta(capture, id, instance, false, SetOp::Add)
    }

    /// Undo a delta allocation (used when the observation window shrinks)
    pub fn remove_added_delta_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_delta(capture, id, instance, true, SetOp::Remove)
    }

    /// Undo a delta deallocation (used when the observation window shrinks)
    pub fn remove_freed_delta_instance(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
    ) -> bool {
        self.change_delta(capture, id, instance, false, SetOp::Remove)
    }

    fn change_delta(
        &mut self,
        capture: &Capture,
        id: NodeId,
        instance: InstanceId,
        is_alloc: bool,
        op: SetOp,
    ) -> bool {
        let membership_changed = if self.routes_to_children(id) {
            match self.resolve_child(capture, id, instance, op == SetOp::Add) {
                Some(child) => self.change_delta(capture, child, instance, is_alloc, op),
                // No bucket holds it; numeric accounting still applies here.
                None => false,
            }
        } else {
            let node = self.node_mut(id);
            match op {
                SetOp::Add => match node.delta.entry(instance) {
                    indexmap::map::Entry::Occupied(mut entry) => {
                        let roles = entry.get_mut();
                        if is_alloc {
                            roles.allocated = true;
                        } else {
                            roles.freed = true;
                        }
                        false
                    }
                    indexmap::map::Entry::Vacant(entry) => {
                        entry.insert(DeltaRoles {
                            allocated: is_alloc,
                            freed: !is_alloc,
                        });
                        true
                    }
                },
                // Undo clears only the targeted role; the entry stays a
                // member while the other role still holds it.
                SetOp::Remove => match node.delta.entry(instance) {
                    indexmap::map::Entry::Occupied(mut entry) => {
                        let roles = entry.get_mut();
                        if is_alloc {
                            roles.allocated = false;
                        } else {
                            roles.freed = false;
                        }
                        let empty = !roles.allocated && !roles.freed;
                        if empty {
                            entry.swap_remove();
                        }
                        empty
                    }
                    indexmap::map::Entry::Vacant(_) => false,
                },
            }
        };

        // Non-deduplicated numeric accounting: counters move whether or not
        // the membership set did.
        let record = capture.instance(instance);
        let sign = op.sign();
        let shallow = record.shallow_or_zero();
        let native = record.native_or_zero();
        let retained = record.retained_or_zero();
        let node = self.node_mut(id);
        if is_alloc {
            node.stats.delta_allocations += sign;
            node.stats.allocated_bytes += sign * shallow;
            node.stats.total_shallow_size += sign * shallow;
            node.stats.total_native_size += sign * native;
            node.stats.total_retained_size += sign * retained;
        } else {
            node.stats.delta_deallocations += sign;
            node.stats.deallocated_bytes += sign * shallow;
            node.stats.total_shallow_size -= sign * shallow;
            node.stats.total_native_size -= sign * native;
            node.stats.total_retained_size -= sign * retained;
        }
        if membership_changed {
            if record.has_stack_info() {
                node.stats.instances_with_stack += sign;
            }
            node.mark_dirty();
        }
        membership_changed
    }

    /// Bulk-route a snapshot batch and a delta batch into the root. Delta
    /// instances with time data become allocations only when not already
    /// snapshot members (at-most-once accounting) plus deallocations when a
    /// free timestamp is present; instances without time data are plain
    /// allocations. Both batches are consumed.
    pub fn partition(
        &mut self,
        capture: &Capture,
        snapshot: Vec<InstanceId>,
        delta: Vec<InstanceId>,
    ) {
        let snapshot_members: IndexSet<InstanceId> = snapshot.iter().copied().collect();
        for instance in snapshot {
            self.add_snapshot_instance(capture, ROOT, instance);
        }
        for instance in delta {
            let record = capture.instance(instance);
            if record.has_time_data() {
                if record.alloc_time.is_some() && !snapshot_members.contains(&instance) {
                    self.add_delta_instance(capture, ROOT, instance);
                }
                if record.dealloc_time.is_some() {
                    self.free_delta_instance(capture, ROOT, instance);
                }
            } else {
                self.add_delta_instance(capture, ROOT, instance);
            }
        }
    }

    /// Reset the tree to an empty root with no classifier, dropping every
    /// materialized descendant. Used when the grouping strategy changes.
    pub fn clear_classifier_sets(&mut self) {
        debug!(nodes = self.nodes.len(), "clearing classifier sets");
        self.nodes.truncate(1);
        let root = self.node_mut(ROOT);
        root.classifier = None;
        root.snapshot.clear();
        root.delta.clear();
        root.stats = SetStats::default();
        root.is_filtered = false;
        root.is_matched = false;
        root.match_memo.clear();
        root.needs_refiltering = true;
    }

    // ---- instance streams ----------------------------------------------

    /// Deduplicated union of snapshot and delta instances across the subtree
    pub fn instances(&self, id: NodeId) -> Vec<InstanceId> {
        let mut out = IndexSet::new();
        self.collect_instances(id, &mut out);
        out.into_iter().collect()
    }

    fn collect_instances(&self, id: NodeId, out: &mut IndexSet<InstanceId>) {
        let node = self.node(id);
        out.extend(node.snapshot.iter().copied());
        out.extend(node.delta.keys().copied());
        for child in self.all_child_sets(id) {
            self.collect_instances(child, out);
        }
    }

    /// Un-deduplicated snapshot instances across the subtree
    pub fn snapshot_instances(&self, id: NodeId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        self.collect_snapshot(id, &mut out);
        out
    }

    fn collect_snapshot(&self, id: NodeId, out: &mut Vec<InstanceId>) {
        out.extend(self.node(id).snapshot.iter().copied());
        for child in self.all_child_sets(id) {
            self.collect_snapshot(child, out);
        }
    }

    /// Un-deduplicated delta instances across the subtree, with their roles
    pub fn delta_instances(&self, id: NodeId) -> Vec<(InstanceId, DeltaRoles)> {
        let mut out = Vec::new();
        self.collect_delta(id, &mut out);
        out
    }

    fn collect_delta(&self, id: NodeId, out: &mut Vec<(InstanceId, DeltaRoles)>) {
        out.extend(self.node(id).delta.iter().map(|(&i, &r)| (i, r)));
        for child in self.all_child_sets(id) {
            self.collect_delta(child, out);
        }
    }

    /// Instances restricted to subtrees whose nodes matched the filter
    pub fn filter_matches(&self, id: NodeId) -> Vec<InstanceId> {
        let mut out = IndexSet::new();
        self.collect_matches(id, &mut out);
        out.into_iter().collect()
    }

    fn collect_matches(&self, id: NodeId, out: &mut IndexSet<InstanceId>) {
        if self.node(id).is_matched {
            self.collect_instances(id, out);
            return;
        }
        for child in self.all_child_sets(id) {
            self.collect_matches(child, out);
        }
    }

    // ---- search --------------------------------------------------------

    /// Deepest node whose own instance sets contain `target`, forcing
    /// partitioning along the way. A node can hold an instance transiently
    /// before partitioning redistributes it, so membership is re-checked
    /// after each partition step.
    pub fn find_containing_classifier_set(
        &mut self,
        capture: &Capture,
        id: NodeId,
        target: InstanceId,
    ) -> Option<NodeId> {
        let contained = self.node(id).contains(target);
        if contained {
            self.ensure_partition(capture, id);
        }
        // Partitioning may have moved the instance into a child.
        if self.node(id).contains(target) {
            return Some(id);
        }
        if contained || self.node(id).classifier.is_some() {
            for child in self.all_child_sets(id) {
                if let Some(found) = self.find_containing_classifier_set(capture, child, target) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Depth-first search by predicate, forcing partitioning along the
    /// searched path and short-circuiting on the first match
    pub fn find_classifier_set<F>(
        &mut self,
        capture: &Capture,
        id: NodeId,
        predicate: &mut F,
    ) -> Option<NodeId>
    where
        F: FnMut(&Node) -> bool,
    {
        if predicate(self.node(id)) {
            return Some(id);
        }
        self.ensure_partition(capture, id);
        for child in self.all_child_sets(id) {
            if let Some(found) = self.find_classifier_set(capture, child, predicate) {
                return Some(found);
            }
        }
        None
    }

    // ---- membership tests ----------------------------------------------

    /// Whether this subtree's instances cover the entire target set
    pub fn is_superset_of(&self, id: NodeId, targets: &IndexSet<InstanceId>) -> bool {
        let mut remaining = targets.clone();
        self.remove_contained(id, &mut remaining);
        remaining.is_empty()
    }

    fn remove_contained(&self, id: NodeId, remaining: &mut IndexSet<InstanceId>) {
        if remaining.is_empty() {
            return;
        }
        let node = self.node(id);
        for instance in &node.snapshot {
            remaining.swap_remove(instance);
        }
        for instance in node.delta.keys() {
            remaining.swap_remove(instance);
        }
        for child in self.all_child_sets(id) {
            self.remove_contained(child, remaining);
        }
    }

    /// Whether the node's directly-held instances intersect the given set
    pub fn immediate_instances_overlap_with(
        &self,
        id: NodeId,
        other: &IndexSet<InstanceId>,
    ) -> bool {
        let node = self.node(id);
        // Iterate the smaller collection, probe the larger.
        let snapshot_hit = if node.snapshot.len() <= other.len() {
            node.snapshot.iter().any(|i| other.contains(i))
        } else {
            other.iter().any(|i| node.snapshot.contains(i))
        };
        if snapshot_hit {
            return true;
        }
        if node.delta.len() <= other.len() {
            node.delta.keys().any(|i| other.contains(i))
        } else {
            other.iter().any(|i| node.delta.contains_key(i))
        }
    }

    /// Whether any instance in the subtree intersects the given set
    pub fn overlaps_with(&self, id: NodeId, other: &IndexSet<InstanceId>) -> bool {
        if self.immediate_instances_overlap_with(id, other) {
            return true;
        }
        self.all_child_sets(id)
            .into_iter()
            .any(|child| self.overlaps_with(child, other))
    }

    // ---- filtering -----------------------------------------------------

    /// Run the filter pass from the root
    pub fn apply_filter(&mut self, capture: &Capture, filter: &Filter, filter_changed: bool) {
        self.apply_filter_at(capture, ROOT, filter, false, filter_changed);
    }

    fn apply_filter_at(
        &mut self,
        capture: &Capture,
        id: NodeId,
        filter: &Filter,
        has_matched_ancestor: bool,
        filter_changed: bool,
    ) {
        // Memoization: nothing changed downstream and the filter is the
        // same, so the previous result stands.
        if !filter_changed && !self.node(id).needs_refiltering {
            return;
        }
        self.ensure_partition(capture, id);
        let matched = self.matches_filter(capture, id, filter);
        let terminal = self.node(id).classifier.as_ref().unwrap().is_terminal();
        {
            let node = self.node_mut(id);
            node.is_matched = matched;
            node.is_filtered = true;
            node.stats = SetStats::default();
        }

        if !terminal {
            let children = self.all_child_sets(id);
            self.node_mut(id).stats.classifier_set_count = children.len() as i64;
            if matched {
                self.node_mut(id).stats.filter_match_count = self.instances(id).len() as i64;
            }
            for child in children {
                self.apply_filter_at(
                    capture,
                    child,
                    filter,
                    has_matched_ancestor || matched,
                    filter_changed,
                );
                let child_stats = *self.node(child).stats();
                let child_filtered = self.node(child).is_filtered;
                let node = self.node_mut(id);
                node.stats.classifier_set_count += child_stats.classifier_set_count;
                if !child_filtered {
                    node.is_filtered = false;
                    node.stats.accumulate(&child_stats);
                    node.stats.filtered_set_count += child_stats.filtered_set_count + 1;
                    if !matched {
                        node.stats.filter_match_count += child_stats.filter_match_count;
                    }
                }
            }
        } else if matched || has_matched_ancestor {
            let survived = self.refresh_instance_stats(capture, id);
            let node = self.node_mut(id);
            node.is_filtered = !survived;
            if matched {
                let own = node.snapshot.len()
                    + node
                        .delta
                        .keys()
                        .filter(|i| !node.snapshot.contains(*i))
                        .count();
                node.stats.filter_match_count = own as i64;
            }
        }

        self.node_mut(id).needs_refiltering = false;
    }

    /// Recount a leaf node's aggregates from its own instance sets.
    /// Returns whether the node has any content left.
    fn refresh_instance_stats(&mut self, capture: &Capture, id: NodeId) -> bool {
        let node = self.node(id);
        let mut stats = SetStats::default();
        for &instance in &node.snapshot {
            let record = capture.instance(instance);
            stats.snapshot_count += 1;
            stats.total_shallow_size += record.shallow_or_zero();
            stats.total_native_size += record.native_or_zero();
            stats.total_retained_size += record.retained_or_zero();
            if record.has_stack_info() {
                stats.instances_with_stack += 1;
            }
        }
        for (&instance, roles) in &node.delta {
            let record = capture.instance(instance);
            if roles.allocated {
                stats.delta_allocations += 1;
                stats.allocated_bytes += record.shallow_or_zero();
                stats.total_shallow_size += record.shallow_or_zero();
                stats.total_native_size += record.native_or_zero();
                stats.total_retained_size += record.retained_or_zero();
            }
            if roles.freed {
                stats.delta_deallocations += 1;
                stats.deallocated_bytes += record.shallow_or_zero();
                stats.total_shallow_size -= record.shallow_or_zero();
                stats.total_native_size -= record.native_or_zero();
                stats.total_retained_size -= record.retained_or_zero();
            }
            if !node.snapshot.contains(&instance) && record.has_stack_info() {
                stats.instances_with_stack += 1;
            }
        }
        let survived = !(node.snapshot.is_empty() && node.delta.is_empty());
        self.node_mut(id).stats = stats;
        survived
    }

    /// Match test for a node's identity: class leaves match their
    /// fully-qualified name, native allocation functions their raw symbol,
    /// everything else its display name.
    fn matches_filter(&self, capture: &Capture, id: NodeId, filter: &Filter) -> bool {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Class { class } => filter.matches(capture.class_fq_name(*class)),
            NodeKind::NativeFunction { function } => filter.matches(function),
            _ => filter.matches(&node.name),
        }
    }

    /// Number of subtree instances whose class name matches `filter`,
    /// memoized per filter value and invalidated by the same dirty-bit
    /// discipline as refiltering
    pub fn instance_filter_match_count(
        &mut self,
        capture: &Capture,
        id: NodeId,
        filter: &Filter,
    ) -> i64 {
        let fingerprint = filter.fingerprint();
        if let Some(&count) = self.node(id).match_memo.get(&fingerprint) {
            return count;
        }
        let count = self
            .instances(id)
            .into_iter()
            .filter(|&instance| {
                filter.matches(capture.class_fq_name(capture.class_of(instance)))
            })
            .count() as i64;
        let capacity = self.memo_capacity;
        let node = self.node_mut(id);
        if capacity > 0 && node.match_memo.len() >= capacity {
            node.match_memo.shift_remove_index(0);
        }
        node.match_memo.insert(fingerprint, count);
        count
    }
}
