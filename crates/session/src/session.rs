//! Capture Session
//!
//! A [`Session`] is one loaded capture plus its live view state: the
//! selection window over the recording timeline and one [`HeapSet`] per
//! recorded heap. Selecting a window streams instances into the heap trees
//! as a baseline snapshot (alive when the window opens) plus delta
//! allocation and deallocation events inside the window. Moving only the
//! window's upper edge is applied incrementally; moving the lower edge
//! rebuilds the trees.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use heaplens_capture::{Capture, Instance, InstanceId};
use heaplens_classifier::{ClassGrouping, Filter, HeapSet, ROOT};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::events::{EventBus, SessionEvent};

/// Identifier of an open session within the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One loaded capture and its view state
pub struct Session {
    id: SessionId,
    capture: Capture,
    heaps: IndexMap<u32, HeapSet>,
    selection: Option<(i64, i64)>,
    config: SessionConfig,
    bus: Arc<EventBus>,
}

impl Session {
    /// Create a session over a capture, with one empty heap set per
    /// recorded heap
    pub fn new(
        id: SessionId,
        capture: Capture,
        config: SessionConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        let mut heaps = IndexMap::new();
        for heap in capture.heap_ids() {
            let raw = capture.heap_raw_id(heap);
            let name = capture.heap_name(heap);
            let mut heap_set = HeapSet::with_grouping(heap, name, config.default_grouping);
            heap_set
                .tree_mut()
                .set_limits(config.max_stack_depth, config.filter_memo_capacity);
            heaps.insert(raw, heap_set);
        }
        info!(%id, heaps = heaps.len(), instances = capture.instance_count(), "session created");
        Self {
            id,
            capture,
            heaps,
            selection: None,
            config,
            bus,
        }
    }

    /// The session's identity
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The loaded capture
    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    /// The current selection window, if any
    pub fn selection(&self) -> Option<(i64, i64)> {
        self.selection
    }

    /// The heap set for a raw heap id
    pub fn heap(&self, raw_id: u32) -> Option<&HeapSet> {
        self.heaps.get(&raw_id)
    }

    /// Mutable heap set for a raw heap id
    pub fn heap_mut(&mut self, raw_id: u32) -> Option<&mut HeapSet> {
        self.heaps.get_mut(&raw_id)
    }

    /// Capture plus mutable heap set, for traversals that must partition
    /// the tree while reading the capture
    pub fn capture_and_heap_mut(&mut self, raw_id: u32) -> Option<(&Capture, &mut HeapSet)> {
        let heap_set = self.heaps.get_mut(&raw_id)?;
        Some((&self.capture, heap_set))
    }

    /// All heap sets in registration order
    pub fn heaps(&self) -> impl Iterator<Item = (u32, &HeapSet)> {
        self.heaps.iter().map(|(&raw, set)| (raw, set))
    }

    /// Select the observation window `[min, max]` (inclusive). Keeping the
    /// lower edge and moving only the upper edge is applied incrementally.
    pub fn select_range(&mut self, min: i64, max: i64) -> Result<()> {
        if min > max {
            return Err(SessionError::InvalidRange { min, max });
        }
        match self.selection {
            Some((old_min, old_max)) if old_min == min && old_max == max => return Ok(()),
            Some((old_min, old_max)) if old_min == min => {
                debug!(session = %self.id, old_max, max, "adjusting selection upper edge");
                self.adjust_max(old_max, max);
            }
            _ => {
                debug!(session = %self.id, min, max, "rebuilding selection");
                self.rebuild(min, max);
            }
        }
        self.selection = Some((min, max));
        for heap_set in self.heaps.values_mut() {
            heap_set.refresh_filter(&self.capture);
        }
        self.bus.emit(SessionEvent::RangeSelected {
            session: self.id,
            min,
            max,
        });
        Ok(())
    }

    fn rebuild(&mut self, min: i64, max: i64) {
        for heap_set in self.heaps.values_mut() {
            heap_set.tree_mut().clear_classifier_sets();
        }
        for (id, instance) in self.capture.instances() {
            let Some(heap_set) = self.heaps.get_mut(&instance.heap) else {
                continue;
            };
            let tree = heap_set.tree_mut();
            if !instance.has_time_data() {
                tree.add_delta_instance(&self.capture, ROOT, id);
                continue;
            }
            if alive_at(instance, min) {
                tree.add_snapshot_instance(&self.capture, ROOT, id);
            }
            if in_window(instance.alloc_time, min, max) {
                tree.add_delta_instance(&self.capture, ROOT, id);
            }
            if in_window(instance.dealloc_time, min, max) {
                tree.free_delta_instance(&self.capture, ROOT, id);
            }
        }
    }

    fn adjust_max(&mut self, old_max: i64, new_max: i64) {
        let growing = new_max > old_max;
        let (lo, hi) = if growing {
            (old_max, new_max)
        } else {
            (new_max, old_max)
        };
        for (id, instance) in self.capture.instances() {
            if !instance.has_time_data() {
                continue;
            }
            let Some(heap_set) = self.heaps.get_mut(&instance.heap) else {
                continue;
            };
            let tree = heap_set.tree_mut();
            // Events in (lo, hi] enter when growing and leave when shrinking.
            if event_in(instance.alloc_time, lo, hi) {
                if growing {
                    tree.add_delta_instance(&self.capture, ROOT, id);
                } else {
                    tree.remove_added_delta_instance(&self.capture, ROOT, id);
                }
            }
            if event_in(instance.dealloc_time, lo, hi) {
                if growing {
                    tree.free_delta_instance(&self.capture, ROOT, id);
                } else {
                    tree.remove_freed_delta_instance(&self.capture, ROOT, id);
                }
            }
        }
    }

    /// Switch a heap's grouping mode
    pub fn set_grouping(&mut self, raw_heap: u32, grouping: ClassGrouping) -> Result<()> {
        let heap_set = self
            .heaps
            .get_mut(&raw_heap)
            .ok_or(SessionError::UnknownHeap(raw_heap))?;
        heap_set.set_class_grouping(&self.capture, grouping);
        self.bus.emit(SessionEvent::GroupingChanged {
            session: self.id,
            heap: raw_heap,
            grouping,
        });
        Ok(())
    }

    /// Select a heap's name filter
    pub fn set_filter(&mut self, raw_heap: u32, filter: Filter) -> Result<()> {
        let heap_set = self
            .heaps
            .get_mut(&raw_heap)
            .ok_or(SessionError::UnknownHeap(raw_heap))?;
        let text = filter.text().to_string();
        heap_set.select_filter(&self.capture, filter);
        self.bus.emit(SessionEvent::FilterChanged {
            session: self.id,
            heap: raw_heap,
            text,
        });
        Ok(())
    }

    /// Instances selected by the current window, deduplicated, across one heap
    pub fn selected_instances(&self, raw_heap: u32) -> Vec<InstanceId> {
        self.heaps
            .get(&raw_heap)
            .map(|set| set.tree().instances(ROOT))
            .unwrap_or_default()
    }

    /// The configuration this session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

fn alive_at(instance: &Instance, time: i64) -> bool {
    let born = instance.alloc_time.map_or(true, |t| t < time);
    let not_dead = instance.dealloc_time.map_or(true, |t| t >= time);
    born && not_dead
}

fn in_window(event: Option<i64>, min: i64, max: i64) -> bool {
    event.is_some_and(|t| t >= min && t <= max)
}

fn event_in(event: Option<i64>, lo: i64, hi: i64) -> bool {
    event.is_some_and(|t| t > lo && t <= hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAP: u32 = 1;

    fn timeline_session() -> Session {
        let mut capture = Capture::new();
        capture.register_heap(HEAP, "app");
        let class = capture.classes_mut().register("com.example.Foo");
        // (alloc, dealloc) pairs along the timeline.
        let events: [(Option<i64>, Option<i64>); 5] = [
            (Some(0), Some(7)),
            (Some(2), None),
            (Some(4), Some(9)),
            (Some(6), None),
            (Some(8), None),
        ];
        for (alloc, dealloc) in events {
            let mut instance = Instance::new(class, HEAP);
            instance.alloc_time = alloc;
            instance.dealloc_time = dealloc;
            instance.shallow_size = 8;
            capture.add_instance(instance);
        }
        Session::new(
            SessionId(1),
            capture,
            SessionConfig::default(),
            Arc::new(EventBus::new()),
        )
    }

    fn heap_stats(session: &Session) -> heaplens_classifier::SetStats {
        *session.heap(HEAP).unwrap().stats()
    }

    #[test]
    fn test_select_range_builds_snapshot_and_delta() {
        let mut session = timeline_session();
        session.select_range(2, 6).unwrap();

        let stats = heap_stats(&session);
        assert_eq!(stats.snapshot_count, 1);
        assert_eq!(stats.delta_allocations, 3);
        assert_eq!(stats.delta_deallocations, 0);
        assert_eq!(stats.total_object_count(), 4);
        assert_eq!(session.selected_instances(HEAP).len(), 4);
    }

    #[test]
    fn test_extend_then_shrink_max_is_reversible() {
        let mut session = timeline_session();
        session.select_range(2, 6).unwrap();
        let initial = heap_stats(&session);

        session.select_range(2, 8).unwrap();
        let extended = heap_stats(&session);
        assert_eq!(extended.delta_allocations, 4);
        assert_eq!(extended.delta_deallocations, 1);
        assert_eq!(extended.total_object_count(), 4);

        session.select_range(2, 6).unwrap();
        assert_eq!(heap_stats(&session), initial);
    }

    #[test]
    fn test_shrink_past_dealloc_keeps_allocation() {
        let mut capture = Capture::new();
        capture.register_heap(HEAP, "app");
        let class = capture.classes_mut().register("com.example.Foo");
        let mut instance = Instance::new(class, HEAP);
        instance.alloc_time = Some(3);
        instance.dealloc_time = Some(7);
        instance.shallow_size = 8;
        capture.add_instance(instance);
        let mut session = Session::new(
            SessionId(4),
            capture,
            SessionConfig::default(),
            Arc::new(EventBus::new()),
        );

        session.select_range(2, 8).unwrap();
        let full = heap_stats(&session);
        assert_eq!(full.delta_allocations, 1);
        assert_eq!(full.delta_deallocations, 1);
        assert_eq!(full.total_object_count(), 0);

        // The upper edge retreats past the free but not the allocation.
        session.select_range(2, 6).unwrap();
        let stats = heap_stats(&session);
        assert_eq!(stats.delta_allocations, 1);
        assert_eq!(stats.delta_deallocations, 0);
        assert_eq!(stats.total_object_count(), 1);
        assert_eq!(session.selected_instances(HEAP).len(), 1);

        // A regroup rebuilt from the stored streams keeps the allocation.
        session.set_grouping(HEAP, ClassGrouping::ByPackage).unwrap();
        let regrouped = heap_stats(&session);
        assert_eq!(regrouped.delta_allocations, 1);
        assert_eq!(regrouped.total_object_count(), 1);
    }

    #[test]
    fn test_min_change_rebuilds() {
        let mut session = timeline_session();
        session.select_range(2, 6).unwrap();
        session.select_range(5, 9).unwrap();

        let stats = heap_stats(&session);
        assert_eq!(stats.snapshot_count, 3);
        assert_eq!(stats.delta_allocations, 2);
        assert_eq!(stats.delta_deallocations, 2);
        assert_eq!(stats.total_object_count(), 3);
    }

    #[test]
    fn test_reselect_same_range_is_noop() {
        let mut session = timeline_session();
        session.select_range(2, 6).unwrap();
        let before = heap_stats(&session);
        session.select_range(2, 6).unwrap();
        assert_eq!(heap_stats(&session), before);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut session = timeline_session();
        assert!(matches!(
            session.select_range(9, 2),
            Err(SessionError::InvalidRange { .. })
        ));
        assert!(session.selection().is_none());
    }

    #[test]
    fn test_instances_without_time_data_always_count() {
        let mut capture = Capture::new();
        capture.register_heap(HEAP, "app");
        let class = capture.classes_mut().register("Foo");
        capture.add_instance(Instance::new(class, HEAP));
        let mut session = Session::new(
            SessionId(2),
            capture,
            SessionConfig::default(),
            Arc::new(EventBus::new()),
        );

        session.select_range(100, 200).unwrap();
        let stats = heap_stats(&session);
        assert_eq!(stats.delta_allocations, 1);
        assert_eq!(stats.total_object_count(), 1);
    }

    #[test]
    fn test_filter_survives_window_adjustment() {
        let mut session = timeline_session();
        session.select_range(2, 6).unwrap();
        session.set_filter(HEAP, Filter::substring("Foo")).unwrap();
        assert_eq!(heap_stats(&session).total_object_count(), 4);

        session.select_range(2, 8).unwrap();
        // The filter pass re-ran over the adjusted content.
        assert_eq!(heap_stats(&session).total_object_count(), 4);
        assert!(!session.heap(HEAP).unwrap().filter().is_empty());
    }

    #[test]
    fn test_set_grouping_unknown_heap() {
        let mut session = timeline_session();
        assert!(matches!(
            session.set_grouping(42, ClassGrouping::ByPackage),
            Err(SessionError::UnknownHeap(42))
        ));
    }

    #[test]
    fn test_events_emitted() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        let mut capture = Capture::new();
        capture.register_heap(HEAP, "app");
        let mut session =
            Session::new(SessionId(3), capture, SessionConfig::default(), bus);

        session.select_range(0, 10).unwrap();
        assert!(matches!(
            sub.try_recv(),
            Ok(SessionEvent::RangeSelected { min: 0, max: 10, .. })
        ));
        session.set_grouping(HEAP, ClassGrouping::ByPackage).unwrap();
        assert!(matches!(
            sub.try_recv(),
            Ok(SessionEvent::GroupingChanged { heap: HEAP, .. })
        ));
    }
}
