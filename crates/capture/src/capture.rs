//! Capture Store
//!
//! A [`Capture`] owns every record of one recording session: the interned
//! class/stack/thread tables, the heap directory and the instance records.
//! It is the read-side collaborator of the classification engine; instances
//! are referenced by [`InstanceId`] and looked up here.

use indexmap::IndexMap;

use crate::class_db::{ClassDb, ClassId};
use crate::instance::{Instance, InstanceId};
use crate::stack::{FrameId, StackId, StackTable};
use crate::thread::ThreadId;
use crate::thread::ThreadTable;

/// Identifier of a logical heap within a capture ("app", "zygote", "native", ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(pub u32);

/// All data recorded for one capture session
#[derive(Debug, Clone, Default)]
pub struct Capture {
    classes: ClassDb,
    stacks: StackTable,
    threads: ThreadTable,
    heaps: IndexMap<u32, String>,
    instances: Vec<Instance>,
}

impl Capture {
    /// Create an empty capture
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a heap by raw id and display name. Re-registering keeps the
    /// first name seen.
    pub fn register_heap(&mut self, raw_id: u32, name: &str) -> HeapId {
        if let Some(index) = self.heaps.get_index_of(&raw_id) {
            return HeapId(index as u32);
        }
        let (index, _) = self.heaps.insert_full(raw_id, name.to_string());
        HeapId(index as u32)
    }

    /// Raw recorder-side id of a heap
    pub fn heap_raw_id(&self, id: HeapId) -> u32 {
        *self.heaps.get_index(id.0 as usize).unwrap().0
    }

    /// Display name of a heap
    pub fn heap_name(&self, id: HeapId) -> &str {
        self.heaps.get_index(id.0 as usize).unwrap().1
    }

    /// All heaps in registration order
    pub fn heap_ids(&self) -> impl Iterator<Item = HeapId> + '_ {
        (0..self.heaps.len() as u32).map(HeapId)
    }

    /// Mutable class registry
    pub fn classes_mut(&mut self) -> &mut ClassDb {
        &mut self.classes
    }

    /// Class registry
    pub fn classes(&self) -> &ClassDb {
        &self.classes
    }

    /// Mutable stack table
    pub fn stacks_mut(&mut self) -> &mut StackTable {
        &mut self.stacks
    }

    /// Stack table
    pub fn stacks(&self) -> &StackTable {
        &self.stacks
    }

    /// Mutable thread table
    pub fn threads_mut(&mut self) -> &mut ThreadTable {
        &mut self.threads
    }

    /// Thread table
    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    /// Add an instance record, returning its identity handle
    pub fn add_instance(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(instance);
        id
    }

    /// Look up an instance record
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.0 as usize]
    }

    /// Number of instance records
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// All instances with their identity handles
    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (InstanceId(i as u32), inst))
    }

    /// Class of an instance
    pub fn class_of(&self, id: InstanceId) -> ClassId {
        self.instance(id).class
    }

    /// Fully-qualified class name of an instance's class
    pub fn class_fq_name(&self, class: ClassId) -> &str {
        self.classes.fq_name(class)
    }

    /// Simple class name of an instance's class
    pub fn class_simple_name(&self, class: ClassId) -> &str {
        self.classes.simple_name(class)
    }

    /// Package segment of an instance's class at `depth`
    pub fn package_segment(&self, class: ClassId, depth: usize) -> Option<&str> {
        self.classes.package_segment(class, depth)
    }

    /// Call-stack frame of an instance at `depth` (0 = allocating frame)
    pub fn frame_at(&self, id: InstanceId, depth: usize) -> Option<FrameId> {
        self.instance(id)
            .stack
            .and_then(|stack| self.stacks.frame_at(stack, depth))
    }

    /// Function symbol of a frame
    pub fn frame_function(&self, frame: FrameId) -> &str {
        &self.stacks.frame(frame).function
    }

    /// Module of a frame, when known
    pub fn frame_module(&self, frame: FrameId) -> Option<&str> {
        self.stacks.frame(frame).module.as_deref()
    }

    /// Display name of a thread
    pub fn thread_name(&self, thread: ThreadId) -> &str {
        self.threads.name(thread)
    }

    /// Depth of an instance's call stack, zero when absent
    pub fn stack_depth(&self, id: InstanceId) -> usize {
        self.instance(id)
            .stack
            .map(|s| self.stacks.depth(s))
            .unwrap_or(0)
    }

    fn stack_of(&self, id: InstanceId) -> Option<StackId> {
        self.instance(id).stack
    }

    /// Frames of an instance's call stack, innermost first
    pub fn stack_frames(&self, id: InstanceId) -> &[FrameId] {
        match self.stack_of(id) {
            Some(stack) => self.stacks.frames_of(stack),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_registration() {
        let mut capture = Capture::new();
        let app = capture.register_heap(1, "app");
        let native = capture.register_heap(4, "native");
        let again = capture.register_heap(1, "other");

        assert_eq!(app, again);
        assert_ne!(app, native);
        assert_eq!(capture.heap_name(app), "app");
        assert_eq!(capture.heap_raw_id(native), 4);
        assert_eq!(capture.heap_ids().count(), 2);
    }

    #[test]
    fn test_instance_lookup() {
        let mut capture = Capture::new();
        let class = capture.classes_mut().register("com.example.Foo");
        let mut instance = Instance::new(class, 1);
        instance.shallow_size = 16;
        let id = capture.add_instance(instance);

        assert_eq!(capture.class_of(id), class);
        assert_eq!(capture.class_fq_name(class), "com.example.Foo");
        assert_eq!(capture.class_simple_name(class), "Foo");
        assert_eq!(capture.instance(id).shallow_size, 16);
        assert_eq!(capture.stack_depth(id), 0);
        assert_eq!(capture.frame_at(id, 0), None);
    }

    #[test]
    fn test_stack_access_through_capture() {
        let mut capture = Capture::new();
        let class = capture.classes_mut().register("Foo");
        let leaf = capture.stacks_mut().intern_frame("alloc", None);
        let caller = capture.stacks_mut().intern_frame("main", None);
        let stack = capture.stacks_mut().intern_stack(vec![leaf, caller]);

        let mut instance = Instance::new(class, 0);
        instance.stack = Some(stack);
        let id = capture.add_instance(instance);

        assert_eq!(capture.stack_depth(id), 2);
        assert_eq!(capture.frame_at(id, 0), Some(leaf));
        assert_eq!(capture.frame_function(leaf), "alloc");
    }
}
