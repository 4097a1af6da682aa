//! Call-Stack Table
//!
//! Interns stack frames and whole call stacks. Stacks are stored
//! innermost-first: depth 0 is the allocating frame, increasing depth walks
//! toward the callers.

use indexmap::IndexSet;

/// Stable handle to an interned stack frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

/// Stable handle to an interned call stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(pub u32);

/// A single stack frame: function symbol plus the module it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackFrame {
    /// Function or method symbol
    pub function: String,
    /// Module/library the symbol belongs to, when known
    pub module: Option<String>,
}

/// Interning table for frames and call stacks
#[derive(Debug, Clone, Default)]
pub struct StackTable {
    frames: IndexSet<StackFrame>,
    stacks: IndexSet<Vec<FrameId>>,
}

impl StackTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a frame, returning its id
    pub fn intern_frame(&mut self, function: &str, module: Option<&str>) -> FrameId {
        let frame = StackFrame {
            function: function.to_string(),
            module: module.map(str::to_string),
        };
        let (index, _) = self.frames.insert_full(frame);
        FrameId(index as u32)
    }

    /// Intern a call stack (innermost frame first), returning its id
    pub fn intern_stack(&mut self, frames: Vec<FrameId>) -> StackId {
        let (index, _) = self.stacks.insert_full(frames);
        StackId(index as u32)
    }

    /// Look up an interned frame
    pub fn frame(&self, id: FrameId) -> &StackFrame {
        self.frames.get_index(id.0 as usize).unwrap()
    }

    /// Frames of a stack, innermost first
    pub fn frames_of(&self, id: StackId) -> &[FrameId] {
        self.stacks.get_index(id.0 as usize).unwrap()
    }

    /// Frame at `depth` within a stack, `None` once the stack is exhausted
    pub fn frame_at(&self, id: StackId, depth: usize) -> Option<FrameId> {
        self.frames_of(id).get(depth).copied()
    }

    /// Depth (frame count) of a stack
    pub fn depth(&self, id: StackId) -> usize {
        self.frames_of(id).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interning() {
        let mut table = StackTable::new();
        let a = table.intern_frame("malloc", Some("libc.so"));
        let b = table.intern_frame("malloc", Some("libc.so"));
        let c = table.intern_frame("malloc", None);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.frame(a).function, "malloc");
    }

    #[test]
    fn test_stack_depth_order() {
        let mut table = StackTable::new();
        let leaf = table.intern_frame("alloc_buffer", None);
        let caller = table.intern_frame("main", None);
        let stack = table.intern_stack(vec![leaf, caller]);

        assert_eq!(table.depth(stack), 2);
        assert_eq!(table.frame_at(stack, 0), Some(leaf));
        assert_eq!(table.frame_at(stack, 1), Some(caller));
        assert_eq!(table.frame_at(stack, 2), None);
    }
}
