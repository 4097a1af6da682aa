//! Thread Table
//!
//! Maps recorder-side thread ids to display names.

use indexmap::IndexMap;

/// Stable handle to a registered thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u32);

/// Registry of threads observed in a capture, keyed by the runtime thread id
#[derive(Debug, Clone, Default)]
pub struct ThreadTable {
    threads: IndexMap<u64, String>,
}

impl ThreadTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a thread by its runtime id. Re-registering an id keeps the
    /// first name seen and returns the original handle.
    pub fn register(&mut self, runtime_tid: u64, name: &str) -> ThreadId {
        if let Some(index) = self.threads.get_index_of(&runtime_tid) {
            return ThreadId(index as u32);
        }
        let (index, _) = self.threads.insert_full(runtime_tid, name.to_string());
        ThreadId(index as u32)
    }

    /// Look up a thread handle by runtime id
    pub fn lookup(&self, runtime_tid: u64) -> Option<ThreadId> {
        self.threads.get_index_of(&runtime_tid).map(|i| ThreadId(i as u32))
    }

    /// Display name of a thread
    pub fn name(&self, id: ThreadId) -> &str {
        self.threads.get_index(id.0 as usize).unwrap().1
    }

    /// Runtime id of a thread
    pub fn runtime_tid(&self, id: ThreadId) -> u64 {
        *self.threads.get_index(id.0 as usize).unwrap().0
    }

    /// Number of registered threads
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut table = ThreadTable::new();
        let main = table.register(1, "main");
        let worker = table.register(7, "worker-1");

        assert_ne!(main, worker);
        assert_eq!(table.lookup(1), Some(main));
        assert_eq!(table.lookup(99), None);
        assert_eq!(table.name(worker), "worker-1");
        assert_eq!(table.runtime_tid(worker), 7);
    }

    #[test]
    fn test_reregister_keeps_first_name() {
        let mut table = ThreadTable::new();
        let a = table.register(1, "main");
        let b = table.register(1, "renamed");

        assert_eq!(a, b);
        assert_eq!(table.name(a), "main");
    }
}
