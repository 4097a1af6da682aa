//! Allocation Instance Records
//!
//! One [`Instance`] is a single heap-allocation record. Identity is the
//! [`InstanceId`] handle, never value equality: two instances with identical
//! fields are still distinct objects.

use crate::class_db::ClassId;
use crate::stack::StackId;
use crate::thread::ThreadId;

/// Stable handle to an allocation instance within its capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

/// Sentinel for a size field the recorder could not determine.
/// Aggregation treats it as zero rather than an error.
pub const INVALID_SIZE: i64 = -1;

/// Normalize a possibly-invalid size for aggregation
pub fn valid_or_zero(size: i64) -> i64 {
    if size < 0 {
        0
    } else {
        size
    }
}

/// A single heap-allocation record
#[derive(Debug, Clone)]
pub struct Instance {
    /// Class of the allocated object
    pub class: ClassId,
    /// Heap the object lives in (raw heap id from the recorder)
    pub heap: u32,
    /// Allocation timestamp in nanoseconds, when recorded
    pub alloc_time: Option<i64>,
    /// Deallocation timestamp in nanoseconds, when recorded
    pub dealloc_time: Option<i64>,
    /// Call stack at allocation, when recorded (innermost frame first)
    pub stack: Option<StackId>,
    /// Allocating thread, when recorded
    pub thread: Option<ThreadId>,
    /// Shallow size in bytes, or [`INVALID_SIZE`]
    pub shallow_size: i64,
    /// Native size in bytes, or [`INVALID_SIZE`]
    pub native_size: i64,
    /// Retained size in bytes, or [`INVALID_SIZE`]
    pub retained_size: i64,
}

impl Instance {
    /// Create a record with only a class and heap; everything else absent
    pub fn new(class: ClassId, heap: u32) -> Self {
        Self {
            class,
            heap,
            alloc_time: None,
            dealloc_time: None,
            stack: None,
            thread: None,
            shallow_size: INVALID_SIZE,
            native_size: INVALID_SIZE,
            retained_size: INVALID_SIZE,
        }
    }

    /// Whether this record participates in delta (allocation event) accounting.
    /// Records from a plain heap dump carry no timestamps at all.
    pub fn has_time_data(&self) -> bool {
        self.alloc_time.is_some() || self.dealloc_time.is_some()
    }

    /// Whether the record carries call-stack information
    pub fn has_stack_info(&self) -> bool {
        self.stack.is_some()
    }

    /// Shallow size with the invalid sentinel normalized to zero
    pub fn shallow_or_zero(&self) -> i64 {
        valid_or_zero(self.shallow_size)
    }

    /// Native size with the invalid sentinel normalized to zero
    pub fn native_or_zero(&self) -> i64 {
        valid_or_zero(self.native_size)
    }

    /// Retained size with the invalid sentinel normalized to zero
    pub fn retained_or_zero(&self) -> i64 {
        valid_or_zero(self.retained_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_or_zero() {
        assert_eq!(valid_or_zero(42), 42);
        assert_eq!(valid_or_zero(0), 0);
        assert_eq!(valid_or_zero(INVALID_SIZE), 0);
        assert_eq!(valid_or_zero(-17), 0);
    }

    #[test]
    fn test_time_data() {
        let mut instance = Instance::new(ClassId(0), 0);
        assert!(!instance.has_time_data());

        instance.dealloc_time = Some(10);
        assert!(instance.has_time_data());
        assert!(instance.alloc_time.is_none());
    }
}
