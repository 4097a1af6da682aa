//! Heaplens Classifier Engine
//!
//! Groups a population of heap-allocation records into a lazily-partitioned
//! tree of named buckets (by class, package, call-stack frame, thread or
//! native allocation function) while tracking aggregate statistics per
//! bucket and supporting live filtering without re-scanning every instance.
//!
//! The engine is single-threaded by contract: callers that feed it from a
//! live recording must serialize access externally.

pub mod classify;
pub mod filter;
pub mod grouping;
pub mod heap;
pub mod stats;
pub mod tree;

pub use classify::{BucketKey, Classifier, ClassifierRule};
pub use filter::Filter;
pub use grouping::ClassGrouping;
pub use heap::HeapSet;
pub use stats::SetStats;
pub use tree::{ClassifierTree, DeltaRoles, Node, NodeId, NodeKind, ROOT};
