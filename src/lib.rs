//! Heaplens - Hierarchical Heap-Allocation Analyzer
//!
//! Loads recorded heap captures and arranges their allocation records into
//! lazily-partitioned classifier trees: by class, package, call stack,
//! thread or native allocation function, with live filtering and aggregate
//! statistics per bucket.
//!
//! ## Architecture
//!
//! Heaplens is organized into specialized crates:
//!
//! - `heaplens-capture`: capture data model and JSON import/export
//! - `heaplens-classifier`: the classification engine (trees, groupings,
//!   filters, statistics)
//! - `heaplens-session`: sessions, selection windows and the registry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod report;

// Re-export main components for library usage
pub use heaplens_capture as capture;
pub use heaplens_classifier as classifier;
pub use heaplens_session as session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use heaplens_capture::{load_capture, save_capture, Capture, Instance, InstanceId};
    pub use heaplens_classifier::{ClassGrouping, Filter, HeapSet, SetStats, ROOT};
    pub use heaplens_session::{Session, SessionConfig, SessionRegistry};
}
