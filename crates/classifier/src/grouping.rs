//! Class Grouping Modes
//!
//! The live-selectable strategy for how a heap root partitions its
//! instances. Changing the grouping clears and re-partitions the tree.

use serde::{Deserialize, Serialize};

/// How a heap's instances are arranged into the classifier tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassGrouping {
    /// Flat list of classes
    ByClass,
    /// Package hierarchy, one tree level per package segment, classes as leaves
    ByPackage,
    /// Thread, then call-stack frames innermost-first, classes as leaves
    ByCallstack,
    /// Native heaps: flat list keyed by the allocating function
    NativeByAllocationMethod,
    /// Native heaps: call-stack frames innermost-first
    NativeByCallstack,
}

impl Default for ClassGrouping {
    fn default() -> Self {
        ClassGrouping::ByClass
    }
}

impl std::fmt::Display for ClassGrouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ClassGrouping::ByClass => "Arrange by class",
            ClassGrouping::ByPackage => "Arrange by package",
            ClassGrouping::ByCallstack => "Arrange by callstack",
            ClassGrouping::NativeByAllocationMethod => "Arrange by allocation method",
            ClassGrouping::NativeByCallstack => "Arrange by callstack",
        };
        write!(f, "{}", label)
    }
}
