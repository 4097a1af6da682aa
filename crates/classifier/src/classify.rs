//! Classifier Strategies
//!
//! A [`Classifier`] routes one instance to (or creates) its child bucket.
//! Instead of a subclass per strategy, the routing rules form a closed
//! enumeration dispatched by `match`; the "join" composition of the
//! grouping families is expressed by the key extraction falling back to a
//! [`BucketKey::Class`] key when its own key is absent (stack shorter than
//! the requested depth, package exhausted, no thread recorded).

use indexmap::IndexMap;

use heaplens_capture::{Capture, ClassId, FrameId, InstanceId, ThreadId};

use crate::tree::NodeId;

/// Key distinguishing sibling buckets under one classifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Bucket per class (also the fallback of every other rule)
    Class(ClassId),
    /// Bucket per package segment
    Package(String),
    /// Bucket per call-stack frame
    Frame(FrameId),
    /// Bucket per allocating thread
    Thread(ThreadId),
    /// Bucket per allocating native function symbol
    NativeFunction(String),
}

/// The routing rule a classifier applies to each instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierRule {
    /// No further subdivision: the owning set is a leaf
    Terminal,
    /// Group by runtime class
    ByClass,
    /// Group by the package segment at `depth`
    ByPackage {
        /// Segment index, 0 = outermost
        depth: usize,
    },
    /// Group by the call-stack frame at `depth`
    ByFrame {
        /// Frame index, 0 = innermost (allocating) frame
        depth: usize,
    },
    /// Group by allocating thread
    ByThread,
    /// Group by the allocating (innermost) function symbol
    ByNativeFunction,
}

impl ClassifierRule {
    /// Rule applied by the child set created for `key` under this rule.
    /// Class buckets are always leaves; depth-indexed rules recurse one
    /// level deeper; thread buckets open the call-stack decomposition.
    pub fn child_rule(&self, key: &BucketKey) -> ClassifierRule {
        match (self, key) {
            (_, BucketKey::Class(_)) => ClassifierRule::Terminal,
            (ClassifierRule::ByPackage { depth }, BucketKey::Package(_)) => {
                ClassifierRule::ByPackage { depth: depth + 1 }
            }
            (ClassifierRule::ByFrame { depth }, BucketKey::Frame(_)) => {
                ClassifierRule::ByFrame { depth: depth + 1 }
            }
            (ClassifierRule::ByThread, BucketKey::Thread(_)) => {
                ClassifierRule::ByFrame { depth: 0 }
            }
            (ClassifierRule::ByNativeFunction, BucketKey::NativeFunction(_)) => {
                ClassifierRule::Terminal
            }
            // A key a rule cannot produce; only reachable through misuse.
            _ => ClassifierRule::Terminal,
        }
    }
}

/// Routes instances into child buckets, creating them on demand.
/// `None` until its owning set is first partitioned.
#[derive(Debug, Clone)]
pub struct Classifier {
    rule: ClassifierRule,
    children: IndexMap<BucketKey, NodeId>,
}

impl Classifier {
    /// Create a classifier applying `rule`
    pub fn new(rule: ClassifierRule) -> Self {
        Self {
            rule,
            children: IndexMap::new(),
        }
    }

    /// The routing rule
    pub fn rule(&self) -> ClassifierRule {
        self.rule
    }

    /// Whether instances are not subdivided further
    pub fn is_terminal(&self) -> bool {
        self.rule == ClassifierRule::Terminal
    }

    /// Every child bucket regardless of filter state, in creation order
    pub fn all_classifier_sets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    /// Number of child buckets
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Existing bucket for `key`, if any
    pub fn get(&self, key: &BucketKey) -> Option<NodeId> {
        self.children.get(key).copied()
    }

    /// Record a newly created bucket for `key`
    pub fn insert(&mut self, key: BucketKey, node: NodeId) {
        let previous = self.children.insert(key, node);
        debug_assert!(previous.is_none());
    }

    /// Extract the bucket key for an instance. Returns `None` only for the
    /// terminal rule. `max_stack_depth` bounds the call-stack decomposition;
    /// beyond it instances fall back to class buckets.
    pub fn classify(
        &self,
        capture: &Capture,
        instance: InstanceId,
        max_stack_depth: usize,
    ) -> Option<BucketKey> {
        let class = capture.class_of(instance);
        match self.rule {
            ClassifierRule::Terminal => None,
            ClassifierRule::ByClass => Some(BucketKey::Class(class)),
            ClassifierRule::ByPackage { depth } => Some(
                capture
                    .package_segment(class, depth)
                    .map(|segment| BucketKey::Package(segment.to_string()))
                    .unwrap_or(BucketKey::Class(class)),
            ),
            ClassifierRule::ByFrame { depth } => {
                let frame = if depth < max_stack_depth {
                    capture.frame_at(instance, depth)
                } else {
                    None
                };
                Some(
                    frame
                        .map(BucketKey::Frame)
                        .unwrap_or(BucketKey::Class(class)),
                )
            }
            ClassifierRule::ByThread => Some(
                capture
                    .instance(instance)
                    .thread
                    .map(BucketKey::Thread)
                    .unwrap_or(BucketKey::Class(class)),
            ),
            ClassifierRule::ByNativeFunction => Some(
                capture
                    .frame_at(instance, 0)
                    .map(|frame| {
                        BucketKey::NativeFunction(capture.frame_function(frame).to_string())
                    })
                    .unwrap_or(BucketKey::Class(class)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heaplens_capture::Instance;

    fn capture_with(class_name: &str) -> (Capture, InstanceId) {
        let mut capture = Capture::new();
        let class = capture.classes_mut().register(class_name);
        let id = capture.add_instance(Instance::new(class, 0));
        (capture, id)
    }

    #[test]
    fn test_by_class() {
        let (capture, id) = capture_with("com.example.Foo");
        let classifier = Classifier::new(ClassifierRule::ByClass);
        let key = classifier.classify(&capture, id, 64).unwrap();
        assert!(matches!(key, BucketKey::Class(_)));
        assert_eq!(classifier.rule().child_rule(&key), ClassifierRule::Terminal);
    }

    #[test]
    fn test_package_falls_back_to_class() {
        let (capture, id) = capture_with("com.example.Foo");
        let depth0 = Classifier::new(ClassifierRule::ByPackage { depth: 0 });
        assert_eq!(
            depth0.classify(&capture, id, 64),
            Some(BucketKey::Package("com".to_string()))
        );

        let depth2 = Classifier::new(ClassifierRule::ByPackage { depth: 2 });
        assert!(matches!(
            depth2.classify(&capture, id, 64),
            Some(BucketKey::Class(_))
        ));
    }

    #[test]
    fn test_package_child_rule_recurses() {
        let rule = ClassifierRule::ByPackage { depth: 0 };
        let key = BucketKey::Package("com".to_string());
        assert_eq!(rule.child_rule(&key), ClassifierRule::ByPackage { depth: 1 });
    }

    #[test]
    fn test_frame_depth_capped() {
        let mut capture = Capture::new();
        let class = capture.classes_mut().register("Foo");
        let frame = capture.stacks_mut().intern_frame("alloc", None);
        let stack = capture.stacks_mut().intern_stack(vec![frame]);
        let mut instance = Instance::new(class, 0);
        instance.stack = Some(stack);
        let id = capture.add_instance(instance);

        let classifier = Classifier::new(ClassifierRule::ByFrame { depth: 0 });
        assert_eq!(
            classifier.classify(&capture, id, 64),
            Some(BucketKey::Frame(frame))
        );
        // Depth cap of zero forces the class fallback immediately.
        assert!(matches!(
            classifier.classify(&capture, id, 0),
            Some(BucketKey::Class(_))
        ));
    }

    #[test]
    fn test_thread_falls_back_without_thread() {
        let (capture, id) = capture_with("Foo");
        let classifier = Classifier::new(ClassifierRule::ByThread);
        assert!(matches!(
            classifier.classify(&capture, id, 64),
            Some(BucketKey::Class(_))
        ));
    }
}
