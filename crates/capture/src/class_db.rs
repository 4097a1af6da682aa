//! Class Registry
//!
//! Interns fully-qualified class names and pre-splits their package
//! segments so classification can index into them by depth.

use indexmap::IndexMap;

/// Stable handle to a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

#[derive(Debug, Clone)]
struct ClassEntry {
    /// Fully-qualified name, e.g. "com.example.Foo"
    fq_name: String,
    /// Package segments, e.g. ["com", "example"]
    package: Vec<String>,
    /// Byte offset of the simple name inside `fq_name`
    simple_offset: usize,
}

/// Registry of all classes referenced by a capture.
///
/// Class names are deduplicated on registration; the returned [`ClassId`]
/// is stable for the lifetime of the capture.
#[derive(Debug, Clone, Default)]
pub struct ClassDb {
    entries: Vec<ClassEntry>,
    by_name: IndexMap<String, ClassId>,
}

impl ClassDb {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class by fully-qualified name, returning its id.
    /// Registering the same name twice returns the original id.
    pub fn register(&mut self, fq_name: &str) -> ClassId {
        if let Some(&id) = self.by_name.get(fq_name) {
            return id;
        }
        let simple_offset = fq_name.rfind('.').map(|i| i + 1).unwrap_or(0);
        let package = if simple_offset == 0 {
            Vec::new()
        } else {
            fq_name[..simple_offset - 1]
                .split('.')
                .map(str::to_string)
                .collect()
        };
        let id = ClassId(self.entries.len() as u32);
        self.entries.push(ClassEntry {
            fq_name: fq_name.to_string(),
            package,
            simple_offset,
        });
        self.by_name.insert(fq_name.to_string(), id);
        id
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fully-qualified name of a class
    pub fn fq_name(&self, id: ClassId) -> &str {
        &self.entries[id.0 as usize].fq_name
    }

    /// Simple (unqualified) name of a class
    pub fn simple_name(&self, id: ClassId) -> &str {
        let entry = &self.entries[id.0 as usize];
        &entry.fq_name[entry.simple_offset..]
    }

    /// Package segment at `depth`, or `None` once the package is exhausted.
    /// Depth 0 is the outermost segment ("com" in "com.example.Foo").
    pub fn package_segment(&self, id: ClassId, depth: usize) -> Option<&str> {
        self.entries[id.0 as usize].package.get(depth).map(String::as_str)
    }

    /// Number of package segments for a class
    pub fn package_depth(&self, id: ClassId) -> usize {
        self.entries[id.0 as usize].package.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deduplicates() {
        let mut db = ClassDb::new();
        let a = db.register("com.example.Foo");
        let b = db.register("com.example.Foo");
        let c = db.register("com.example.Bar");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_package_segments() {
        let mut db = ClassDb::new();
        let id = db.register("com.example.Foo");

        assert_eq!(db.fq_name(id), "com.example.Foo");
        assert_eq!(db.simple_name(id), "Foo");
        assert_eq!(db.package_depth(id), 2);
        assert_eq!(db.package_segment(id, 0), Some("com"));
        assert_eq!(db.package_segment(id, 1), Some("example"));
        assert_eq!(db.package_segment(id, 2), None);
    }

    #[test]
    fn test_default_package() {
        let mut db = ClassDb::new();
        let id = db.register("Foo");

        assert_eq!(db.simple_name(id), "Foo");
        assert_eq!(db.package_depth(id), 0);
        assert_eq!(db.package_segment(id, 0), None);
    }
}
