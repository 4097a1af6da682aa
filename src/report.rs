//! Report Rendering
//!
//! Text and CSV renderings of a heap's classifier tree, for terminal output
//! and spreadsheet export.

use std::io::Write;

use heaplens_capture::Capture;
use heaplens_classifier::{HeapSet, NodeId, ROOT};

/// One flattened classifier row, produced in depth-first order
#[derive(Debug, Clone)]
pub struct ReportRow {
    /// Nesting depth, 0 = the heap root
    pub depth: usize,
    /// Display name of the classifier set
    pub name: String,
    /// Live object count
    pub total: i64,
    /// Allocations within the selection window
    pub allocations: i64,
    /// Deallocations within the selection window
    pub deallocations: i64,
    /// Shallow size of live objects in bytes
    pub shallow_size: i64,
}

/// Flatten a heap's visible classifier sets depth-first
pub fn classifier_rows(capture: &Capture, heap_set: &mut HeapSet) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    collect_rows(capture, heap_set, ROOT, 0, &mut rows);
    rows
}

fn collect_rows(
    capture: &Capture,
    heap_set: &mut HeapSet,
    id: NodeId,
    depth: usize,
    rows: &mut Vec<ReportRow>,
) {
    let node = heap_set.node(id);
    let stats = *node.stats();
    rows.push(ReportRow {
        depth,
        name: node.name().to_string(),
        total: stats.total_object_count(),
        allocations: stats.delta_allocations,
        deallocations: stats.delta_deallocations,
        shallow_size: stats.total_shallow_size,
    });
    for child in heap_set.child_sets(capture, id) {
        collect_rows(capture, heap_set, child, depth + 1, rows);
    }
}

/// Render a heap's tree as indented text
pub fn render_heap(capture: &Capture, heap_set: &mut HeapSet) -> String {
    let mut out = String::new();
    for row in classifier_rows(capture, heap_set) {
        let indent = "  ".repeat(row.depth);
        out.push_str(&format!(
            "{}{}  total={} allocs={} frees={} shallow={}\n",
            indent, row.name, row.total, row.allocations, row.deallocations, row.shallow_size
        ));
    }
    out
}

/// Write the flattened rows as CSV
pub fn write_csv<W: Write>(
    capture: &Capture,
    heap_set: &mut HeapSet,
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "depth,name,total,allocations,deallocations,shallow_size"
    )?;
    for row in classifier_rows(capture, heap_set) {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            row.depth,
            csv_escape(&row.name),
            row.total,
            row.allocations,
            row.deallocations,
            row.shallow_size
        )?;
    }
    Ok(())
}

/// Write the subtree's deduplicated instances as CSV, one row per instance
pub fn write_instances_csv<W: Write>(
    capture: &Capture,
    heap_set: &HeapSet,
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "class,alloc_time,dealloc_time,shallow_size,native_size"
    )?;
    for id in heap_set.tree().instances(ROOT) {
        let instance = capture.instance(id);
        writeln!(
            writer,
            "{},{},{},{},{}",
            csv_escape(capture.class_fq_name(instance.class)),
            opt_time(instance.alloc_time),
            opt_time(instance.dealloc_time),
            instance.shallow_or_zero(),
            instance.native_or_zero()
        )?;
    }
    Ok(())
}

fn opt_time(time: Option<i64>) -> String {
    time.map(|t| t.to_string()).unwrap_or_default()
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heaplens_capture::{HeapId, Instance};

    fn populated() -> (Capture, HeapSet) {
        let mut capture = Capture::new();
        capture.register_heap(1, "app");
        let mut heap_set = HeapSet::new(HeapId(0), "app");
        for name in ["com.x.Foo", "com.x.Foo", "com.y.Bar"] {
            let class = capture.classes_mut().register(name);
            let mut instance = Instance::new(class, 1);
            instance.shallow_size = 8;
            let id = capture.add_instance(instance);
            heap_set
                .tree_mut()
                .add_snapshot_instance(&capture, heaplens_classifier::ROOT, id);
        }
        (capture, heap_set)
    }

    #[test]
    fn test_rows_are_depth_first() {
        let (capture, mut heap_set) = populated();
        let rows = classifier_rows(&capture, &mut heap_set);
        assert_eq!(rows[0].name, "app");
        assert_eq!(rows[0].depth, 0);
        assert_eq!(rows[0].total, 3);
        let foo = rows.iter().find(|r| r.name == "Foo").unwrap();
        assert_eq!(foo.total, 2);
        assert_eq!(foo.depth, 1);
    }

    #[test]
    fn test_render_heap_indents() {
        let (capture, mut heap_set) = populated();
        let text = render_heap(&capture, &mut heap_set);
        assert!(text.starts_with("app  total=3"));
        assert!(text.contains("\n  Foo  total=2"));
        assert!(text.contains("\n  Bar  total=1"));
    }

    #[test]
    fn test_instances_csv() {
        let (capture, heap_set) = populated();
        let mut buffer = Vec::new();
        write_instances_csv(&capture, &heap_set, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("class,alloc_time"));
        assert_eq!(text.matches("com.x.Foo").count(), 2);
        assert!(text.contains("com.y.Bar,,,8,0"));
    }

    #[test]
    fn test_csv_output_and_escaping() {
        let (capture, mut heap_set) = populated();
        let mut buffer = Vec::new();
        write_csv(&capture, &mut heap_set, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("depth,name,total"));
        assert!(text.contains("1,Foo,2,0,0,16"));

        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
