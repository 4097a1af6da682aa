//! Capture File Import/Export
//!
//! Reads and writes the JSON capture file format. The on-disk records are
//! plain serde structs; loading interns names into the capture tables and
//! validates heap/thread references.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::Capture;
use crate::instance::{Instance, INVALID_SIZE};

/// Errors raised while loading or saving a capture file
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("instance {index} references unknown heap id {heap}")]
    UnknownHeap { index: usize, heap: u32 },

    #[error("instance {index} references unknown thread id {thread}")]
    UnknownThread { index: usize, thread: u64 },
}

/// On-disk capture file
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureFile {
    /// Heap directory
    pub heaps: Vec<HeapRecord>,
    /// Threads observed during recording
    #[serde(default)]
    pub threads: Vec<ThreadRecord>,
    /// Allocation records
    pub instances: Vec<InstanceRecord>,
}

/// One heap in the capture file
#[derive(Debug, Serialize, Deserialize)]
pub struct HeapRecord {
    /// Raw recorder-side heap id
    pub id: u32,
    /// Display name
    pub name: String,
}

/// One thread in the capture file
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Runtime thread id
    pub id: u64,
    /// Display name
    pub name: String,
}

/// One stack frame in the capture file, innermost first within a stack
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Function or method symbol
    pub function: String,
    /// Module/library, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

fn invalid_size() -> i64 {
    INVALID_SIZE
}

/// One allocation record in the capture file
#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Fully-qualified class name
    pub class_name: String,
    /// Raw heap id (must appear in `heaps`)
    pub heap: u32,
    /// Allocation timestamp in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alloc_time: Option<i64>,
    /// Deallocation timestamp in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealloc_time: Option<i64>,
    /// Call stack at allocation, innermost frame first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<FrameRecord>,
    /// Allocating runtime thread id (must appear in `threads`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<u64>,
    /// Shallow size in bytes, -1 when unknown
    #[serde(default = "invalid_size")]
    pub shallow_size: i64,
    /// Native size in bytes, -1 when unknown
    #[serde(default = "invalid_size")]
    pub native_size: i64,
    /// Retained size in bytes, -1 when unknown
    #[serde(default = "invalid_size")]
    pub retained_size: i64,
}

/// Build a [`Capture`] from parsed file records
pub fn build_capture(file: CaptureFile) -> Result<Capture, LoaderError> {
    let mut capture = Capture::new();

    for heap in &file.heaps {
        capture.register_heap(heap.id, &heap.name);
    }
    for thread in &file.threads {
        capture.threads_mut().register(thread.id, &thread.name);
    }

    let known_heaps: Vec<u32> = file.heaps.iter().map(|h| h.id).collect();
    for (index, record) in file.instances.into_iter().enumerate() {
        if !known_heaps.contains(&record.heap) {
            return Err(LoaderError::UnknownHeap {
                index,
                heap: record.heap,
            });
        }

        let class = capture.classes_mut().register(&record.class_name);
        let mut instance = Instance::new(class, record.heap);
        instance.alloc_time = record.alloc_time;
        instance.dealloc_time = record.dealloc_time;
        instance.shallow_size = record.shallow_size;
        instance.native_size = record.native_size;
        instance.retained_size = record.retained_size;

        if !record.stack.is_empty() {
            let frames: Vec<_> = record
                .stack
                .iter()
                .map(|f| {
                    capture
                        .stacks_mut()
                        .intern_frame(&f.function, f.module.as_deref())
                })
                .collect();
            instance.stack = Some(capture.stacks_mut().intern_stack(frames));
        }

        if let Some(tid) = record.thread {
            instance.thread = Some(
                capture
                    .threads()
                    .lookup(tid)
                    .ok_or(LoaderError::UnknownThread { index, thread: tid })?,
            );
        }

        capture.add_instance(instance);
    }

    debug!(
        instances = capture.instance_count(),
        classes = capture.classes().len(),
        "capture built"
    );
    Ok(capture)
}

/// Flatten a [`Capture`] back into file records
pub fn to_file(capture: &Capture) -> CaptureFile {
    let heaps = capture
        .heap_ids()
        .map(|h| HeapRecord {
            id: capture.heap_raw_id(h),
            name: capture.heap_name(h).to_string(),
        })
        .collect();

    let threads = (0..capture.threads().len() as u32)
        .map(crate::thread::ThreadId)
        .map(|t| ThreadRecord {
            id: capture.threads().runtime_tid(t),
            name: capture.threads().name(t).to_string(),
        })
        .collect();

    let instances = capture
        .instances()
        .map(|(id, inst)| InstanceRecord {
            class_name: capture.class_fq_name(inst.class).to_string(),
            heap: inst.heap,
            alloc_time: inst.alloc_time,
            dealloc_time: inst.dealloc_time,
            stack: capture
                .stack_frames(id)
                .iter()
                .map(|&f| FrameRecord {
                    function: capture.frame_function(f).to_string(),
                    module: capture.frame_module(f).map(str::to_string),
                })
                .collect(),
            thread: inst.thread.map(|t| capture.threads().runtime_tid(t)),
            shallow_size: inst.shallow_size,
            native_size: inst.native_size,
            retained_size: inst.retained_size,
        })
        .collect();

    CaptureFile {
        heaps,
        threads,
        instances,
    }
}

/// Load a capture from a JSON file
pub fn load_capture(path: &Path) -> Result<Capture, LoaderError> {
    info!("Loading capture from {:?}", path);
    let content = fs::read_to_string(path)?;
    let file: CaptureFile = serde_json::from_str(&content)?;
    build_capture(file)
}

/// Save a capture to a JSON file
pub fn save_capture(capture: &Capture, path: &Path) -> Result<(), LoaderError> {
    info!("Saving capture to {:?}", path);
    let content = serde_json::to_string_pretty(&to_file(capture))?;
    fs::write(path, content)?;
    Ok(())
}
