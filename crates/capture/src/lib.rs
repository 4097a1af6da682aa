//! Heaplens Capture Model
//!
//! Data model for a recorded heap capture: interned class, call-stack and
//! thread tables, the allocation instance records that reference them, and
//! JSON import/export of capture files.

pub mod capture;
pub mod class_db;
pub mod instance;
pub mod loader;
pub mod stack;
pub mod thread;

pub use capture::{Capture, HeapId};
pub use class_db::{ClassDb, ClassId};
pub use instance::{valid_or_zero, Instance, InstanceId, INVALID_SIZE};
pub use loader::{load_capture, save_capture, LoaderError};
pub use stack::{FrameId, StackFrame, StackId, StackTable};
pub use thread::{ThreadId, ThreadTable};
