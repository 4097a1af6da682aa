//! Heaplens Sessions
//!
//! A session binds one loaded capture to its live view state: a selection
//! window over the recording timeline, per-heap classifier trees, grouping
//! and filter choices. The registry owns all open sessions and broadcasts
//! their lifecycle over an event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use events::{EventBus, EventSubscription, SessionEvent};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId};
