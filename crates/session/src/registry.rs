//! Session Registry
//!
//! Owns every open session and the shared event bus. Sessions are created
//! from loaded captures, addressed by [`SessionId`] and discarded
//! explicitly; the registry is the only place ids are minted.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::info;

use heaplens_capture::Capture;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::events::{EventBus, EventSubscription, SessionEvent};
use crate::session::{Session, SessionId};

/// All open sessions plus the bus their events flow through
pub struct SessionRegistry {
    sessions: IndexMap<SessionId, Session>,
    next_id: u32,
    bus: Arc<EventBus>,
    config: SessionConfig,
}

impl SessionRegistry {
    /// Create an empty registry with default session settings
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create an empty registry with explicit session settings
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: IndexMap::new(),
            next_id: 1,
            bus: Arc::new(EventBus::new()),
            config,
        }
    }

    /// Open a session over a loaded capture
    pub fn create_session(&mut self, capture: Capture) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        let session = Session::new(id, capture, self.config.clone(), Arc::clone(&self.bus));
        self.sessions.insert(id, session);
        info!(%id, open = self.sessions.len(), "session registered");
        self.bus.emit(SessionEvent::SessionCreated { session: id });
        id
    }

    /// Borrow an open session
    pub fn session(&self, id: SessionId) -> Result<&Session> {
        self.sessions
            .get(&id)
            .ok_or(SessionError::UnknownSession(id.0))
    }

    /// Mutably borrow an open session
    pub fn session_mut(&mut self, id: SessionId) -> Result<&mut Session> {
        self.sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id.0))
    }

    /// Discard a session, returning whether it was open
    pub fn discard_session(&mut self, id: SessionId) -> bool {
        let removed = self.sessions.shift_remove(&id).is_some();
        if removed {
            info!(%id, "session discarded");
            self.bus.emit(SessionEvent::SessionDiscarded { session: id });
        }
        removed
    }

    /// Ids of all open sessions in creation order
    pub fn session_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// The shared event bus
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
