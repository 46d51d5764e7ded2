use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, warn};

use crate::types::SessionDescriptor;

/// In-memory index of active sessions keyed by conversation identifier.
///
/// Holds zero or one entry per id. Also owns the per-conversation drain
/// locks that serialize dequeue passes against each other and against
/// session teardown for the same conversation.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionDescriptor>>,
    drain_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            drain_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a session. Replacing a live entry for the same id is a
    /// caller bug; it is logged and the new descriptor wins.
    pub fn add(&self, descriptor: SessionDescriptor) {
        let mut sessions = self.lock_sessions();
        debug!(
            chat_id = %descriptor.id,
            size = sessions.len(),
            "adding session to the registry"
        );
        if let Some(previous) = sessions.insert(descriptor.id.clone(), descriptor) {
            warn!(chat_id = %previous.id, "replaced a session that was still registered");
        }
    }

    /// Remove a session. Idempotent: removing an absent id returns `None`.
    pub fn remove(&self, chat_id: &str) -> Option<SessionDescriptor> {
        let mut sessions = self.lock_sessions();
        debug!(chat_id, size = sessions.len(), "removing session from the registry");
        sessions.remove(chat_id)
    }

    pub fn get(&self, chat_id: &str) -> Option<SessionDescriptor> {
        self.lock_sessions().get(chat_id).cloned()
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.lock_sessions().contains_key(chat_id)
    }

    /// Snapshot of all active sessions, in no particular order.
    pub fn active_sessions(&self) -> Vec<SessionDescriptor> {
        self.lock_sessions().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sessions().is_empty()
    }

    /// Drop every registered session. Service teardown path.
    pub fn clear(&self) {
        self.lock_sessions().clear();
    }

    /// The mutual-exclusion lock scoped to one conversation.
    ///
    /// Created on first use and shared by every caller asking for the same
    /// id, so scheduler passes and teardown for one conversation serialize
    /// while distinct conversations proceed concurrently.
    pub fn conversation_lock(&self, chat_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .drain_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(chat_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionDescriptor>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
