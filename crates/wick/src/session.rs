//! Session lifecycle: creation on handshake, routing by id, terminal close.
//!
//! One registry instance is shared by every transport handler. Map inserts,
//! lookups, and removals are single atomic DashMap operations - nothing is
//! awaited while an entry reference is held.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::types::Implementation;

/// One streaming conversation with a peer.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub created_at: Instant,
    pub last_seen: Instant,
    /// Client implementation info, recorded by the initialize handshake.
    pub client_info: Option<Implementation>,
    pub initialized: bool,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_seen: now,
            client_info: None,
            initialized: false,
        }
    }

    pub fn idle_duration(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// Owns the session map. Ids move `absent -> active -> closed`; closed is
/// terminal and a closed id is never handed out again.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Mint a fresh session. The id is a v4 UUID; the vacancy check and
    /// insert happen under one entry lock, so two concurrent creates can
    /// never register under the same identifier.
    pub fn create(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            match self.sessions.entry(id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(Session::new(id.clone()));
                    tracing::info!(session_id = %id, "Created session");
                    return id;
                }
                // A v4 collision is not expected; pick again rather than
                // clobbering a live conversation.
                Entry::Occupied(_) => continue,
            }
        }
    }

    /// Whether this id names a live session.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Refresh the activity timestamp. Returns false for unknown ids.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Record the completed initialize handshake.
    pub fn set_initialized(&self, id: &str, client_info: Implementation) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            tracing::info!(
                session_id = %id,
                client_name = %client_info.name,
                client_version = %client_info.version,
                "Session initialized"
            );
            session.initialized = true;
            session.client_info = Some(client_info);
            session.last_seen = Instant::now();
        }
    }

    /// Close a session. The id is retired permanently; any later request
    /// bearing it is treated as unknown. Returns false if it wasn't live.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session closed");
        }
        removed
    }

    /// Retire sessions idle longer than `max_idle`. Returns how many.
    pub fn cleanup(&self, max_idle: Duration) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_duration() > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in stale {
            if self.sessions.remove(&id).is_some() {
                tracing::info!(session_id = %id, "Removed idle session");
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Periodically retire idle sessions until cancelled.
pub fn spawn_cleanup_task(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    max_idle: Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = registry.cleanup(max_idle);
                    if removed > 0 {
                        tracing::info!(removed, remaining = registry.len(), "Session cleanup pass");
                    }
                }
            }
        }
    })
}
