//! Session table for the server-push (SSE) transport.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming the URL
//! it must post its requests to. Responses to those posts travel back as
//! `message` events on the stream. A session lives exactly as long as its
//! stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::http::JsonRpcResponse;

/// Buffered responses per session before senders wait.
const SESSION_BUFFER: usize = 32;

/// Registry of open SSE sessions. Cheap to clone.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, mpsc::Sender<JsonRpcResponse>>>>,
}

/// Removes its session from the registry when dropped.
pub struct SessionGuard {
    registry: SessionRegistry,
    id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        debug!(session_id = %self.id, "SSE session closed");
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session.
    pub fn open(&self) -> (Uuid, mpsc::Receiver<JsonRpcResponse>, SessionGuard) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);

        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, tx);
        }
        debug!(session_id = %id, "SSE session opened");

        let guard = SessionGuard {
            registry: self.clone(),
            id,
        };
        (id, rx, guard)
    }

    /// Whether `id` names an open session.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(id))
            .unwrap_or(false)
    }

    /// Queue `response` on the session's stream.
    ///
    /// Returns `false` when the session is gone.
    pub async fn send(&self, id: &Uuid, response: JsonRpcResponse) -> bool {
        let sender = match self.sessions.lock() {
            Ok(sessions) => sessions.get(id).cloned(),
            Err(_) => None,
        };

        match sender {
            Some(tx) => tx.send(response).await.is_ok(),
            None => {
                warn!(session_id = %id, "Dropping response for closed session");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &Uuid) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(id);
        }
    }
}

/// Query string naming a session, e.g. `/messages/?session_id=<uuid>`.
pub fn endpoint_for(messages_path: &str, id: &Uuid) -> String {
    let query = serde_urlencoded::to_string([("session_id", id.to_string())])
        .unwrap_or_else(|_| format!("session_id={}", id));
    format!("{}?{}", messages_path, query)
}
