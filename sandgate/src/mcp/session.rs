//! SSE session registry
//!
//! Each open `GET /sse` stream owns one entry: the sending half of a bounded
//! channel plus a heartbeat task. The map sits behind a synchronous lock that
//! is never held across an await point, so `close` can run from `Drop`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SessionConfig;

/// Event sent over an SSE stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// Serialized JSON-RPC response envelope
    Message(String),
    /// Keep-alive frame
    Heartbeat,
}

/// Session error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Too many concurrent sessions")]
    TooManySessions,
}

struct SessionEntry {
    sender: mpsc::Sender<SseEvent>,
    heartbeat: JoinHandle<()>,
}

struct Inner {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    max_sessions: usize,
    channel_capacity: usize,
    heartbeat_interval: Duration,
}

/// Registry of live SSE sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: RwLock::new(HashMap::new()),
                max_sessions: config.max_sessions,
                channel_capacity: config.channel_capacity.max(1),
                heartbeat_interval: config.heartbeat_interval(),
            }),
        }
    }

    /// Open a new session and return its id with the receiving half.
    ///
    /// Must be called from within a Tokio runtime: the heartbeat task is
    /// spawned here.
    pub fn open(&self) -> Result<(String, mpsc::Receiver<SseEvent>), SessionError> {
        let (tx, rx) = mpsc::channel(self.inner.channel_capacity);

        let id = {
            let mut sessions = self.inner.sessions.write();
            if sessions.len() >= self.inner.max_sessions {
                return Err(SessionError::TooManySessions);
            }

            let mut id = Uuid::new_v4().to_string();
            while sessions.contains_key(&id) {
                id = Uuid::new_v4().to_string();
            }

            let heartbeat = spawn_heartbeat(
                Arc::downgrade(&self.inner),
                id.clone(),
                tx.clone(),
                self.inner.heartbeat_interval,
            );
            sessions.insert(
                id.clone(),
                SessionEntry {
                    sender: tx,
                    heartbeat,
                },
            );
            crate::metrics::set_active_sessions(sessions.len());
            id
        };

        crate::metrics::record_session_opened();
        tracing::info!(session_id = %id, "session opened");
        Ok((id, rx))
    }

    /// Sender for a live session, or `None` when it does not exist
    pub fn resolve(&self, id: &str) -> Option<mpsc::Sender<SseEvent>> {
        self.inner
            .sessions
            .read()
            .get(id)
            .map(|entry| entry.sender.clone())
    }

    /// Remove a session and stop its heartbeat. Returns whether it existed.
    pub fn close(&self, id: &str) -> bool {
        close_inner(&self.inner, id)
    }

    /// Number of live sessions
    pub fn active_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Whether a running heartbeat task exists for `id`
    pub fn has_heartbeat(&self, id: &str) -> bool {
        self.inner
            .sessions
            .read()
            .get(id)
            .map(|entry| !entry.heartbeat.is_finished())
            .unwrap_or(false)
    }

    /// Guard that closes `id` when dropped
    pub fn guard(&self, id: String) -> SessionGuard {
        SessionGuard {
            registry: self.clone(),
            id,
        }
    }
}

fn close_inner(inner: &Inner, id: &str) -> bool {
    let removed = {
        let mut sessions = inner.sessions.write();
        let removed = sessions.remove(id);
        crate::metrics::set_active_sessions(sessions.len());
        removed
    };

    match removed {
        Some(entry) => {
            entry.heartbeat.abort();
            tracing::info!(session_id = %id, "session closed");
            true
        }
        None => false,
    }
}

fn spawn_heartbeat(
    registry: Weak<Inner>,
    id: String,
    sender: mpsc::Sender<SseEvent>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if sender.send(SseEvent::Heartbeat).await.is_err() {
                tracing::debug!(session_id = %id, "heartbeat failed, closing session");
                if let Some(inner) = registry.upgrade() {
                    close_inner(&inner, &id);
                }
                break;
            }
        }
    })
}

/// Closes its session when the owning SSE stream is dropped
pub struct SessionGuard {
    registry: SessionRegistry,
    id: String,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(&SessionConfig {
            heartbeat_interval_secs: 5,
            channel_capacity: 8,
            max_sessions,
        })
    }

    #[tokio::test]
    async fn test_open_and_resolve() {
        let reg = registry(10);
        let (id, mut rx) = reg.open().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let tx = reg.resolve(&id).unwrap();
        tx.send(SseEvent::Message("hello".into())).await.unwrap();
        assert_eq!(rx.recv().await, Some(SseEvent::Message("hello".into())));

        assert!(reg.resolve("no-such-session").is_none());
    }

    #[tokio::test]
    async fn test_close_removes_entry_and_heartbeat() {
        let reg = registry(10);
        let (id, mut rx) = reg.open().unwrap();
        assert!(reg.has_heartbeat(&id));
        assert_eq!(reg.active_count(), 1);

        assert!(reg.close(&id));
        assert!(reg.resolve(&id).is_none());
        assert!(!reg.has_heartbeat(&id));
        assert_eq!(reg.active_count(), 0);

        // Idempotent
        assert!(!reg.close(&id));

        // All senders are gone, so the stream ends
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_opens_are_distinct() {
        let reg = registry(1000);
        let mut handles = Vec::new();
        for _ in 0..50 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.open().unwrap() }));
        }

        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }

        let ids: HashSet<String> = sessions.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(reg.active_count(), 50);

        // Each sender reaches its own receiver only
        for (id, _) in &sessions {
            reg.resolve(id)
                .unwrap()
                .send(SseEvent::Message(id.clone()))
                .await
                .unwrap();
        }
        for (id, rx) in sessions.iter_mut() {
            assert_eq!(rx.recv().await, Some(SseEvent::Message(id.clone())));
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_max_sessions() {
        let reg = registry(2);
        let _a = reg.open().unwrap();
        let _b = reg.open().unwrap();
        assert_eq!(reg.open().unwrap_err(), SessionError::TooManySessions);
    }

    #[tokio::test]
    async fn test_guard_closes_on_drop() {
        let reg = registry(10);
        let (id, _rx) = reg.open().unwrap();
        {
            let guard = reg.guard(id.clone());
            assert_eq!(guard.id(), id);
        }
        assert!(reg.resolve(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_frames() {
        let reg = registry(10);
        let (_id, mut rx) = reg.open().unwrap();

        assert_eq!(rx.recv().await, Some(SseEvent::Heartbeat));
        assert_eq!(rx.recv().await, Some(SseEvent::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_closes_session_when_receiver_gone() {
        let reg = registry(10);
        let (id, rx) = reg.open().unwrap();
        drop(rx);

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(reg.resolve(&id).is_none());
        assert_eq!(reg.active_count(), 0);
    }
}
