//! Concurrent map of live sessions
//!
//! Each session sits behind its own async mutex. The engine holds that lock
//! for the whole of a command, including any storage calls, so commands for
//! one session are serialized while unrelated sessions proceed in parallel.

use crate::storage::UserId;
use crate::trade::session::{LiveTradeSession, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// Shared, lockable session
pub type SessionRef = Arc<Mutex<LiveTradeSession>>;

#[derive(Debug, Clone)]
struct Entry {
    initiator: UserId,
    target: UserId,
    session: SessionRef,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    entries: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new session and return its lockable handle
    pub fn insert(&self, session: LiveTradeSession) -> SessionRef {
        let id = session.id.clone();
        let entry = Entry {
            initiator: session.initiator.user_id,
            target: session.target.user_id,
            session: Arc::new(Mutex::new(session)),
        };
        let handle = entry.session.clone();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionRef> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|e| e.session.clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Sessions in which `user_id` is either participant
    pub fn sessions_for(&self, user_id: UserId) -> Vec<(SessionId, SessionRef)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, e)| e.initiator == user_id || e.target == user_id)
            .map(|(id, e)| (id.clone(), e.session.clone()))
            .collect()
    }

    /// Snapshot of every session handle
    pub fn all(&self) -> Vec<(SessionId, SessionRef)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, e)| (id.clone(), e.session.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::session::Participant;

    fn session(initiator: UserId, target: UserId) -> LiveTradeSession {
        LiveTradeSession::new(
            Participant::new(initiator, format!("u{}", initiator)),
            Participant::new(target, format!("u{}", target)),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let table = SessionTable::new();
        let s = session(1, 2);
        let id = s.id.clone();
        table.insert(s);

        let handle = table.get(&id).unwrap();
        assert_eq!(handle.lock().await.initiator.user_id, 1);
        assert_eq!(table.len(), 1);

        assert!(table.remove(&id));
        assert!(!table.remove(&id));
        assert!(table.get(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_sessions_for_matches_either_side() {
        let table = SessionTable::new();
        table.insert(session(1, 2));
        table.insert(session(3, 1));
        table.insert(session(3, 4));

        assert_eq!(table.sessions_for(1).len(), 2);
        assert_eq!(table.sessions_for(4).len(), 1);
        assert!(table.sessions_for(9).is_empty());
        assert_eq!(table.all().len(), 3);
    }
}
