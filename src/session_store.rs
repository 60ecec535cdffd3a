//! # Session Store Module
//!
//! In-memory, per-chat session container. Sessions are never persisted.
//!
//! Two kinds of locks are involved:
//! - a synchronous map lock, held only for one read or write and never across `.await`
//! - a per-chat async lock ([`SessionStore::lock_chat`]) that the router holds while it
//!   handles one event, which keeps the events of one chat in arrival order while
//!   other chats proceed in parallel

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::dialogue::Session;

/// Shortest period the reaper ticks at
const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Entry {
    session: Session,
    touched: Instant,
}

/// Concurrency-safe keyed session container
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Entry>>,
    chat_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i64, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<i64, Arc<tokio::sync::Mutex<()>>>> {
        self.chat_locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session of a chat, or the idle session when there is none
    pub fn get(&self, chat_id: i64) -> Session {
        self.sessions()
            .get(&chat_id)
            .map(|entry| entry.session.clone())
            .unwrap_or_default()
    }

    /// Replace the session of a chat; storing an idle session removes the entry
    pub fn set(&self, chat_id: i64, session: Session) {
        let mut sessions = self.sessions();
        if session.is_idle() {
            sessions.remove(&chat_id);
            return;
        }
        sessions.insert(
            chat_id,
            Entry {
                session,
                touched: Instant::now(),
            },
        );
    }

    pub fn clear(&self, chat_id: i64) {
        if self.sessions().remove(&chat_id).is_some() {
            debug!(chat_id, "Session cleared");
        }
    }

    /// Restore the previous step of a chat's session.
    ///
    /// Without history the session is returned unchanged.
    pub fn back(&self, chat_id: i64) -> Session {
        let mut sessions = self.sessions();
        match sessions.get_mut(&chat_id) {
            Some(entry) => {
                entry.session.back();
                entry.touched = Instant::now();
                entry.session.clone()
            }
            None => Session::default(),
        }
    }

    /// Whether the chat has an active flow
    pub fn is_active(&self, chat_id: i64) -> bool {
        self.sessions().contains_key(&chat_id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Acquire the chat's event lock; hold the guard for the whole handling of one event
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks();
            Arc::clone(locks.entry(chat_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Clear sessions untouched for longer than `ttl` and drop unused chat locks
    pub fn reap_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let reaped = {
            let mut sessions = self.sessions();
            let before = sessions.len();
            sessions.retain(|_, entry| now.duration_since(entry.touched) <= ttl);
            before - sessions.len()
        };

        // A lock referenced only by the map has no waiter and no holder
        self.locks().retain(|_, lock| Arc::strong_count(lock) > 1);

        if reaped > 0 {
            info!(reaped, "Reaped idle sessions");
        }
        reaped
    }

    /// Spawn the periodic reaper task
    pub fn spawn_reaper(
        self: &Arc<Self>,
        ttl: Duration,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            // `interval` panics on a zero period
            let mut ticker = tokio::time::interval(interval.max(MIN_REAP_INTERVAL));
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.reap_idle(ttl);
            }
        })
    }
}
