//! HTTP API for the math tutor

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::dialogue::DialogueEngine;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Header naming the calling account. Scopes lookups only; not authentication.
pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const DEFAULT_ACCOUNT: &str = "local";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<DialogueEngine>,
    /// Renderer output directory, served under `/graph`
    pub output_dir: PathBuf,
    turns: Arc<TurnLocks>,
}

impl AppState {
    pub fn new(db: Database, engine: DialogueEngine, output_dir: PathBuf) -> Self {
        Self {
            db,
            engine: Arc::new(engine),
            output_dir,
            turns: Arc::new(TurnLocks::default()),
        }
    }
}

/// One async mutex per conversation so turns on it run one at a time.
///
/// Entries live only while a turn holds or waits on them.
#[derive(Default)]
struct TurnLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TurnLocks {
    async fn acquire(self: &Arc<Self>, conversation_id: &str) -> TurnGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_string())
            .or_default()
            .clone();
        TurnGuard {
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(self),
            conversation_id: conversation_id.to_string(),
        }
    }

    fn forget(&self, conversation_id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id);
    }

    /// Drop the entry if no turn holds or waits on it
    fn prune(&self, conversation_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(conversation_id);
        }
    }
}

/// Held for the length of a chat turn
struct TurnGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<TurnLocks>,
    conversation_id: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        // Release first so our own reference is not counted
        drop(self.guard.take());
        self.locks.prune(&self.conversation_id);
    }
}
