//! The document store the task list is synchronized against.
//!
//! Collections are addressed by user id; each child is a JSON document under a
//! store-generated key. Writes are acknowledged by returning; continuous
//! subscriptions deliver full snapshots over a channel that the owner drains
//! on its own thread.

pub mod sqlite;

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

/// One child of a collection: storage key plus its document.
#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub key: String,
    pub value: Value,
}

/// Point-in-time materialization of a user's collection, in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub children: Vec<Child>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// What a continuous subscription delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Snapshot(Snapshot),
    Error(String),
}

/// Server-side equality filter on a direct child field of each document.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    child: String,
    equal_to: Value,
}

impl Filter {
    pub fn completed(completed: bool) -> Self {
        Self {
            child: "completed".to_string(),
            equal_to: Value::Bool(completed),
        }
    }

    pub fn child(&self) -> &str {
        &self.child
    }

    pub fn value(&self) -> &Value {
        &self.equal_to
    }

    pub fn matches(&self, doc: &Value) -> bool {
        doc.get(&self.child) == Some(&self.equal_to)
    }
}

/// An open continuous subscription. Dropping it releases the listener on the
/// store side.
pub struct Subscription {
    rx: Receiver<StoreEvent>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: Receiver<StoreEvent>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Drain every event that has already arrived.
    pub fn drain(&self) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(ev) => events.push(ev),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Wait up to `timeout` for the next event.
    /// Returns None on timeout or when the store has gone away.
    pub fn wait(&self, timeout: Duration) -> Option<StoreEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

pub trait RemoteStore {
    /// Generate a fresh unique key in the user's collection. Nothing is written.
    fn push(&self, user_id: &str) -> Option<String>;

    /// Overwrite the whole document at `key`.
    fn set_value(&self, user_id: &str, key: &str, value: &Value) -> Result<()>;

    fn remove_value(&self, user_id: &str, key: &str) -> Result<()>;

    /// Open a continuous subscription on the user's collection. The current
    /// snapshot is delivered immediately, then one per change.
    fn subscribe(&self, user_id: &str) -> Result<Subscription>;

    /// One-shot filtered read; not kept open.
    fn query_once(&self, user_id: &str, filter: &Filter) -> Result<Snapshot>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn push(&self, user_id: &str) -> Option<String> {
        (**self).push(user_id)
    }

    fn set_value(&self, user_id: &str, key: &str, value: &Value) -> Result<()> {
        (**self).set_value(user_id, key, value)
    }

    fn remove_value(&self, user_id: &str, key: &str) -> Result<()> {
        (**self).remove_value(user_id, key)
    }

    fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        (**self).subscribe(user_id)
    }

    fn query_once(&self, user_id: &str, filter: &Filter) -> Result<Snapshot> {
        (**self).query_once(user_id, filter)
    }
}
