//! SQLite stand-in for the hosted document store.
//!
//! Documents live in the `nodes` table as JSON text. Every write re-reads the
//! affected collection and pushes it to that user's live subscribers; with
//! [`SqliteStore::watch_external`] writes made by other processes sharing the
//! database file are pushed as well.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::{anyhow, Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::{Child, Filter, RemoteStore, Snapshot, StoreEvent, Subscription};
use crate::db;
use crate::watch::ExternalWatch;

const SELECT_COLLECTION: &str = "
SELECT key, value FROM nodes
WHERE user_id = ?1
ORDER BY key
";

const SELECT_FILTERED: &str = "
SELECT key, value FROM nodes
WHERE user_id = ?1 AND json_extract(value, ?2) IS ?3
ORDER BY key
";

const UPSERT_NODE: &str = "
INSERT INTO nodes (user_id, key, value) VALUES (?1, ?2, ?3)
ON CONFLICT(user_id, key) DO UPDATE SET
    value = excluded.value,
    updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
";

struct Subscriber {
    id: u64,
    user_id: String,
    tx: Sender<StoreEvent>,
    last: Option<Snapshot>,
}

struct Inner {
    conn: Mutex<Connection>,
    path: Option<String>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path).with_context(|| format!("failed to open store at {path}"))?;
        db::init(&conn)?;
        Ok(Self::build(conn, Some(path.to_string())))
    }

    pub fn open_memory() -> Result<Self> {
        Ok(Self::build(db::open_memory()?, None))
    }

    fn build(conn: Connection, path: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                path,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Push changes made by other processes to live subscribers.
    /// Only meaningful for file-backed stores.
    pub fn watch_external(&self) -> Result<ExternalWatch> {
        let path = self
            .inner
            .path
            .clone()
            .ok_or_else(|| anyhow!("in-memory store cannot be watched"))?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        ExternalWatch::spawn(&path, move || {
            if let Some(inner) = weak.upgrade() {
                inner.broadcast_all();
            }
        })
    }

    /// Number of live subscriptions across all users.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Number of documents in a user's collection.
    pub fn len(&self, user_id: &str) -> Result<usize> {
        Ok(self.inner.read_collection(user_id)?.len())
    }

    pub fn get(&self, user_id: &str, key: &str) -> Result<Option<Value>> {
        let conn = self.inner.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM nodes WHERE user_id = ?1 AND key = ?2",
                [user_id, key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).context("stored document is not valid JSON"))
            .transpose()
    }
}

impl Inner {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("store connection lock poisoned"))
    }

    fn read_collection(&self, user_id: &str) -> Result<Snapshot> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(SELECT_COLLECTION)?;
        let rows = stmt.query_map([user_id], read_child_row)?;
        collect_snapshot(rows)
    }

    fn read_filtered(&self, user_id: &str, filter: &Filter) -> Result<Snapshot> {
        let path = format!("$.{}", filter.child());
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(SELECT_FILTERED)?;
        let rows = stmt.query_map(
            rusqlite::params![user_id, path, sql_param(filter.value())],
            read_child_row,
        )?;
        let mut snapshot = collect_snapshot(rows)?;
        // json_extract flattens booleans to integers; keep the comparison exact.
        snapshot.children.retain(|c| filter.matches(&c.value));
        Ok(snapshot)
    }

    /// Send the current collection to every subscriber of `user_id` whose last
    /// delivered snapshot differs.
    ///
    /// The registry lock is held across the read so that concurrent broadcasts
    /// send in read order. Lock order is `subscribers` then `conn`; nothing
    /// takes them the other way round.
    fn broadcast(&self, user_id: &str) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        let event = match self.read_collection(user_id) {
            Ok(snapshot) => StoreEvent::Snapshot(snapshot),
            Err(e) => StoreEvent::Error(format!("{e:#}")),
        };
        subs.retain_mut(|sub| {
            if sub.user_id != user_id {
                return true;
            }
            if let StoreEvent::Snapshot(ref snapshot) = event {
                if sub.last.as_ref() == Some(snapshot) {
                    return true;
                }
                sub.last = Some(snapshot.clone());
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    fn broadcast_all(&self) {
        let mut users: Vec<String> = match self.subscribers.lock() {
            Ok(subs) => subs.iter().map(|s| s.user_id.clone()).collect(),
            Err(_) => return,
        };
        users.sort();
        users.dedup();
        for user in users {
            self.broadcast(&user);
        }
    }

    fn release(&self, id: u64) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|s| s.id != id);
        }
        log::debug!("released subscription {id}");
    }
}

fn read_child_row(row: &rusqlite::Row) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn collect_snapshot(
    rows: impl Iterator<Item = rusqlite::Result<(String, String)>>,
) -> Result<Snapshot> {
    let mut children = Vec::new();
    for row in rows {
        let (key, raw) = row?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("document '{key}' is not valid JSON"))?;
        children.push(Child { key, value });
    }
    Ok(Snapshot { children })
}

/// Map a JSON filter value onto what `json_extract` yields for it.
fn sql_param(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

impl RemoteStore for SqliteStore {
    fn push(&self, _user_id: &str) -> Option<String> {
        // Time-ordered so key order tracks creation order.
        Some(uuid::Uuid::now_v7().simple().to_string())
    }

    fn set_value(&self, user_id: &str, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.inner
            .conn()?
            .execute(UPSERT_NODE, rusqlite::params![user_id, key, raw])
            .with_context(|| format!("failed to write tasks/{user_id}/{key}"))?;
        log::debug!("set tasks/{user_id}/{key}");
        self.inner.broadcast(user_id);
        Ok(())
    }

    fn remove_value(&self, user_id: &str, key: &str) -> Result<()> {
        self.inner
            .conn()?
            .execute(
                "DELETE FROM nodes WHERE user_id = ?1 AND key = ?2",
                [user_id, key],
            )
            .with_context(|| format!("failed to remove tasks/{user_id}/{key}"))?;
        log::debug!("removed tasks/{user_id}/{key}");
        self.inner.broadcast(user_id);
        Ok(())
    }

    fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .map_err(|_| anyhow!("subscriber registry lock poisoned"))?
            .push(Subscriber {
                id,
                user_id: user_id.to_string(),
                tx,
                last: None,
            });
        log::debug!("subscription {id} opened on tasks/{user_id}");
        self.inner.broadcast(user_id);

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.release(id);
            }
        }))
    }

    fn query_once(&self, user_id: &str, filter: &Filter) -> Result<Snapshot> {
        self.inner.read_filtered(user_id, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn doc(title: &str, completed: bool) -> Value {
        json!({"title": title, "description": "", "completed": completed})
    }

    fn next_snapshot(sub: &Subscription) -> Snapshot {
        match sub.wait(Duration::from_secs(1)) {
            Some(StoreEvent::Snapshot(s)) => s,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn push_keys_are_unique_and_ordered() {
        let store = SqliteStore::open_memory().unwrap();
        let a = store.push("u").unwrap();
        let b = store.push("u").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a < b);
    }

    #[test]
    fn set_overwrites_whole_document() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_value("u", "k", &json!({"title": "a", "extra": 1})).unwrap();
        store.set_value("u", "k", &doc("b", true)).unwrap();
        assert_eq!(store.get("u", "k").unwrap(), Some(doc("b", true)));
        assert_eq!(store.len("u").unwrap(), 1);
    }

    #[test]
    fn collections_are_scoped_by_user() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_value("alice", "k1", &doc("a", false)).unwrap();
        store.set_value("bob", "k2", &doc("b", false)).unwrap();
        assert_eq!(store.len("alice").unwrap(), 1);
        assert!(store.get("alice", "k2").unwrap().is_none());
    }

    #[test]
    fn remove_missing_key_is_ok() {
        let store = SqliteStore::open_memory().unwrap();
        store.remove_value("u", "nope").unwrap();
    }

    #[test]
    fn subscribe_delivers_initial_then_changes() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_value("u", "k1", &doc("first", false)).unwrap();

        let sub = store.subscribe("u").unwrap();
        assert_eq!(next_snapshot(&sub).len(), 1);

        store.set_value("u", "k2", &doc("second", false)).unwrap();
        let snap = next_snapshot(&sub);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.children[1].key, "k2");

        store.remove_value("u", "k1").unwrap();
        assert_eq!(next_snapshot(&sub).len(), 1);
    }

    #[test]
    fn subscribe_to_empty_collection() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = store.subscribe("u").unwrap();
        assert!(next_snapshot(&sub).is_empty());
    }

    #[test]
    fn other_users_writes_are_not_delivered() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = store.subscribe("alice").unwrap();
        next_snapshot(&sub);
        store.set_value("bob", "k", &doc("b", false)).unwrap();
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn identical_snapshots_are_not_redelivered() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = store.subscribe("u").unwrap();
        next_snapshot(&sub);
        store.set_value("u", "k", &doc("a", false)).unwrap();
        next_snapshot(&sub);
        store.set_value("u", "k", &doc("a", false)).unwrap();
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = store.subscribe("u").unwrap();
        let sub2 = store.subscribe("u").unwrap();
        assert_eq!(store.subscriber_count(), 2);
        drop(sub);
        assert_eq!(store.subscriber_count(), 1);
        drop(sub2);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn filtered_query_is_exact_on_booleans() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_value("u", "a", &doc("done", true)).unwrap();
        store.set_value("u", "b", &doc("pending", false)).unwrap();
        store
            .set_value("u", "c", &json!({"title": "numeric", "completed": 1}))
            .unwrap();

        let done = store.query_once("u", &Filter::completed(true)).unwrap();
        let keys: Vec<_> = done.children.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a"]);

        let pending = store.query_once("u", &Filter::completed(false)).unwrap();
        let keys: Vec<_> = pending.children.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[test]
    fn concurrent_broadcasts_end_on_latest_snapshot() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = store.subscribe("u").unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let key = format!("w{w}-{i:02}");
                        store.set_value("u", &key, &doc(&key, i % 2 == 0)).unwrap();
                    }
                })
            })
            .collect();
        // Stands in for the external watch re-broadcasting at the same time.
        let rebroadcast = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    store.inner.broadcast_all();
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        rebroadcast.join().unwrap();

        let last = sub
            .drain()
            .into_iter()
            .filter_map(|ev| match ev {
                StoreEvent::Snapshot(s) => Some(s),
                StoreEvent::Error(_) => None,
            })
            .last()
            .unwrap();
        assert_eq!(last.len(), 100);
        assert_eq!(last, store.inner.read_collection("u").unwrap());
    }

    #[test]
    fn memory_store_cannot_be_watched() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.watch_external().is_err());
    }

    #[test]
    fn external_writes_reach_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todo.db");
        let path = path.to_str().unwrap();

        let ours = SqliteStore::open(path).unwrap();
        let _watch = ours.watch_external().unwrap();
        let sub = ours.subscribe("u").unwrap();
        assert!(next_snapshot(&sub).is_empty());

        // A second store on the same file stands in for another device.
        let theirs = SqliteStore::open(path).unwrap();
        theirs.set_value("u", "k", &doc("remote", false)).unwrap();

        let snap = match sub.wait(Duration::from_secs(5)) {
            Some(StoreEvent::Snapshot(s)) => s,
            other => panic!("expected snapshot, got {other:?}"),
        };
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.children[0].value["title"], "remote");
    }
}
