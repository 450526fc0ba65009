//! [`Driver`] is the narrow contract a [`crate::repository::Repository`]
//! needs from an external coordination store (etcd, Consul, ...): fetch one
//! key, list everything under the configured prefix, and stream subsequent
//! changes. [`MemoryDriver`] is an in-process test double used by the demo
//! and the integration tests -- no real etcd client is part of this crate.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::value::KeyValue;

/// A receiving half of the driver's change stream.
pub type WatchStream = mpsc::Receiver<KeyValue>;

/// The external key/value store a [`crate::repository::Repository`] is fed
/// from.
pub trait Driver: Send + Sync {
    /// Fetch a single key's current value, or `None` if it does not exist.
    async fn one(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Fetch every key currently stored (the startup snapshot).
    async fn all(&self) -> anyhow::Result<Vec<KeyValue>>;

    /// Start streaming subsequent changes. The stream ends (by dropping the
    /// sender) on graceful shutdown, or yields a [`KeyValue::fatal`] entry on
    /// an unrecoverable upstream error.
    async fn watch(&self) -> WatchStream;
}

/// An in-memory [`Driver`] for tests and the bundled demo. Calling
/// [`MemoryDriver::put`]/[`MemoryDriver::delete`] after [`Driver::watch`] has
/// been called pushes the corresponding event to every active watcher.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    watchers: Arc<Mutex<Vec<mpsc::Sender<KeyValue>>>>,
}

impl MemoryDriver {
    /// An empty driver.
    pub fn new() -> Self {
        MemoryDriver::default()
    }

    /// Seed the driver's initial snapshot (only meaningful before the first
    /// [`Driver::all`] call).
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.state.lock().insert(key.into(), value.into());
    }

    /// Upsert a key, notifying any active watchers.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        self.state.lock().insert(key.clone(), value.clone());
        self.broadcast(KeyValue::put(key, value));
    }

    /// Remove a key, notifying any active watchers.
    pub fn delete(&self, key: impl Into<String>) {
        let key = key.into();
        self.state.lock().remove(&key);
        self.broadcast(KeyValue::delete(key));
    }

    /// Push a fatal stream error to every active watcher.
    pub fn fail(&self, reason: impl Into<String>) {
        self.broadcast(KeyValue::fatal(reason));
    }

    fn broadcast(&self, event: KeyValue) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

impl Driver for MemoryDriver {
    async fn one(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.state.lock().get(key).cloned())
    }

    async fn all(&self) -> anyhow::Result<Vec<KeyValue>> {
        Ok(self
            .state
            .lock()
            .iter()
            .map(|(k, v)| KeyValue::put(k.clone(), v.clone()))
            .collect())
    }

    async fn watch(&self) -> WatchStream {
        let (tx, rx) = mpsc::channel(64);
        self.watchers.lock().push(tx);
        rx
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("keys", &self.state.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_reflects_seeded_state() {
        let driver = MemoryDriver::new();
        driver.seed("/rule/a", b"one".to_vec());
        let all = driver.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, "/rule/a");
    }

    #[tokio::test]
    async fn watchers_receive_subsequent_puts_and_deletes() {
        let driver = MemoryDriver::new();
        let mut rx = driver.watch().await;
        driver.put("/rule/a", b"one".to_vec());
        driver.delete("/rule/a");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.key, "/rule/a");
        assert!(!first.is_delete());

        let second = rx.recv().await.unwrap();
        assert!(second.is_delete());
    }

    #[tokio::test]
    async fn one_returns_none_for_missing_key() {
        let driver = MemoryDriver::new();
        assert!(driver.one("/missing").await.unwrap().is_none());
    }
}
