// ── Keyed reactive collection ──
//
// Concurrent map with a `watch` snapshot rebuilt on every mutation.
// Snapshots are ordered by key so consumers see a stable listing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

pub(crate) struct KeyedCollection<T: Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> KeyedCollection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, value: Arc<T>) -> bool {
        let is_new = self.by_key.insert(key, value).is_none();
        self.rebuild_snapshot();
        is_new
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_key.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        assert!(col.upsert("a".into(), Arc::new("x".into())));
        assert!(!col.upsert("a".into(), Arc::new("y".into())));
        assert_eq!(*col.get("a").unwrap(), "y");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_by_key() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        col.upsert("c".into(), Arc::new("3".into()));
        col.upsert("a".into(), Arc::new("1".into()));
        col.upsert("b".into(), Arc::new("2".into()));

        let values: Vec<String> = col.snapshot().iter().map(|v| (**v).clone()).collect();
        assert_eq!(values, ["1", "2", "3"]);
        assert_eq!(col.keys(), ["a", "b", "c"]);
    }

    #[test]
    fn remove_missing_key_does_not_notify() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        col.upsert("a".into(), Arc::new("x".into()));
        let rx = col.subscribe();

        assert!(col.remove("zzz").is_none());
        assert!(!rx.has_changed().unwrap());

        assert!(col.remove("a").is_some());
        assert!(rx.has_changed().unwrap());
        assert!(!col.contains("a"));
        assert!(col.snapshot().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        let mut rx = col.subscribe();

        col.upsert("a".into(), Arc::new("x".into()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
