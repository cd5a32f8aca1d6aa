// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage for photo embedding vectors.
//!
//! The store keeps exactly one record per `(asset_id, model_name)` pair.
//! Records are grouped per model into copy-on-write shelves so that search
//! can take an atomic snapshot without blocking concurrent upserts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier of a photo in the source library.
pub type AssetId = String;

/// Represents a stored photo embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoEmbedding {
    /// Identifier of the photo in the source library
    pub asset_id: AssetId,
    /// Encoder that produced the vector (e.g. "MobileCLIP-S2")
    pub model_name: String,
    /// Unit-length embedding vector
    pub vector: Vec<f32>,
    /// Unix timestamp when this embedding was computed
    pub updated_at: i64,
}

impl PhotoEmbedding {
    /// Creates a record stamped with the current time.
    pub fn new(
        asset_id: impl Into<AssetId>,
        model_name: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            model_name: model_name.into(),
            vector,
            updated_at: unix_now(),
        }
    }
}

/// Repository contract for embedding records.
///
/// Implementations must serialize mutations. `snapshot` must return the
/// committed state at some instant and never observe a half-applied upsert.
pub trait EmbeddingStore: Send + Sync {
    /// Inserts the record, replacing any existing one for the same asset and model.
    fn upsert(&self, embedding: PhotoEmbedding);

    /// Returns every record for `model_name` in enumeration order.
    fn get_all(&self, model_name: &str) -> Vec<PhotoEmbedding>;

    /// Returns true if `asset_id` has a record for `model_name`.
    fn contains(&self, asset_id: &str, model_name: &str) -> bool;

    /// Number of indexed assets for `model_name`.
    fn count(&self, model_name: &str) -> usize;

    /// Atomic view of the committed records for `model_name`.
    fn snapshot(&self, model_name: &str) -> EmbeddingSnapshot;

    /// Removes the record for `asset_id`, returning whether one existed.
    fn remove(&self, asset_id: &str, model_name: &str) -> bool;

    /// Removes every listed record, returning how many existed.
    fn remove_many(&self, asset_ids: &[AssetId], model_name: &str) -> usize {
        asset_ids
            .iter()
            .filter(|id| self.remove(id, model_name))
            .count()
    }

    /// Lists indexed asset ids for `model_name` in enumeration order.
    fn asset_ids(&self, model_name: &str) -> Vec<AssetId> {
        self.snapshot(model_name)
            .iter()
            .map(|record| record.asset_id.clone())
            .collect()
    }
}

/// Records of one model, with an id lookup table into `records`.
#[derive(Debug, Clone, Default)]
struct Shelf {
    records: Vec<PhotoEmbedding>,
    positions: HashMap<AssetId, usize>,
}

impl Shelf {
    fn upsert(&mut self, embedding: PhotoEmbedding) {
        match self.positions.get(&embedding.asset_id) {
            Some(&pos) => self.records[pos] = embedding,
            None => {
                self.positions
                    .insert(embedding.asset_id.clone(), self.records.len());
                self.records.push(embedding);
            }
        }
    }

    fn remove(&mut self, asset_id: &str) -> bool {
        let Some(pos) = self.positions.remove(asset_id) else {
            return false;
        };
        self.records.remove(pos);
        for record in &self.records[pos..] {
            if let Some(p) = self.positions.get_mut(&record.asset_id) {
                *p -= 1;
            }
        }
        true
    }

    /// Drops every record in `doomed` with one pass over the shelf.
    fn remove_all(&mut self, doomed: &HashSet<&str>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| !doomed.contains(record.asset_id.as_str()));
        let removed = before - self.records.len();
        if removed > 0 {
            self.positions = self
                .records
                .iter()
                .enumerate()
                .map(|(pos, record)| (record.asset_id.clone(), pos))
                .collect();
        }
        removed
    }
}

/// Cheaply cloneable, immutable view of one model's records.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSnapshot {
    shelf: Arc<Shelf>,
}

impl EmbeddingSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &PhotoEmbedding> + '_ {
        self.shelf.records.iter()
    }

    pub fn len(&self) -> usize {
        self.shelf.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shelf.records.is_empty()
    }

    /// Looks up the record for `asset_id`.
    pub fn get(&self, asset_id: &str) -> Option<&PhotoEmbedding> {
        self.shelf
            .positions
            .get(asset_id)
            .map(|&pos| &self.shelf.records[pos])
    }
}

/// Process-local embedding store. Discarded when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    shelves: RwLock<HashMap<String, Arc<Shelf>>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Shelf>>> {
        // A panic while holding the lock cannot leave a shelf half-written:
        // writers only swap in fully built values.
        self.shelves.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Shelf>>> {
        self.shelves.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn upsert(&self, embedding: PhotoEmbedding) {
        let mut shelves = self.write();
        let shelf = shelves.entry(embedding.model_name.clone()).or_default();
        Arc::make_mut(shelf).upsert(embedding);
    }

    fn get_all(&self, model_name: &str) -> Vec<PhotoEmbedding> {
        self.snapshot(model_name).iter().cloned().collect()
    }

    fn contains(&self, asset_id: &str, model_name: &str) -> bool {
        self.read()
            .get(model_name)
            .is_some_and(|shelf| shelf.positions.contains_key(asset_id))
    }

    fn count(&self, model_name: &str) -> usize {
        self.read()
            .get(model_name)
            .map_or(0, |shelf| shelf.records.len())
    }

    fn snapshot(&self, model_name: &str) -> EmbeddingSnapshot {
        let shelf = self.read().get(model_name).cloned().unwrap_or_default();
        EmbeddingSnapshot { shelf }
    }

    fn remove(&self, asset_id: &str, model_name: &str) -> bool {
        let mut shelves = self.write();
        match shelves.get_mut(model_name) {
            Some(shelf) if shelf.positions.contains_key(asset_id) => {
                Arc::make_mut(shelf).remove(asset_id)
            }
            _ => false,
        }
    }

    fn remove_many(&self, asset_ids: &[AssetId], model_name: &str) -> usize {
        let mut shelves = self.write();
        let Some(shelf) = shelves.get_mut(model_name) else {
            return 0;
        };
        let doomed: HashSet<&str> = asset_ids
            .iter()
            .map(String::as_str)
            .filter(|id| shelf.positions.contains_key(*id))
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        Arc::make_mut(shelf).remove_all(&doomed)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "MobileCLIP-S2";

    fn record(id: &str, model: &str, vector: Vec<f32>) -> PhotoEmbedding {
        PhotoEmbedding {
            asset_id: id.to_string(),
            model_name: model.to_string(),
            vector,
            updated_at: 1000,
        }
    }

    #[test]
    fn test_upsert_and_contains() {
        let store = InMemoryEmbeddingStore::new();
        assert!(!store.contains("a", MODEL));

        store.upsert(record("a", MODEL, vec![1.0, 0.0]));

        assert!(store.contains("a", MODEL));
        assert!(!store.contains("a", "other-model"));
        assert_eq!(store.count(MODEL), 1);
        assert_eq!(store.count("other-model"), 0);
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let store = InMemoryEmbeddingStore::new();
        let e1 = record("a", MODEL, vec![1.0, 0.0]);
        let mut e2 = record("a", MODEL, vec![0.0, 1.0]);
        e2.updated_at = 2000;

        store.upsert(e1);
        store.upsert(e2.clone());

        let all = store.get_all(MODEL);
        assert_eq!(all, vec![e2]);
    }

    #[test]
    fn test_replace_keeps_enumeration_position() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert(record("a", MODEL, vec![1.0]));
        store.upsert(record("b", MODEL, vec![1.0]));
        store.upsert(record("a", MODEL, vec![-1.0]));

        let ids = store.asset_ids(MODEL);
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get_all(MODEL)[0].vector, vec![-1.0]);
    }

    #[test]
    fn test_models_are_kept_apart() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert(record("a", MODEL, vec![1.0, 0.0]));
        store.upsert(record("a", "other-model", vec![0.0, 1.0, 0.0]));

        assert_eq!(store.count(MODEL), 1);
        assert_eq!(store.count("other-model"), 1);
        assert_eq!(store.get_all("other-model")[0].vector.len(), 3);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_upserts() {
        let store = InMemoryEmbeddingStore::new();
        store.upsert(record("a", MODEL, vec![1.0]));

        let snapshot = store.snapshot(MODEL);
        store.upsert(record("b", MODEL, vec![1.0]));
        store.upsert(record("a", MODEL, vec![-1.0]));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a").unwrap().vector, vec![1.0]);
        assert_eq!(store.snapshot(MODEL).len(), 2);
    }

    #[test]
    fn test_remove_reindexes_positions() {
        let store = InMemoryEmbeddingStore::new();
        for id in ["a", "b", "c"] {
            store.upsert(record(id, MODEL, vec![1.0]));
        }

        assert!(store.remove("a", MODEL));
        assert!(!store.remove("a", MODEL));
        assert!(!store.remove("a", "other-model"));

        let snapshot = store.snapshot(MODEL);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("c").unwrap().asset_id, "c");

        store.upsert(record("c", MODEL, vec![-1.0]));
        assert_eq!(store.asset_ids(MODEL), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(store.get_all(MODEL)[1].vector, vec![-1.0]);
    }

    #[test]
    fn test_remove_many_in_one_write() {
        let store = InMemoryEmbeddingStore::new();
        for id in ["a", "b", "c", "d"] {
            store.upsert(record(id, MODEL, vec![1.0]));
        }
        let snapshot = store.snapshot(MODEL);

        let doomed = vec!["b".to_string(), "d".to_string(), "zzz".to_string()];
        assert_eq!(store.remove_many(&doomed, MODEL), 2);
        assert_eq!(store.remove_many(&doomed, "other-model"), 0);

        assert_eq!(store.asset_ids(MODEL), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(store.snapshot(MODEL).get("c").unwrap().asset_id, "c");
        assert_eq!(snapshot.len(), 4);

        store.upsert(record("c", MODEL, vec![-1.0]));
        assert_eq!(store.get_all(MODEL)[1].vector, vec![-1.0]);
    }

    #[test]
    fn test_concurrent_upserts_never_duplicate() {
        let store = Arc::new(InMemoryEmbeddingStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.upsert(record(&format!("asset-{}", i), MODEL, vec![t as f32]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(MODEL), 50);
    }
}
