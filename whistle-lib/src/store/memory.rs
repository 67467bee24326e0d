use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::embed::Embedding;
use crate::store::{BackendRecord, Metadata, QueryHit, VectorBackend};
use crate::{Error, Result};

/// In-memory vector backend for development and testing.
///
/// Uses brute-force cosine similarity search. Suitable for small datasets
/// such as a single rulebook; for a shared deployment use [`ChromaBackend`].
///
/// [`ChromaBackend`]: crate::store::ChromaBackend
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<BTreeMap<String, Collection>>,
}

#[derive(Default)]
struct Collection {
    /// Records in insertion order
    records: Vec<BackendRecord>,
    /// Record id -> position in `records`
    positions: HashMap<String, usize>,
}

impl Collection {
    fn upsert(&mut self, record: BackendRecord) {
        match self.positions.get(&record.id) {
            // replaced records keep their original slot
            Some(&pos) => self.records[pos] = record,
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn delete(&mut self, ids: &[String]) {
        self.records.retain(|r| !ids.contains(&r.id));
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| Error::Store("memory backend lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| Error::Store("memory backend lock poisoned".to_string()))
    }
}

fn missing(collection: &str) -> Error {
    Error::NotFound(format!("collection '{collection}'"))
}

impl VectorBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn heartbeat(&self) -> Result<String> {
        let collections = self.read()?;
        Ok(format!("{} collections", collections.len()))
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn create_collection(&self, name: &str, _metadata: &Metadata) -> Result<()> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            return Err(Error::Store(format!("collection '{name}' already exists")));
        }
        collections.insert(name.to_string(), Collection::default());
        Ok(())
    }

    fn upsert(&self, collection: &str, records: &[BackendRecord]) -> Result<()> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        for record in records {
            target.upsert(record.clone());
        }
        Ok(())
    }

    fn query(&self, collection: &str, query: &Embedding, k: usize) -> Result<Vec<QueryHit>> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<QueryHit> = target
            .records
            .iter()
            .map(|r| QueryHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(query, &r.embedding),
            })
            .collect();

        // stable sort: equal scores stay in insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(target.records.iter().map(|r| r.id.clone()).collect())
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        target.delete(ids);
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.read()?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(target.records.len())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, document: &str, embedding: Embedding) -> BackendRecord {
        BackendRecord {
            id: id.to_string(),
            document: document.to_string(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    fn backend_with(name: &str) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_collection(name, &Metadata::new()).unwrap();
        backend
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_collections_lifecycle() {
        let backend = MemoryBackend::new();
        assert!(backend.list_collections().unwrap().is_empty());

        backend.create_collection("rules", &Metadata::new()).unwrap();
        assert_eq!(backend.list_collections().unwrap(), vec!["rules"]);
        assert!(backend.create_collection("rules", &Metadata::new()).is_err());
        assert_eq!(backend.count("rules").unwrap(), 0);
    }

    #[test]
    fn test_missing_collection_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.count("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(backend.upsert("nope", &[]).is_err());
    }

    #[test]
    fn test_query_returns_sorted() {
        let backend = backend_with("c");
        backend
            .upsert(
                "c",
                &[
                    record("1", "far away", vec![0.0, 1.0, 0.0]),
                    record("2", "very close", vec![1.0, 0.0, 0.0]),
                    record("3", "medium", vec![0.5, 0.5, 0.0]),
                ],
            )
            .unwrap();

        let hits = backend.query("c", &vec![1.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let backend = backend_with("c");
        backend
            .upsert(
                "c",
                &[
                    record("b", "x", vec![1.0, 0.0]),
                    record("a", "y", vec![1.0, 0.0]),
                    record("c", "z", vec![1.0, 0.0]),
                ],
            )
            .unwrap();

        let hits = backend.query("c", &vec![1.0, 0.0], 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_query_respects_k() {
        let backend = backend_with("c");
        backend
            .upsert(
                "c",
                &[
                    record("1", "a", vec![1.0, 0.0]),
                    record("2", "b", vec![0.9, 0.1]),
                    record("3", "c", vec![0.8, 0.2]),
                ],
            )
            .unwrap();

        assert_eq!(backend.query("c", &vec![1.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(backend.query("c", &vec![1.0, 0.0], 100).unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let backend = backend_with("c");
        backend
            .upsert("c", &[record("same-id", "first content", vec![1.0])])
            .unwrap();
        backend
            .upsert("c", &[record("same-id", "second content", vec![1.0])])
            .unwrap();

        assert_eq!(backend.count("c").unwrap(), 1);
        let hits = backend.query("c", &vec![1.0], 1).unwrap();
        assert_eq!(hits[0].document, "second content");
    }

    #[test]
    fn test_delete_and_ids() {
        let backend = backend_with("c");
        backend
            .upsert(
                "c",
                &[
                    record("1", "a", vec![1.0]),
                    record("2", "b", vec![1.0]),
                    record("3", "c", vec![1.0]),
                ],
            )
            .unwrap();

        backend.delete("c", &["2".to_string()]).unwrap();
        assert_eq!(backend.ids("c").unwrap(), vec!["1", "3"]);

        // positions are rebuilt, so replacing still works after a delete
        backend.upsert("c", &[record("3", "new", vec![1.0])]).unwrap();
        assert_eq!(backend.count("c").unwrap(), 2);
    }

    #[test]
    fn test_empty_query() {
        let backend = backend_with("c");
        let hits = backend.query("c", &vec![1.0, 0.0], 5).unwrap();
        assert!(hits.is_empty());
    }
}
