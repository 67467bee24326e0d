//! Vector storage for rule fragments
//!
//! Two layers:
//! - [`VectorBackend`]: the raw vector database capability (collections,
//!   upsert/query by id). [`ChromaBackend`] talks to a ChromaDB server,
//!   [`MemoryBackend`] keeps everything in process for development and tests.
//! - [`FragmentStore`]: fragment-level operations on top of a backend and an
//!   embedder. Records are keyed by paragraph, so loading the same rulebook
//!   twice replaces rather than duplicates.
//!
//! # Collection lifecycle
//!
//! ```text
//! Absent --ensure_collections--> Created --add_fragment(s)--> Populated
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use whistle_lib::store::{FragmentStore, MemoryBackend};
//!
//! let store = FragmentStore::new(embedder, MemoryBackend::new());
//! store.ensure_collections()?;
//! store.add_fragments_batch(&fragments)?;
//!
//! let results = store.search("How many fouls remove a player?", 3)?;
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::embed::Embedding;
use crate::fragment::RecordMetadata;
use crate::Result;

/// Metadata attached to a stored record.
pub type Metadata = Map<String, Value>;

/// One record as handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRecord {
    pub id: String,
    pub document: String,
    pub embedding: Embedding,
    pub metadata: Metadata,
}

/// One nearest-neighbour match returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    /// Relevance score (higher is more relevant)
    pub score: f32,
}

/// A fragment search result with relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Fragment text
    pub content: String,
    /// Paragraph id and breadcrumb
    pub metadata: RecordMetadata,
    /// Higher is more relevant; the scale depends on the backend
    pub relevance_score: f32,
}

/// Document count per collection name.
pub type CollectionStats = BTreeMap<String, usize>;

/// Trait for vector database backends
///
/// All methods take `&self`; upserts must be atomic per id so writes can run
/// alongside searches.
pub trait VectorBackend: Send + Sync {
    /// Short backend name used in logs and health output
    fn name(&self) -> &str;

    /// Liveness check
    fn heartbeat(&self) -> Result<String>;

    /// Names of all existing collections
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a collection. Fails if it already exists.
    fn create_collection(&self, name: &str, metadata: &Metadata) -> Result<()>;

    /// Insert or replace records by id
    fn upsert(&self, collection: &str, records: &[BackendRecord]) -> Result<()>;

    /// Top-k records nearest to `embedding`, most relevant first
    ///
    /// Ties are broken by insertion order.
    fn query(&self, collection: &str, embedding: &Embedding, k: usize) -> Result<Vec<QueryHit>>;

    /// All record ids in a collection
    fn ids(&self, collection: &str) -> Result<Vec<String>>;

    /// Delete records by id
    fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Number of records in a collection
    fn count(&self, collection: &str) -> Result<usize>;
}

/// Search capability the answer pipeline depends on.
pub trait FragmentSearch: Send + Sync {
    /// The `k` most relevant fragments for `query`, best first
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;
}

mod chroma;
mod fragments;
mod memory;

pub use chroma::*;
pub use fragments::*;
pub use memory::*;
