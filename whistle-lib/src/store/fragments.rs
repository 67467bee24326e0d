use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::{json, Value};

use crate::config::Settings;
use crate::embed::Embedder;
use crate::fragment::{QnaPair, RecordMetadata, RuleFragment};
use crate::store::{
    BackendRecord, CollectionStats, FragmentSearch, Metadata, QueryHit, SearchResult,
    VectorBackend,
};
use crate::{Error, Result};

/// Default collection holding rulebook and comment fragments.
pub const RULES_COLLECTION: &str = "rule_fragments";
/// Default collection holding curated question/answer pairs.
pub const QNA_COLLECTION: &str = "qna_pairs";
/// Default number of fragments embedded and upserted per request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Fragment-level store combining an embedder with a vector backend.
///
/// Every method takes `&self`, so one store can be shared by concurrent
/// queries. Failures from the embedder or backend are logged with the
/// operation name and returned unchanged; retry policy is up to the caller.
pub struct FragmentStore<E: Embedder, B: VectorBackend> {
    embedder: E,
    backend: B,
    rules_collection: String,
    qna_collection: String,
    batch_size: usize,
}

impl<E: Embedder, B: VectorBackend> FragmentStore<E, B> {
    /// Create a store using the default collection names.
    #[must_use]
    pub fn new(embedder: E, backend: B) -> Self {
        Self {
            embedder,
            backend,
            rules_collection: RULES_COLLECTION.to_string(),
            qna_collection: QNA_COLLECTION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Create a store with collection names and batch size from settings.
    #[must_use]
    pub fn from_settings(embedder: E, backend: B, settings: &Settings) -> Self {
        Self::new(embedder, backend)
            .with_collections(
                &settings.chroma.rules_collection,
                &settings.chroma.qna_collection,
            )
            .with_batch_size(settings.embedding.batch_size)
    }

    #[must_use]
    pub fn with_collections(mut self, rules: &str, qna: &str) -> Self {
        self.rules_collection = rules.to_string();
        self.qna_collection = qna.to_string();
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name of the collection holding rule fragments.
    #[must_use]
    pub fn rules_collection(&self) -> &str {
        &self.rules_collection
    }

    /// Returns a reference to the embedder.
    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Returns a reference to the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create each required collection that does not exist yet.
    ///
    /// Existing collections are left untouched, so this is safe to call from
    /// every entry point. Returns the names that were created.
    pub fn ensure_collections(&self) -> Result<Vec<String>> {
        let existing = logged(self.backend.list_collections(), "ensure_collections", "-")?;
        tracing::debug!(?existing, "found existing collections");

        let required = [
            (&self.qna_collection, "QnA pairs collection"),
            (&self.rules_collection, "Rule fragments collection"),
        ];

        let mut created = Vec::new();
        for (name, description) in required {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            let mut metadata = Metadata::new();
            metadata.insert("description".to_string(), json!(description));

            logged(
                self.backend.create_collection(name, &metadata),
                "create_collection",
                name,
            )?;
            tracing::info!(collection = %name, "created collection");
            created.push(name.clone());
        }
        Ok(created)
    }

    /// Embed and upsert one fragment, keyed by its paragraph.
    ///
    /// An existing record with the same paragraph is replaced.
    pub fn add_fragment(&self, fragment: &RuleFragment) -> Result<()> {
        self.add_fragments(std::slice::from_ref(fragment), "add_fragment")?;
        tracing::info!(paragraph = %fragment.paragraph, "added rule fragment to vector store");
        Ok(())
    }

    /// Embed and upsert many fragments, `batch_size` at a time.
    ///
    /// Records stay aligned with their fragments inside each request. The
    /// first failing batch aborts the load; earlier batches stay written.
    pub fn add_fragments_batch(&self, fragments: &[RuleFragment]) -> Result<usize> {
        tracing::info!(
            count = fragments.len(),
            "getting embeddings and loading into vector store, this may take a while"
        );
        let added = self.add_fragments(fragments, "add_fragments_batch")?;
        tracing::info!(count = added, "added rule fragments in batch");
        Ok(added)
    }

    fn add_fragments(&self, fragments: &[RuleFragment], operation: &str) -> Result<usize> {
        if let Some(empty) = fragments.iter().find(|f| f.content.trim().is_empty()) {
            let err = Error::InvalidInput(format!("fragment {} has no content", empty.paragraph));
            return logged(Err(err), operation, &empty.paragraph);
        }

        for (i, batch) in fragments.chunks(self.batch_size).enumerate() {
            let start = i * self.batch_size;
            let range = format!("{}..{}", start, start + batch.len());

            // a batch where every fragment carries its own vector skips the embedder
            let precomputed: Option<Vec<_>> = batch.iter().map(|f| f.embedding.clone()).collect();
            let embeddings = match precomputed {
                Some(embeddings) => embeddings,
                None => {
                    let texts: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
                    logged(self.embedder.embed_documents(&texts), operation, &range)?
                }
            };
            logged(check_count(batch.len(), &embeddings, &range), operation, &range)?;

            let records: Vec<BackendRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(fragment, embedding)| fragment_record(fragment, embedding))
                .collect();

            logged(
                self.backend.upsert(&self.rules_collection, &records),
                operation,
                &range,
            )?;
            tracing::debug!(batch = %range, "upserted fragments");
        }
        Ok(fragments.len())
    }

    /// Embed and upsert curated Q&A pairs into the Q&A collection.
    ///
    /// Ids are derived from the question text, so reloading is idempotent.
    pub fn add_qna_pairs(&self, pairs: &[QnaPair]) -> Result<usize> {
        for batch in pairs.chunks(self.batch_size) {
            let contents: Vec<String> = batch.iter().map(QnaPair::content).collect();
            let texts: Vec<&str> = contents.iter().map(String::as_str).collect();
            let embeddings = logged(self.embedder.embed_documents(&texts), "add_qna_pairs", "-")?;
            logged(
                check_count(batch.len(), &embeddings, &self.qna_collection),
                "add_qna_pairs",
                &self.qna_collection,
            )?;

            let records: Vec<BackendRecord> = batch
                .iter()
                .zip(contents)
                .zip(embeddings)
                .map(|((pair, document), embedding)| BackendRecord {
                    id: generate_id(&pair.question),
                    document,
                    embedding,
                    metadata: pair.metadata(),
                })
                .collect();

            logged(
                self.backend.upsert(&self.qna_collection, &records),
                "add_qna_pairs",
                &self.qna_collection,
            )?;
        }
        tracing::info!(count = pairs.len(), "added qna pairs");
        Ok(pairs.len())
    }

    /// The `k` rule fragments most relevant to `query`, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let key = truncate(query, 80);
        let embedding = logged(self.embedder.embed_query(query), "search", &key)?;
        let hits = logged(
            self.backend.query(&self.rules_collection, &embedding, k),
            "search",
            &key,
        )?;

        tracing::debug!(query = %key, results = hits.len(), "searched rule fragments");
        Ok(hits.into_iter().map(search_result).collect())
    }

    /// Document count per collection.
    pub fn stats(&self) -> Result<CollectionStats> {
        let mut stats = CollectionStats::new();
        for name in [&self.rules_collection, &self.qna_collection] {
            let count = logged(self.backend.count(name), "stats", name)?;
            stats.insert(name.clone(), count);
        }
        Ok(stats)
    }

    /// Number of stored rule fragments.
    pub fn rules_count(&self) -> Result<usize> {
        logged(
            self.backend.count(&self.rules_collection),
            "rules_count",
            &self.rules_collection,
        )
    }

    /// Delete every record in `collection`. Returns how many were removed.
    pub fn clear(&self, collection: &str) -> Result<usize> {
        let ids = logged(self.backend.ids(collection), "clear", collection)?;
        if ids.is_empty() {
            return Ok(0);
        }

        logged(self.backend.delete(collection, &ids), "clear", collection)?;
        tracing::info!(collection, removed = ids.len(), "cleared collection");
        Ok(ids.len())
    }

    /// Liveness check of the backing store.
    pub fn healthcheck(&self) -> Result<String> {
        let beat = logged(self.backend.heartbeat(), "healthcheck", self.backend.name())?;
        Ok(format!("{} heartbeat: {beat}", self.backend.name()))
    }
}

impl<E: Embedder, B: VectorBackend> FragmentSearch for FragmentStore<E, B> {
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        FragmentStore::search(self, query, k)
    }
}

/// Log a failed store operation with its key, then hand the error back.
fn logged<T>(result: Result<T>, operation: &str, key: &str) -> Result<T> {
    result.inspect_err(|e| tracing::error!(operation, key, error = %e, "store operation failed"))
}

/// Every item in a batch must get exactly one vector.
fn check_count(expected: usize, embeddings: &[Vec<f32>], key: &str) -> Result<()> {
    if embeddings.len() == expected {
        return Ok(());
    }
    Err(Error::Embedding(format!(
        "batch {key}: expected {expected} embeddings, got {}",
        embeddings.len()
    )))
}

fn fragment_record(fragment: &RuleFragment, embedding: Vec<f32>) -> BackendRecord {
    let record = fragment.to_storage_record();
    let mut metadata = Metadata::new();
    metadata.insert("paragraph".to_string(), json!(record.metadata.paragraph));
    metadata.insert("full_path".to_string(), json!(record.metadata.full_path));

    BackendRecord {
        id: record.id,
        document: record.text,
        embedding,
        metadata,
    }
}

fn search_result(hit: QueryHit) -> SearchResult {
    let mut metadata: RecordMetadata =
        serde_json::from_value(Value::Object(hit.metadata)).unwrap_or_default();
    if metadata.paragraph.is_empty() {
        metadata.paragraph = hit.id;
    }

    SearchResult {
        content: hit.document,
        metadata,
        relevance_score: hit.score,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn generate_id(string: &str) -> String {
    let mut hasher = DefaultHasher::new();
    string.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
