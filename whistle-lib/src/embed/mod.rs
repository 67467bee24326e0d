//! Text embedding using local models
//!
//! Uses multilingual E5/BGE models via the fastembed crate (ONNX runtime).
//! The model is loaded lazily: constructing an embedder is cheap, the first
//! call downloads/loads the weights.
//!
//! # Usage
//!
//! ```ignore
//! use whistle_lib::embed::{Embedder, FastEmbedder};
//!
//! let embedder = FastEmbedder::new(&settings.embedding)?;
//!
//! // Embed documents (for indexing)
//! let doc_embeddings = embedder.embed_documents(&["6.1.1. A foul is awarded..."])?;
//!
//! // Embed query (for searching)
//! let query_embedding = embedder.embed_query("When does a player get a foul?")?;
//! ```

use crate::Result;

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
///
/// Methods take `&self` so one embedder can serve concurrent queries;
/// implementations synchronise internally where the model needs it.
pub trait Embedder: Send + Sync {
    /// Embed multiple documents for indexing
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    ///
    /// Note: Some models (like E5) use different prompts for queries vs documents.
    fn embed_query(&self, text: &str) -> Result<Embedding>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

mod fast;

pub use fast::*;
