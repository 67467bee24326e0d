use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::config::EmbeddingSettings;
use crate::embed::{normalize, Embedder, Embedding};
use crate::{Error, Result};

/// Model names accepted in `embedding.model`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "intfloat/multilingual-e5-small",
    "intfloat/multilingual-e5-base",
    "intfloat/multilingual-e5-large",
    "BAAI/bge-small-en-v1.5",
    "BAAI/bge-large-en-v1.5",
    "sentence-transformers/paraphrase-multilingual-mpnet-base-v2",
];

/// Static facts about a supported model.
struct ModelSpec {
    model: EmbeddingModel,
    dimension: usize,
    query_prefix: &'static str,
    passage_prefix: &'static str,
}

fn resolve_model(name: &str) -> Result<ModelSpec> {
    let spec = match name {
        "intfloat/multilingual-e5-small" => e5(EmbeddingModel::MultilingualE5Small, 384),
        "intfloat/multilingual-e5-base" => e5(EmbeddingModel::MultilingualE5Base, 768),
        "intfloat/multilingual-e5-large" => e5(EmbeddingModel::MultilingualE5Large, 1024),
        "BAAI/bge-small-en-v1.5" => bge(EmbeddingModel::BGESmallENV15, 384),
        "BAAI/bge-large-en-v1.5" => bge(EmbeddingModel::BGELargeENV15, 1024),
        "sentence-transformers/paraphrase-multilingual-mpnet-base-v2" => ModelSpec {
            model: EmbeddingModel::ParaphraseMLMpnetBaseV2,
            dimension: 768,
            query_prefix: "",
            passage_prefix: "",
        },
        other => {
            return Err(Error::Config(format!(
                "unsupported embedding model '{other}'; expected one of: {}",
                SUPPORTED_MODELS.join(", ")
            )))
        }
    };
    Ok(spec)
}

fn e5(model: EmbeddingModel, dimension: usize) -> ModelSpec {
    ModelSpec {
        model,
        dimension,
        query_prefix: "query: ",
        passage_prefix: "passage: ",
    }
}

fn bge(model: EmbeddingModel, dimension: usize) -> ModelSpec {
    // BGE uses a special prompt prefix for queries to improve retrieval
    ModelSpec {
        model,
        dimension,
        query_prefix: "Represent this sentence for searching relevant passages: ",
        passage_prefix: "",
    }
}

/// Local ONNX embedder backed by fastembed.
///
/// Starts uninitialised; the first embedding call loads the model (and
/// downloads it if it is not cached yet). Later calls reuse the loaded model.
pub struct FastEmbedder {
    name: String,
    spec: ModelSpec,
    cache_dir: Option<PathBuf>,
    show_download_progress: bool,
    model: Mutex<Option<TextEmbedding>>,
}

impl FastEmbedder {
    /// Create an embedder for the configured model without loading it.
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        Ok(Self {
            spec: resolve_model(&settings.model)?,
            name: settings.model.clone(),
            cache_dir: settings.cache_dir.clone(),
            show_download_progress: settings.show_download_progress,
            model: Mutex::new(None),
        })
    }

    /// Whether the model has been loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.model.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    fn load(&self) -> Result<TextEmbedding> {
        tracing::info!(model = %self.name, "loading embedding model, this may take some time");
        let mut opts = InitOptions::new(self.spec.model.clone())
            .with_show_download_progress(self.show_download_progress);
        if let Some(dir) = &self.cache_dir {
            opts = opts.with_cache_dir(dir.clone());
        }

        TextEmbedding::try_new(opts).map_err(|e| Error::Embedding(e.to_string()))
    }

    /// Run `texts` through the model, loading it first if needed.
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        let Some(model) = guard.as_mut() else {
            return Err(Error::Embedding("embedding model not loaded".to_string()));
        };

        let mut embeddings = model
            .embed(texts, None)
            .map_err(|e| Error::Embedding(e.to_string()))?;
        embeddings.iter_mut().for_each(|e| normalize(e));
        Ok(embeddings)
    }
}

impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let texts = texts
            .iter()
            .map(|t| format!("{}{t}", self.spec.passage_prefix))
            .collect();
        self.embed(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Embedding> {
        let query_text = format!("{}{text}", self.spec.query_prefix);

        self.embed(vec![query_text])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(model: &str) -> EmbeddingSettings {
        EmbeddingSettings {
            model: model.to_string(),
            ..EmbeddingSettings::default()
        }
    }

    #[test]
    fn test_construction_is_lazy() {
        let embedder = FastEmbedder::new(&EmbeddingSettings::default()).unwrap();
        assert!(!embedder.is_ready());
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_name(), "intfloat/multilingual-e5-small");
    }

    #[test]
    fn test_every_supported_model_resolves() {
        for name in SUPPORTED_MODELS {
            assert!(FastEmbedder::new(&settings(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let err = FastEmbedder::new(&settings("acme/unknown")).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[ignore] // Requires model download, run with: cargo test -- --ignored
    fn test_related_text_scores_higher() {
        let embedder = FastEmbedder::new(&EmbeddingSettings::default()).unwrap();

        let query = embedder.embed_query("How many fouls remove a player?").unwrap();
        let docs = embedder
            .embed_documents(&[
                "A player who receives a fourth foul leaves the table.",
                "The tournament hall opens at nine in the morning.",
            ])
            .unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(embedder.is_ready());
        assert_eq!(query.len(), embedder.dimension());
        assert!(dot(&query, &docs[0]) > dot(&query, &docs[1]));
    }
}
