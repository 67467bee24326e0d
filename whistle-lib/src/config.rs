//! Runtime configuration
//!
//! Settings are assembled once at process start and handed to constructors
//! by reference. Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`whistle.toml` unless another path is given)
//! 3. `WHISTLE_` environment variables, `__` separating sections,
//!    e.g. `WHISTLE_CHROMA__HOST=db.internal` or `WHISTLE_LLM__API_KEY=...`

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "whistle.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "WHISTLE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub chroma: ChromaSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub bot: BotSettings,
    pub data: DataSettings,
}

/// Connection to the vector database. Credentials are passed through as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChromaSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Client auth provider identifier, e.g.
    /// `chromadb.auth.basic_authn.BasicAuthClientProvider`
    pub auth_provider: Option<String>,
    pub timeout_secs: u64,
    /// REST API generation spoken by the server
    pub api_version: ChromaApiVersion,
    /// Tenant and database, used by the v2 API only
    pub tenant: String,
    pub database: String,
    pub rules_collection: String,
    pub qna_collection: String,
}

/// Chroma REST API generation.
///
/// `V1` is served by Chroma 0.4 to 0.6; `V2` by 0.6 and every 1.x release.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChromaApiVersion {
    V1,
    #[default]
    V2,
}

impl Default for ChromaSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            user: None,
            password: None,
            auth_provider: None,
            timeout_secs: 30,
            api_version: ChromaApiVersion::V2,
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            rules_collection: "rule_fragments".to_string(),
            qna_collection: "qna_pairs".to_string(),
        }
    }
}

impl ChromaSettings {
    /// Base URL of the REST API.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model identifier, see [`crate::embed::SUPPORTED_MODELS`]
    pub model: String,
    /// Texts embedded per call during bulk loads
    pub batch_size: usize,
    pub cache_dir: Option<PathBuf>,
    pub show_download_progress: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "intfloat/multilingual-e5-small".to_string(),
            batch_size: 64,
            cache_dir: None,
            show_download_progress: true,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    /// Optional for local servers such as Ollama
    pub api_key: Option<String>,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Replaces the built-in prompt; must contain `{query}` and `{context}`
    pub prompt_template: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 60,
            prompt_template: None,
        }
    }
}

/// Query-time behaviour of the answer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotSettings {
    pub top_k: usize,
    pub citation_label: String,
    /// Append the retrieved fragments to every reply
    pub include_context: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            citation_label: "Relevant rule paragraphs:".to_string(),
            include_context: false,
        }
    }
}

/// Source documents for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSettings {
    pub rules_path: PathBuf,
    pub comments_path: PathBuf,
    /// Label prefix for comment fragments, e.g. "Comment" -> "Comment 10"
    pub comment_label: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("data/official_rules.pdf"),
            comments_path: PathBuf::from("data/comments.txt"),
            comment_label: "Comment".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, the given (or default) TOML file, and env.
    ///
    /// A missing file is not an error; defaults and env still apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(path))
    }

    /// Layered configuration sources, exposed so callers can add their own.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.bot.top_k == 0 {
            return Err(Error::Config("bot.top_k must be at least 1".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if let Some(template) = &self.llm.prompt_template {
            if !template.contains("{query}") || !template.contains("{context}") {
                return Err(Error::Config(
                    "llm.prompt_template must contain {query} and {context}".to_string(),
                ));
            }
        }
        Ok(())
    }
}
