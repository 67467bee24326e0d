//! ChromaDB REST client.
//!
//! Speaks either REST generation, chosen by `chroma.api_version`:
//! - `v2` (default): Chroma 0.6 and 1.x, collections scoped by tenant and
//!   database (`/api/v2/tenants/{tenant}/databases/{database}/collections`)
//! - `v1`: Chroma 0.4 to 0.6 (`/api/v1/collections`)
//!
//! Request and response bodies are the same in both.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{ChromaApiVersion, ChromaSettings};
use crate::embed::Embedding;
use crate::store::{BackendRecord, Metadata, QueryHit, VectorBackend};
use crate::{Error, Result};

/// How requests authenticate against the Chroma server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromaAuth {
    None,
    Basic { user: String, password: String },
    Token(String),
}

impl ChromaAuth {
    /// Pick the auth scheme from the configured provider identifier.
    ///
    /// Provider ids are matched loosely, so both Chroma's class paths
    /// (`chromadb.auth.basic_authn.BasicAuthClientProvider`) and plain
    /// `basic` / `token` work. Without a provider, a configured user and
    /// password imply basic auth.
    pub fn from_settings(settings: &ChromaSettings) -> Result<Self> {
        let provider = settings
            .auth_provider
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let user = settings.user.clone();
        let password = settings.password.clone();

        if provider.contains("token") {
            let token = match (user, password) {
                (Some(u), Some(p)) => format!("{u}:{p}"),
                (Some(t), None) | (None, Some(t)) => t,
                (None, None) => {
                    return Err(Error::Config(
                        "token auth needs chroma.user or chroma.password".to_string(),
                    ))
                }
            };
            return Ok(Self::Token(token));
        }

        match (user, password) {
            (Some(user), Some(password)) if provider.is_empty() || provider.contains("basic") => {
                Ok(Self::Basic { user, password })
            }
            _ if provider.contains("basic") => Err(Error::Config(
                "basic auth needs chroma.user and chroma.password".to_string(),
            )),
            _ if provider.is_empty() => Ok(Self::None),
            _ => Err(Error::Config(format!(
                "unsupported chroma auth provider '{provider}'"
            ))),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { user, password } => request.basic_auth(user, Some(password)),
            Self::Token(token) => request.bearer_auth(token),
        }
    }
}

/// Blocking client for the ChromaDB REST interface.
///
/// Collection ids are looked up by name once and cached.
pub struct ChromaBackend {
    client: Client,
    /// e.g. `http://localhost:8000/api/v2`
    api_root: String,
    /// Collections path below `api_root`
    collections: String,
    auth: ChromaAuth,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaBackend {
    pub fn new(settings: &ChromaSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build Chroma HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_root: api_root(settings),
            collections: collections_path(settings),
            auth: ChromaAuth::from_settings(settings)?,
            collection_ids: RwLock::new(HashMap::new()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.api_root));
        self.auth.apply(request)
    }

    /// Send a request and fail on non-2xx statuses.
    fn execute(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(status_error(operation, status, &body))
    }

    fn call<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        self.execute(operation, request)?
            .json()
            .map_err(|e| Error::Store(format!("{operation}: failed to parse Chroma response: {e}")))
    }

    fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.cached_id(name) {
            return Ok(id);
        }

        let collection: CollectionModel = self.call(
            "get_collection",
            self.request(Method::GET, &format!("{}/{name}", self.collections)),
        )?;
        self.remember(&collection);
        Ok(collection.id)
    }

    fn cached_id(&self, name: &str) -> Option<String> {
        self.collection_ids
            .read()
            .ok()
            .and_then(|ids| ids.get(name).cloned())
    }

    fn remember(&self, collection: &CollectionModel) {
        if let Ok(mut ids) = self.collection_ids.write() {
            ids.insert(collection.name.clone(), collection.id.clone());
        }
    }
}

impl VectorBackend for ChromaBackend {
    fn name(&self) -> &str {
        "chroma"
    }

    fn heartbeat(&self) -> Result<String> {
        let beat: Heartbeat = self.call("heartbeat", self.request(Method::GET, "/heartbeat"))?;
        Ok(beat.nanoseconds.to_string())
    }

    fn list_collections(&self) -> Result<Vec<String>> {
        let collections: Vec<CollectionModel> =
            self.call("list_collections", self.request(Method::GET, &self.collections))?;

        collections.iter().for_each(|c| self.remember(c));
        Ok(collections.into_iter().map(|c| c.name).collect())
    }

    fn create_collection(&self, name: &str, metadata: &Metadata) -> Result<()> {
        let body = CreateCollectionRequest {
            name,
            metadata,
            get_or_create: false,
        };
        let collection: CollectionModel = self.call(
            "create_collection",
            self.request(Method::POST, &self.collections).json(&body),
        )?;
        self.remember(&collection);
        Ok(())
    }

    fn upsert(&self, collection: &str, records: &[BackendRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection)?;
        let body = UpsertRequest {
            ids: records.iter().map(|r| r.id.as_str()).collect(),
            embeddings: records.iter().map(|r| r.embedding.as_slice()).collect(),
            documents: records.iter().map(|r| r.document.as_str()).collect(),
            metadatas: records.iter().map(|r| &r.metadata).collect(),
        };
        self.execute(
            "upsert",
            self.request(Method::POST, &format!("{}/{id}/upsert", self.collections))
                .json(&body),
        )?;
        Ok(())
    }

    fn query(&self, collection: &str, embedding: &Embedding, k: usize) -> Result<Vec<QueryHit>> {
        // Chroma rejects n_results above the collection size
        let k = k.min(self.count(collection)?);
        if k == 0 {
            return Ok(Vec::new());
        }

        let id = self.collection_id(collection)?;
        let body = QueryRequest {
            query_embeddings: [embedding.as_slice()],
            n_results: k,
            include: ["documents", "metadatas", "distances"],
        };
        let response: QueryResponse = self.call(
            "query",
            self.request(Method::POST, &format!("{}/{id}/query", self.collections))
                .json(&body),
        )?;
        Ok(response.into_hits())
    }

    fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let id = self.collection_id(collection)?;
        let response: GetResponse = self.call(
            "get",
            self.request(Method::POST, &format!("{}/{id}/get", self.collections))
                .json(&GetRequest { include: [] }),
        )?;
        Ok(response.ids)
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection)?;
        self.execute(
            "delete",
            self.request(Method::POST, &format!("{}/{id}/delete", self.collections))
                .json(&DeleteRequest { ids }),
        )?;
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let id = self.collection_id(collection)?;
        self.call(
            "count",
            self.request(Method::GET, &format!("{}/{id}/count", self.collections)),
        )
    }
}

fn api_root(settings: &ChromaSettings) -> String {
    let version = match settings.api_version {
        ChromaApiVersion::V1 => "v1",
        ChromaApiVersion::V2 => "v2",
    };
    format!("{}/api/{version}", settings.base_url())
}

fn collections_path(settings: &ChromaSettings) -> String {
    match settings.api_version {
        ChromaApiVersion::V1 => "/collections".to_string(),
        ChromaApiVersion::V2 => format!(
            "/tenants/{}/databases/{}/collections",
            settings.tenant, settings.database
        ),
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::Connectivity(format!("{operation}: Chroma unreachable: {err}"))
    } else {
        Error::Store(format!("{operation}: {err}"))
    }
}

fn status_error(operation: &str, status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Connectivity(format!(
            "{operation}: Chroma rejected credentials ({status}): {body}"
        )),
        StatusCode::NOT_FOUND => Error::NotFound(format!("{operation}: {body}")),
        _ => Error::Store(format!("{operation} failed ({status}): {body}")),
    }
}

/// Convert a Chroma L2 distance between unit vectors into a relevance score.
///
/// Distance 0 maps to 1.0; orthogonal vectors land near 0.
#[must_use]
pub fn relevance_from_distance(distance: f32) -> f32 {
    1.0 - distance / std::f32::consts::SQRT_2
}

#[derive(Debug, Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Heartbeat {
    #[serde(rename = "nanosecond heartbeat")]
    nanoseconds: u64,
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: &'a Metadata,
    get_or_create: bool,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a Metadata>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// Query results are nested one level per query embedding; we send one.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl QueryResponse {
    fn into_hits(self) -> Vec<QueryHit> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = first(self.documents).into_iter();
        let mut metadatas = first(self.metadatas).into_iter();
        let mut distances = first(self.distances).into_iter();

        ids.into_iter()
            .map(|id| QueryHit {
                id,
                document: documents.next().flatten().unwrap_or_default(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
                score: distances
                    .next()
                    .map_or(0.0, relevance_from_distance),
            })
            .collect()
    }
}

fn first<T>(nested: Option<Vec<Vec<T>>>) -> Vec<T> {
    nested
        .and_then(|outer| outer.into_iter().next())
        .unwrap_or_default()
}

#[derive(Serialize)]
struct GetRequest {
    include: [&'static str; 0],
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(user: Option<&str>, password: Option<&str>, provider: Option<&str>) -> ChromaSettings {
        ChromaSettings {
            user: user.map(String::from),
            password: password.map(String::from),
            auth_provider: provider.map(String::from),
            ..ChromaSettings::default()
        }
    }

    #[test]
    fn test_auth_none_by_default() {
        let auth = ChromaAuth::from_settings(&ChromaSettings::default()).unwrap();
        assert_eq!(auth, ChromaAuth::None);
    }

    #[test]
    fn test_auth_basic_from_class_path() {
        let auth = ChromaAuth::from_settings(&settings(
            Some("admin"),
            Some("secret"),
            Some("chromadb.auth.basic_authn.BasicAuthClientProvider"),
        ))
        .unwrap();
        assert_eq!(
            auth,
            ChromaAuth::Basic {
                user: "admin".to_string(),
                password: "secret".to_string()
            }
        );
    }

    #[test]
    fn test_auth_basic_implied_by_credentials() {
        let auth = ChromaAuth::from_settings(&settings(Some("a"), Some("b"), None)).unwrap();
        assert!(matches!(auth, ChromaAuth::Basic { .. }));
    }

    #[test]
    fn test_auth_basic_without_password_is_config_error() {
        let err = ChromaAuth::from_settings(&settings(Some("admin"), None, Some("basic"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_auth_token_passes_credentials_through() {
        let auth = ChromaAuth::from_settings(&settings(
            None,
            Some("tok-123"),
            Some("chromadb.auth.token_authn.TokenAuthClientProvider"),
        ))
        .unwrap();
        assert_eq!(auth, ChromaAuth::Token("tok-123".to_string()));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(ChromaAuth::from_settings(&settings(None, None, Some("kerberos"))).is_err());
    }

    #[test]
    fn test_v2_paths_are_scoped_by_tenant_and_database() {
        let settings = ChromaSettings::default();
        assert_eq!(api_root(&settings), "http://localhost:8000/api/v2");
        assert_eq!(
            collections_path(&settings),
            "/tenants/default_tenant/databases/default_database/collections"
        );
    }

    #[test]
    fn test_v1_paths() {
        let settings = ChromaSettings {
            api_version: ChromaApiVersion::V1,
            ..ChromaSettings::default()
        };
        assert_eq!(api_root(&settings), "http://localhost:8000/api/v1");
        assert_eq!(collections_path(&settings), "/collections");
    }

    #[test]
    fn test_relevance_from_distance() {
        assert!((relevance_from_distance(0.0) - 1.0).abs() < 1e-6);
        assert!(relevance_from_distance(0.2) > relevance_from_distance(0.8));
    }

    #[test]
    fn test_query_response_into_hits() {
        let json = r#"{
            "ids": [["6.1.1", "Comment 10"]],
            "documents": [["A foul is awarded...", null]],
            "metadatas": [[{"paragraph": "6.1.1", "full_path": "6. Violations"}, null]],
            "distances": [[0.1, 0.7]],
            "embeddings": null
        }"#;
        let response: QueryResponse = serde_json::from_str(json).unwrap();
        let hits = response.into_hits();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "6.1.1");
        assert_eq!(hits[0].document, "A foul is awarded...");
        assert_eq!(hits[0].metadata["full_path"], "6. Violations");
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[1].document, "");
        assert!(hits[1].metadata.is_empty());
    }

    #[test]
    fn test_query_response_without_includes() {
        let response: QueryResponse = serde_json::from_str(r#"{"ids": [["1"]]}"#).unwrap();
        let hits = response.into_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(status_error("count", StatusCode::UNAUTHORIZED, "").is_connectivity());
        assert!(status_error("count", StatusCode::FORBIDDEN, "").is_connectivity());
        assert!(matches!(
            status_error("get_collection", StatusCode::NOT_FOUND, "missing"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            status_error("upsert", StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            Error::Store(_)
        ));
    }

    #[test]
    fn test_unreachable_server_is_connectivity_failure() {
        // nothing listens on port 9 (discard) in test environments
        let backend = ChromaBackend::new(&ChromaSettings {
            host: "127.0.0.1".to_string(),
            port: 9,
            timeout_secs: 2,
            ..ChromaSettings::default()
        })
        .unwrap();

        let err = backend.heartbeat().unwrap_err();
        assert!(err.is_connectivity(), "{err}");
    }

    #[test]
    #[ignore] // Requires a running Chroma server on localhost:8000
    fn test_live_round_trip() {
        let backend = ChromaBackend::new(&ChromaSettings::default()).unwrap();
        let name = "whistle_live_test";
        // Chroma rejects empty metadata maps
        let mut metadata = Metadata::new();
        metadata.insert("description".to_string(), "live test".into());
        if !backend.list_collections().unwrap().iter().any(|c| c == name) {
            backend.create_collection(name, &metadata).unwrap();
        }

        let record = BackendRecord {
            id: "1".to_string(),
            document: "hello".to_string(),
            embedding: vec![1.0, 0.0],
            metadata,
        };
        backend.upsert(name, &[record]).unwrap();
        let hits = backend.query(name, &vec![1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].id, "1");

        backend.delete(name, &backend.ids(name).unwrap()).unwrap();
        assert_eq!(backend.count(name).unwrap(), 0);
    }
}
