//! HTTP client for the chat backend.
//!
//! [`BackendClient`] talks to the frontend API (document chunks, image
//! sources, suggestions) and the chat inference endpoint. The [`Backend`]
//! trait is the seam the cached resolvers depend on, so they can be tested
//! without a server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{GysError, Result};

pub mod chat;
pub mod resolve;

pub use chat::{ChatEvent, ChatReply, StreamDecoder};
pub use resolve::{ChunkResolver, ImageResolver, Resolvers, SuggestionResolver};

/// Document chunk endpoint; the chunk id is appended as a path segment.
pub const CHUNK_PATH: &str = "/api/be/v1/frontend/chunk";
/// Image source endpoint; takes the raw reference as `?data=`.
pub const IMAGE_PATH: &str = "/api/be/v1/frontend/image";
/// Suggestion list endpoint.
pub const SUGGESTIONS_PATH: &str = "/api/be/v1/frontend/suggestions";
/// Streaming chat inference endpoint.
pub const INFERENCE_PATH: &str = "/api/chat/inference";

/// A document excerpt referenced from a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkData {
    pub content: String,
    pub filename: String,
    #[serde(default)]
    pub fileurl: String,
}

/// Fetch operations the resolvers need from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch one document chunk by id.
    async fn fetch_chunk(&self, id: &str) -> Result<ChunkData>;

    /// Resolve a raw image reference to a displayable source.
    async fn fetch_image_src(&self, data: &str) -> Result<String>;

    /// Fetch the suggested opening questions.
    async fn fetch_suggestions(&self) -> Result<Vec<String>>;
}

// ============================================================================
// Client
// ============================================================================

/// reqwest-based backend client.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    auth_url: Option<String>,
    access_token: Option<String>,
}

impl BackendClient {
    /// Build a client from config.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            GysError::Config(format!("Invalid backend base_url '{}': {}", config.base_url, e))
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GysError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            access_token: None,
        })
    }

    /// Attach a bearer token sent with every backend request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_url(&self) -> Option<&str> {
        self.auth_url.as_deref()
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| GysError::Config(format!("Invalid endpoint '{}': {}", raw, e)))
    }

    fn chunk_url(&self, id: &str) -> Result<Url> {
        let mut url = self.endpoint(CHUNK_PATH)?;
        url.path_segments_mut()
            .map_err(|_| GysError::Config(format!("Base URL '{}' cannot take a path", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn image_url(&self, data: &str) -> Result<Url> {
        let mut url = self.endpoint(IMAGE_PATH)?;
        url.query_pairs_mut().append_pair("data", data);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Start a chat inference request and return its decoded event stream.
    pub async fn chat(&self, message: &str) -> Result<chat::ChatStream> {
        let url = self.endpoint(INFERENCE_PATH)?;
        debug!(url = %url, "Starting chat inference");
        let resp = self
            .authorize(self.http.post(url))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(chat::decode_stream(resp.bytes_stream()))
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn fetch_chunk(&self, id: &str) -> Result<ChunkData> {
        let url = self.chunk_url(id)?;
        debug!(url = %url, "Fetching document chunk");
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<ChunkData>().await?)
    }

    async fn fetch_image_src(&self, data: &str) -> Result<String> {
        let url = self.image_url(data)?;
        debug!(url = %url, "Resolving image source");
        let resp = self
            .authorize(self.http.get(url))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let body = resp.text().await?;
        Ok(clean_image_response(&body))
    }

    async fn fetch_suggestions(&self) -> Result<Vec<String>> {
        let url = self.endpoint(SUGGESTIONS_PATH)?;
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<Vec<String>>().await?)
    }
}

/// Turn a non-success response into [`GysError::Backend`].
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GysError::Backend {
        status: status.as_u16(),
        body,
    })
}

/// Normalize the image endpoint's text body into a bare source string.
///
/// The body may arrive HTML-escaped and wrapped as `("…")`.
pub fn clean_image_response(raw: &str) -> String {
    let decoded = raw.replace("&quot;", "\"").replace("&amp;", "&");
    let s = decoded.strip_prefix('(').unwrap_or(&decoded);
    let s = s.strip_suffix(')').unwrap_or(s);
    let s = s.strip_prefix('"').unwrap_or(s);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.trim().to_string()
}

/// True when `src` is already displayable: it has a lowercase URL scheme
/// (`https://…`) or is a `data:` URI.
pub fn is_direct_source(src: &str) -> bool {
    if src.starts_with("data:") {
        return true;
    }
    match src.split_once("://") {
        Some((scheme, _)) => !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_lowercase()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url: base.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_clean_image_response() {
        assert_eq!(
            clean_image_response("(&quot;https://cdn.example.com/a.png?x=1&amp;y=2&quot;)"),
            "https://cdn.example.com/a.png?x=1&y=2"
        );
        assert_eq!(clean_image_response("\"/img/1.png\""), "/img/1.png");
        assert_eq!(clean_image_response("  plain  "), "plain");
        assert_eq!(clean_image_response(""), "");
    }

    #[test]
    fn test_is_direct_source() {
        assert!(is_direct_source("https://example.com/a.png"));
        assert!(is_direct_source("http://example.com"));
        assert!(is_direct_source("data:image/png;base64,AAAA"));
        assert!(!is_direct_source("images/a.png"));
        assert!(!is_direct_source("HTTPS://example.com"));
        assert!(!is_direct_source("://nothing"));
        assert!(!is_direct_source("doc-123"));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = BackendClient::new(&BackendConfig {
            base_url: "not a url".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, GysError::Config(_)));
    }

    #[test]
    fn test_chunk_url_encodes_id() {
        let c = client("https://chat.example.com/");
        let url = c.chunk_url("a b/c").unwrap();
        assert_eq!(
            url.as_str(),
            "https://chat.example.com/api/be/v1/frontend/chunk/a%20b%2Fc"
        );
    }

    #[test]
    fn test_image_url_query() {
        let c = client("https://chat.example.com");
        let url = c.image_url("img:42&x").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("data".to_string(), "img:42&x".to_string())]);
        assert_eq!(url.path(), IMAGE_PATH);
    }

    #[test]
    fn test_base_url_with_prefix_is_kept() {
        let c = client("https://example.com/gys");
        let url = c.endpoint(SUGGESTIONS_PATH).unwrap();
        assert_eq!(url.path(), "/gys/api/be/v1/frontend/suggestions");
    }
}
