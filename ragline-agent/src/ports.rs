//! Capability ports the pipelines depend on.
//!
//! The steps in this crate only ever talk to a [`Completion`] and a
//! [`Retrieval`] implementation (plus the tool registry from
//! `ragline-tools`). Implementations are constructed at process start and
//! handed into the pipeline factories; nothing in this crate holds a global
//! client.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use ragline_core::state::{Document, Message};
use ragline_tools::ToolSpec;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    /// A fragment of answer text.
    Text(String),
    /// A fragment of a tool call. Providers deliver calls piecewise; the
    /// `index` groups fragments of the same call, `id`/`name` arrive on the
    /// first fragment and `arguments` accumulates across fragments.
    ToolCallFragment {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
}

/// A live stream of completion chunks.
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// Language-model capability.
#[async_trait]
pub trait Completion: Send + Sync {
    /// One-shot completion returning plain text.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Completion constrained to the given JSON schema. The returned value
    /// is the raw payload; callers deserialize and treat a mismatch as a
    /// failure.
    async fn complete_structured(&self, messages: &[Message], schema: &Value) -> Result<Value>;

    /// Streaming completion with the given tools advertised to the model.
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<CompletionStream>;
}

/// Document-retrieval capability.
#[async_trait]
pub trait Retrieval: Send + Sync {
    /// Fetch the top `k` documents for one query.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}

/// Configuration for [`HttpRetrieval`].
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Endpoint accepting `POST {query, k}` and returning a document array.
    pub endpoint: String,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl RetrievalConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`Retrieval`] over an HTTP search service.
///
/// Each call is fail-fast: a non-success status or an elapsed deadline is an
/// error for that query, and the calling step decides what that means for
/// the batch.
#[derive(Debug, Clone)]
pub struct HttpRetrieval {
    client: reqwest::Client,
    config: RetrievalConfig,
}

impl HttpRetrieval {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Retrieval for HttpRetrieval {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        debug!(%query, k, endpoint = %self.config.endpoint, "retrieving documents");
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&json!({ "query": query, "k": k }))
            .send()
            .await?
            .error_for_status()?;
        let documents: Vec<Document> = response.json().await?;
        debug!(%query, count = documents.len(), "retrieval finished");
        Ok(documents)
    }
}
