//! Scripted fakes for the capability ports, shared across this crate's
//! tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use ragline_core::state::{Document, Message};
use ragline_tools::ToolSpec;
use serde_json::{json, Value};

use crate::{
    error::{AgentError, Result},
    ports::{Completion, CompletionChunk, CompletionStream, Retrieval},
};

/// A [`Completion`] that replays pre-loaded responses in order. Each call
/// kind pops from its own queue; an exhausted queue is a model error, which
/// makes over-consumption visible in tests.
#[derive(Default)]
pub struct ScriptedCompletion {
    structured: Mutex<VecDeque<Value>>,
    plain: Mutex<VecDeque<String>>,
    streams: Mutex<VecDeque<Vec<CompletionChunk>>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_structured(&self, value: Value) {
        self.structured.lock().unwrap().push_back(value);
    }

    pub fn push_plain(&self, text: impl Into<String>) {
        self.plain.lock().unwrap().push_back(text.into());
    }

    pub fn push_stream(&self, chunks: Vec<CompletionChunk>) {
        self.streams.lock().unwrap().push_back(chunks);
    }

    pub fn push_text_stream(&self, text: &str) {
        self.push_stream(vec![CompletionChunk::Text(text.to_string())]);
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        self.plain
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::model("plain completion script exhausted"))
    }

    async fn complete_structured(&self, _messages: &[Message], _schema: &Value) -> Result<Value> {
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::model("structured completion script exhausted"))
    }

    async fn stream(&self, _messages: &[Message], _tools: &[ToolSpec]) -> Result<CompletionStream> {
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::model("stream script exhausted"))?;
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}

/// A [`Retrieval`] that fabricates `k` documents per query, with optional
/// per-query delays and failures.
#[derive(Default)]
pub struct FakeRetrieval {
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
}

impl FakeRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }
}

#[async_trait]
impl Retrieval for FakeRetrieval {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        if self.failing.iter().any(|q| q == query) {
            return Err(AgentError::retrieval(format!(
                "search backend rejected '{query}'"
            )));
        }
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        Ok((0..k)
            .map(|i| {
                Document::new(format!("doc {i} for {query}"))
                    .with_metadata("query", json!(query))
            })
            .collect())
    }
}
