//! Run state threaded through one workflow execution.
//!
//! The state is owned exclusively by the executor for the lifetime of a run.
//! Steps receive a shared reference and return a [`StateUpdate`]; the
//! executor performs the merge, so no step ever holds a long-lived mutable
//! reference into the canonical state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One role-tagged message of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on `Tool` messages to associate the result with its originating
    /// tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A retrieved document: content plus source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Whether a query falls inside the agent's knowledge domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryDomain {
    /// Needs the retrieval path.
    InDomain,
    /// Answerable directly, no retrieval.
    General,
}

/// Reasoning complexity tier of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Classification of the incoming query, produced once by the first step and
/// read by branch functions and later prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub domain: QueryDomain,
    pub key_topics: Vec<String>,
    pub context_requirements: String,
    pub complexity: Complexity,
    pub user_language: String,
}

impl Classification {
    /// Human-readable rendering used by later prompts and reasoning events.
    pub fn summary(&self) -> String {
        let domain = match self.domain {
            QueryDomain::InDomain => "in-domain",
            QueryDomain::General => "general",
        };
        format!(
            "Classification: this question is {domain}.\n\
             Topic(s): {}.\n\
             Context requirements: {}.\n\
             Overall complexity: {:?}.\n\
             Language: {}",
            self.key_topics.join(", "),
            self.context_requirements,
            self.complexity,
            self.user_language,
        )
    }
}

/// Verdict of a reflection step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub requires_additional_retrieval: bool,
    pub critique: Option<String>,
    pub recommended_next_steps: Option<String>,
}

impl Reflection {
    /// Rendering used by the reflective query-generation prompt.
    pub fn summary(&self) -> String {
        if !self.requires_additional_retrieval {
            return "No additional retrieval is required.".to_string();
        }
        format!(
            "Additional retrieval needed: yes.\n\
             Critique: {}.\n\
             Recommended next steps: {}",
            self.critique.as_deref().unwrap_or("(none)"),
            self.recommended_next_steps.as_deref().unwrap_or("(none)"),
        )
    }
}

/// Mutable record threaded through one workflow run.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Normalized conversation history. Immutable once set.
    pub user_input: Vec<Message>,
    /// Set once by the classification step.
    pub classification: Option<Classification>,
    /// Latest cycle's search queries; replaced each cycle.
    pub generated_queries: Vec<String>,
    /// One batch per retrieval cycle; append-only.
    pub retrieved_documents: Vec<Vec<Document>>,
    /// Per-cycle relevance flags, index-aligned with the document batches.
    pub relevance_flags: Vec<Vec<bool>>,
    /// Number of extra retrieval cycles requested by reflection so far.
    pub cycle_count: u32,
    /// Latest reflection verdict.
    pub reflection: Option<Reflection>,
    /// Condensed synthesis of the relevant documents.
    pub summary: Option<String>,
    /// Accumulating final answer; append-only.
    pub response: String,
}

impl RunState {
    pub fn new(user_input: Vec<Message>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            user_input,
            classification: None,
            generated_queries: Vec::new(),
            retrieved_documents: Vec::new(),
            relevance_flags: Vec::new(),
            cycle_count: 0,
            reflection: None,
            summary: None,
            response: String::new(),
        }
    }

    /// The most recent retrieval batch, if any.
    pub fn latest_batch(&self) -> Option<&[Document]> {
        self.retrieved_documents.last().map(Vec::as_slice)
    }

    /// Documents that passed the relevance filter, across all cycles.
    ///
    /// Batches without a matching flag vector (pipelines that skip ranking)
    /// are taken whole.
    pub fn relevant_documents(&self) -> Vec<&Document> {
        let mut docs = Vec::new();
        for (i, batch) in self.retrieved_documents.iter().enumerate() {
            match self.relevance_flags.get(i) {
                Some(flags) => {
                    docs.extend(
                        batch
                            .iter()
                            .zip(flags.iter())
                            .filter(|(_, flag)| **flag)
                            .map(|(doc, _)| doc),
                    );
                }
                None => docs.extend(batch.iter()),
            }
        }
        docs
    }

    /// Merge a step's partial update into the canonical state.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(classification) = update.classification {
            self.classification = Some(classification);
        }
        if let Some(queries) = update.generated_queries {
            self.generated_queries = queries;
        }
        if let Some(batch) = update.document_batch {
            self.retrieved_documents.push(batch);
        }
        if let Some(flags) = update.relevance_flags {
            self.relevance_flags.push(flags);
        }
        if let Some(reflection) = update.reflection {
            self.reflection = Some(reflection);
        }
        self.cycle_count += update.cycle_increment;
        if let Some(summary) = update.summary {
            self.summary = Some(summary);
        }
        if let Some(text) = update.response_append {
            self.response.push_str(&text);
        }
    }
}

/// Partial state update returned by a step.
///
/// Each field carries its own merge semantics: set-once fields overwrite,
/// batch fields append, `response_append` concatenates.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub classification: Option<Classification>,
    pub generated_queries: Option<Vec<String>>,
    pub document_batch: Option<Vec<Document>>,
    pub relevance_flags: Option<Vec<bool>>,
    pub reflection: Option<Reflection>,
    pub cycle_increment: u32,
    pub summary: Option<String>,
    pub response_append: Option<String>,
}

impl StateUpdate {
    /// An update that changes nothing (pure branch-decision steps).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Replace the query list with this cycle's queries.
    pub fn replace_queries(mut self, queries: Vec<String>) -> Self {
        self.generated_queries = Some(queries);
        self
    }

    /// Append one retrieval batch.
    pub fn push_documents(mut self, batch: Vec<Document>) -> Self {
        self.document_batch = Some(batch);
        self
    }

    /// Append the relevance flags for the latest batch.
    pub fn push_flags(mut self, flags: Vec<bool>) -> Self {
        self.relevance_flags = Some(flags);
        self
    }

    pub fn with_reflection(mut self, reflection: Reflection) -> Self {
        self.reflection = Some(reflection);
        self
    }

    /// Request one more retrieval cycle.
    pub fn bump_cycle(mut self) -> Self {
        self.cycle_increment += 1;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn append_response(mut self, text: impl Into<String>) -> Self {
        self.response_append = Some(text.into());
        self
    }
}
