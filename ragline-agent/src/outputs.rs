//! Structured completion payloads.
//!
//! Each type here doubles as the JSON schema handed to
//! [`Completion::complete_structured`](crate::ports::Completion) and the
//! deserialization target for its payload. A payload that does not
//! deserialize is a [`AgentError::SchemaInvalid`] and fails the calling
//! step.

use ragline_core::state::{Classification, Complexity, QueryDomain, Reflection};
use schemars::{schema_for, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Domain verdict as the model reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DomainLabel {
    InDomain,
    General,
}

/// Complexity tier as the model reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ComplexityLabel {
    Low,
    Medium,
    High,
}

/// Output of the classification step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzerOutput {
    /// Whether the question needs the retrieval path.
    pub query_domain: DomainLabel,
    /// Main topics of the question.
    pub key_topics: Vec<String>,
    /// What context would be needed to answer well.
    pub context_requirements: String,
    /// Reasoning complexity of the question.
    pub query_complexity: ComplexityLabel,
    /// Language the user wrote in.
    pub user_language: String,
}

impl AnalyzerOutput {
    pub fn into_classification(self) -> Classification {
        Classification {
            domain: match self.query_domain {
                DomainLabel::InDomain => QueryDomain::InDomain,
                DomainLabel::General => QueryDomain::General,
            },
            key_topics: self.key_topics,
            context_requirements: self.context_requirements,
            complexity: match self.query_complexity {
                ComplexityLabel::Low => Complexity::Low,
                ComplexityLabel::Medium => Complexity::Medium,
                ComplexityLabel::High => Complexity::High,
            },
            user_language: self.user_language,
        }
    }
}

/// Output of the query-generation step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueriesOutput {
    /// Search queries for this retrieval cycle.
    pub queries: Vec<String>,
}

/// Output of the document-ranking step. One flag per document of the batch
/// being ranked, in document order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankingOutput {
    pub relevance_flags: Vec<bool>,
}

/// Output of the reflection step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionOutput {
    /// Whether another retrieval cycle is warranted.
    pub requires_additional_retrieval: bool,
    /// Critique of the material gathered so far.
    #[serde(default)]
    pub reflection: Option<String>,
    /// What to look for next, if anything.
    #[serde(default)]
    pub recommended_next_steps: Option<String>,
}

impl ReflectionOutput {
    pub fn into_reflection(self) -> Reflection {
        Reflection {
            requires_additional_retrieval: self.requires_additional_retrieval,
            critique: self.reflection,
            recommended_next_steps: self.recommended_next_steps,
        }
    }
}

/// JSON schema of a structured output type.
pub fn schema_of<T: JsonSchema>() -> Result<Value> {
    Ok(serde_json::to_value(schema_for!(T))?)
}

/// Deserialize a structured payload; a mismatch is a schema failure.
pub fn parse_structured<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| AgentError::schema_invalid(e.to_string()))
}
