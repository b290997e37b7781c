//! # ragline-agent
//!
//! The retrieval-augmented agent layer on top of `ragline-core`: capability
//! ports for completion and retrieval, structured model outputs, the
//! business steps, the tool-calling answer loop, and the shipped pipeline
//! wirings.
//!
//! Pipelines are built from an [`AgentPorts`](pipelines::AgentPorts) bundle
//! so every external capability is injected; nothing here owns a global
//! client. Runs start through [`AgentRunner`](runner::AgentRunner), which
//! returns a live event stream and a handle to the final outcome.

pub mod error;
pub mod outputs;
pub mod pipelines;
pub mod ports;
pub mod profile;
pub mod prompts;
pub mod react;
pub mod runner;
pub mod steps;

#[cfg(test)]
pub(crate) mod testkit;

pub use crate::{
    error::{AgentError, Result},
    pipelines::{
        analytics_pipeline, policy_pipeline, posthoc_pipeline, scripture_pipeline, AgentPorts,
        PolicyStep, PostHocStep,
    },
    ports::{
        Completion, CompletionChunk, CompletionStream, HttpRetrieval, Retrieval, RetrievalConfig,
    },
    profile::{AgentProfile, MAX_CYCLES},
    react::{ToolLoop, MAX_TOOL_ROUNDS},
    runner::AgentRunner,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};

    pub use crate::{
        error::{AgentError, Result},
        outputs::{AnalyzerOutput, QueriesOutput, RankingOutput, ReflectionOutput},
        pipelines::{
            analytics_pipeline, policy_pipeline, posthoc_pipeline, scripture_pipeline,
            AgentPorts, PolicyStep, PostHocStep,
        },
        ports::{
            Completion, CompletionChunk, CompletionStream, HttpRetrieval, Retrieval,
            RetrievalConfig,
        },
        profile::{AgentProfile, MAX_CYCLES},
        react::{ToolLoop, MAX_TOOL_ROUNDS},
        runner::AgentRunner,
        steps::{
            AnswerMode, AnswerStep, ClassifyStep, QueryGenStep, RankStep, ReflectStep,
            ReflectionInput, RetrieveStep, SummarizeStep,
        },
    };
}
