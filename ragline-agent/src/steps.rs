//! The business steps shared by the shipped pipelines.
//!
//! Every step reads the run state, calls one capability port, publishes
//! events, and returns a partial update. Routing between steps lives in
//! `pipelines`, not here.

use std::sync::Arc;

use futures::future::try_join_all;
use ragline_core::prelude::*;
use ragline_tools::ToolRegistry;
use tracing::info;

use crate::{
    error::AgentError,
    outputs::{
        parse_structured, schema_of, AnalyzerOutput, QueriesOutput, RankingOutput,
        ReflectionOutput,
    },
    ports::{Completion, Retrieval},
    profile::AgentProfile,
    prompts,
    react::ToolLoop,
};

/// Classifies the incoming question: domain, topics, complexity, language.
pub struct ClassifyStep {
    completion: Arc<dyn Completion>,
    profile: AgentProfile,
}

impl ClassifyStep {
    pub fn new(completion: Arc<dyn Completion>, profile: AgentProfile) -> Self {
        Self {
            completion,
            profile,
        }
    }
}

#[async_trait]
impl Step for ClassifyStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let schema = schema_of::<AnalyzerOutput>().map_err(EngineError::from)?;
        let messages = prompts::classification_request(&self.profile, &state.user_input);
        let payload = self
            .completion
            .complete_structured(&messages, &schema)
            .await
            .map_err(EngineError::from)?;
        let classification = parse_structured::<AnalyzerOutput>(payload)
            .map_err(EngineError::from)?
            .into_classification();

        info!(run_id = %state.run_id, domain = ?classification.domain, "classified question");
        events.reasoning(self.name(), classification.summary()).await?;
        Ok(StateUpdate::none().with_classification(classification))
    }

    fn name(&self) -> String {
        "classify".to_string()
    }
}

/// Generates this cycle's search queries. Uses the reflective prompt once a
/// reflection verdict exists.
pub struct QueryGenStep {
    completion: Arc<dyn Completion>,
    profile: AgentProfile,
}

impl QueryGenStep {
    pub fn new(completion: Arc<dyn Completion>, profile: AgentProfile) -> Self {
        Self {
            completion,
            profile,
        }
    }
}

#[async_trait]
impl Step for QueryGenStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let messages = if state.reflection.is_some() {
            prompts::reflective_query_request(&self.profile, state)
        } else {
            prompts::query_generation_request(&self.profile, state)
        };
        let schema = schema_of::<QueriesOutput>().map_err(EngineError::from)?;
        let payload = self
            .completion
            .complete_structured(&messages, &schema)
            .await
            .map_err(EngineError::from)?;
        let output: QueriesOutput = parse_structured(payload).map_err(EngineError::from)?;

        if output.queries.is_empty() {
            return Err(AgentError::schema_invalid("model returned an empty query list").into());
        }

        events
            .reasoning(
                self.name(),
                format!("Searching for: {}", output.queries.join("; ")),
            )
            .await?;
        Ok(StateUpdate::none().replace_queries(output.queries))
    }

    fn name(&self) -> String {
        "query_gen".to_string()
    }
}

/// Fans one retrieval call per query out concurrently and appends the
/// flattened results as one batch, in query order.
///
/// All-or-nothing: if any sub-call fails, the step fails and no batch is
/// appended.
pub struct RetrieveStep {
    retrieval: Arc<dyn Retrieval>,
    k: usize,
}

impl RetrieveStep {
    pub fn new(retrieval: Arc<dyn Retrieval>, k: usize) -> Self {
        Self { retrieval, k }
    }
}

#[async_trait]
impl Step for RetrieveStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let calls = state
            .generated_queries
            .iter()
            .map(|query| self.retrieval.retrieve(query, self.k));
        // try_join_all keeps input order, so the batch layout is deterministic
        // regardless of arrival order.
        let batches = try_join_all(calls).await.map_err(EngineError::from)?;
        let batch: Vec<Document> = batches.into_iter().flatten().collect();

        info!(
            run_id = %state.run_id,
            queries = state.generated_queries.len(),
            documents = batch.len(),
            "retrieval batch complete"
        );
        events
            .reasoning(
                self.name(),
                format!(
                    "Retrieved {} documents across {} queries",
                    batch.len(),
                    state.generated_queries.len()
                ),
            )
            .await?;
        Ok(StateUpdate::none().push_documents(batch))
    }

    fn name(&self) -> String {
        "retrieve".to_string()
    }
}

/// Judges each document of the latest batch for relevance and appends the
/// aligned flag vector.
pub struct RankStep {
    completion: Arc<dyn Completion>,
    profile: AgentProfile,
}

impl RankStep {
    pub fn new(completion: Arc<dyn Completion>, profile: AgentProfile) -> Self {
        Self {
            completion,
            profile,
        }
    }
}

#[async_trait]
impl Step for RankStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let batch = state.latest_batch().ok_or_else(|| {
            EngineError::configuration("ranking requires a prior retrieval batch")
        })?;

        let messages = prompts::ranking_request(&self.profile, state, batch);
        let schema = schema_of::<RankingOutput>().map_err(EngineError::from)?;
        let payload = self
            .completion
            .complete_structured(&messages, &schema)
            .await
            .map_err(EngineError::from)?;
        let output: RankingOutput = parse_structured(payload).map_err(EngineError::from)?;

        if output.relevance_flags.len() != batch.len() {
            return Err(AgentError::schema_invalid(format!(
                "expected {} relevance flags, model returned {}",
                batch.len(),
                output.relevance_flags.len()
            ))
            .into());
        }

        let kept = output.relevance_flags.iter().filter(|flag| **flag).count();
        events
            .reasoning(
                self.name(),
                format!("Kept {kept} of {} documents", batch.len()),
            )
            .await?;
        Ok(StateUpdate::none().push_flags(output.relevance_flags))
    }

    fn name(&self) -> String {
        "rank".to_string()
    }
}

/// What the reflection step critiques.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionInput {
    /// The documents gathered so far (reflection before answering).
    RelevantDocuments,
    /// The accumulated draft answer (reflection after answering).
    DraftResponse,
}

/// Asks the model whether another retrieval cycle is warranted. Requests
/// count against the cycle bound.
pub struct ReflectStep {
    completion: Arc<dyn Completion>,
    profile: AgentProfile,
    input: ReflectionInput,
}

impl ReflectStep {
    pub fn new(
        completion: Arc<dyn Completion>,
        profile: AgentProfile,
        input: ReflectionInput,
    ) -> Self {
        Self {
            completion,
            profile,
            input,
        }
    }
}

#[async_trait]
impl Step for ReflectStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let messages = match self.input {
            ReflectionInput::RelevantDocuments => {
                prompts::reflection_over_documents(&self.profile, state)
            }
            ReflectionInput::DraftResponse => prompts::reflection_over_draft(&self.profile, state),
        };
        let schema = schema_of::<ReflectionOutput>().map_err(EngineError::from)?;
        let payload = self
            .completion
            .complete_structured(&messages, &schema)
            .await
            .map_err(EngineError::from)?;
        let reflection = parse_structured::<ReflectionOutput>(payload)
            .map_err(EngineError::from)?
            .into_reflection();

        events.reasoning(self.name(), reflection.summary()).await?;

        let mut update = StateUpdate::none();
        if reflection.requires_additional_retrieval {
            update = update.bump_cycle();
        }
        Ok(update.with_reflection(reflection))
    }

    fn name(&self) -> String {
        "reflect".to_string()
    }
}

/// Condenses the relevant documents into a briefing for answer generation.
pub struct SummarizeStep {
    completion: Arc<dyn Completion>,
    profile: AgentProfile,
}

impl SummarizeStep {
    pub fn new(completion: Arc<dyn Completion>, profile: AgentProfile) -> Self {
        Self {
            completion,
            profile,
        }
    }
}

#[async_trait]
impl Step for SummarizeStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        events
            .reasoning(
                self.name(),
                format!(
                    "Summarizing {} relevant documents",
                    state.relevant_documents().len()
                ),
            )
            .await?;

        let messages = prompts::summarization_request(&self.profile, state);
        let summary = self
            .completion
            .complete(&messages)
            .await
            .map_err(EngineError::from)?;
        Ok(StateUpdate::none().with_summary(summary))
    }

    fn name(&self) -> String {
        "summarize".to_string()
    }
}

/// Whether the answer is grounded in gathered material or given directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    Direct,
    Grounded,
}

/// Produces the answer through the tool-calling loop, streaming response
/// tokens as they arrive.
pub struct AnswerStep {
    tool_loop: ToolLoop,
    profile: AgentProfile,
    mode: AnswerMode,
}

impl AnswerStep {
    pub fn direct(
        completion: Arc<dyn Completion>,
        tools: Arc<ToolRegistry>,
        profile: AgentProfile,
    ) -> Self {
        Self {
            tool_loop: ToolLoop::new(completion, tools),
            profile,
            mode: AnswerMode::Direct,
        }
    }

    pub fn grounded(
        completion: Arc<dyn Completion>,
        tools: Arc<ToolRegistry>,
        profile: AgentProfile,
    ) -> Self {
        Self {
            tool_loop: ToolLoop::new(completion, tools),
            profile,
            mode: AnswerMode::Grounded,
        }
    }
}

#[async_trait]
impl Step for AnswerStep {
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate> {
        let conversation = match self.mode {
            AnswerMode::Direct => prompts::direct_answer_request(&self.profile, state),
            AnswerMode::Grounded => prompts::grounded_answer_request(&self.profile, state),
        };
        let answer = self.tool_loop.run(conversation, &self.name(), events).await?;
        Ok(StateUpdate::none().append_response(answer))
    }

    fn name(&self) -> String {
        match self.mode {
            AnswerMode::Direct => "direct_answer".to_string(),
            AnswerMode::Grounded => "generate".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testkit::{FakeRetrieval, ScriptedCompletion};

    fn state_with_queries(queries: &[&str]) -> RunState {
        let mut state = RunState::new(vec![Message::user("How much PTO do I get?")]);
        state.apply(
            StateUpdate::none().replace_queries(queries.iter().map(|q| q.to_string()).collect()),
        );
        state
    }

    #[tokio::test]
    async fn classify_stores_classification_and_reports() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(json!({
            "query_domain": "in-domain",
            "key_topics": ["pto"],
            "context_requirements": "leave policy",
            "query_complexity": "Low",
            "user_language": "English",
        }));

        let step = ClassifyStep::new(completion, AgentProfile::policy());
        let state = RunState::new(vec![Message::user("How much PTO do I get?")]);
        let update = step.run(&state, &EventSink::discard()).await.unwrap();

        let classification = update.classification.unwrap();
        assert_eq!(classification.domain, QueryDomain::InDomain);
    }

    #[tokio::test]
    async fn query_gen_rejects_empty_query_list() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(json!({ "queries": [] }));

        let step = QueryGenStep::new(completion, AgentProfile::policy());
        let state = RunState::new(vec![Message::user("hi")]);
        let err = step.run(&state, &EventSink::discard()).await.unwrap_err();
        assert!(err.to_string().contains("empty query list"));
    }

    #[tokio::test(start_paused = true)]
    async fn retrieve_preserves_query_order_under_staggered_latency() {
        // q1 slowest, q3 fastest; the batch must still group q1, q2, q3.
        let retrieval = Arc::new(
            FakeRetrieval::new()
                .with_delay("q1", Duration::from_millis(300))
                .with_delay("q2", Duration::from_millis(150)),
        );
        let step = RetrieveStep::new(retrieval, 1);
        let state = state_with_queries(&["q1", "q2", "q3"]);

        let update = step.run(&state, &EventSink::discard()).await.unwrap();
        let batch = update.document_batch.unwrap();
        let contents: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["doc 0 for q1", "doc 0 for q2", "doc 0 for q3"]
        );
    }

    #[tokio::test]
    async fn retrieve_is_all_or_nothing() {
        let retrieval = Arc::new(FakeRetrieval::new().failing_on("bad topic"));
        let step = RetrieveStep::new(retrieval, 2);
        let state = state_with_queries(&["good topic", "bad topic"]);

        let err = step.run(&state, &EventSink::discard()).await.unwrap_err();
        assert!(err.to_string().contains("bad topic"));
    }

    #[tokio::test]
    async fn rank_rejects_misaligned_flags() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(json!({ "relevance_flags": [true] }));

        let step = RankStep::new(completion, AgentProfile::policy());
        let mut state = state_with_queries(&["q"]);
        state.apply(
            StateUpdate::none()
                .push_documents(vec![Document::new("one"), Document::new("two")]),
        );

        let err = step.run(&state, &EventSink::discard()).await.unwrap_err();
        assert!(err.to_string().contains("expected 2 relevance flags"));
    }

    #[tokio::test]
    async fn rank_without_batch_is_a_configuration_error() {
        let completion = Arc::new(ScriptedCompletion::new());
        let step = RankStep::new(completion, AgentProfile::policy());
        let state = RunState::new(vec![Message::user("hi")]);

        let err = step.run(&state, &EventSink::discard()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn reflect_bumps_cycle_only_when_more_retrieval_is_requested() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(json!({
            "requires_additional_retrieval": true,
            "reflection": "missing the carryover rule",
            "recommended_next_steps": "search for carryover",
        }));
        completion.push_structured(json!({ "requires_additional_retrieval": false }));

        let step = ReflectStep::new(
            completion,
            AgentProfile::policy(),
            ReflectionInput::RelevantDocuments,
        );
        let state = RunState::new(vec![Message::user("hi")]);

        let update = step.run(&state, &EventSink::discard()).await.unwrap();
        assert_eq!(update.cycle_increment, 1);
        assert!(update.reflection.unwrap().requires_additional_retrieval);

        let update = step.run(&state, &EventSink::discard()).await.unwrap();
        assert_eq!(update.cycle_increment, 0);
    }

    #[tokio::test]
    async fn summarize_stores_the_briefing() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_plain("25 days, accrued monthly.");

        let step = SummarizeStep::new(completion, AgentProfile::policy());
        let mut state = state_with_queries(&["q"]);
        state.apply(StateUpdate::none().push_documents(vec![Document::new("policy text")]));

        let update = step.run(&state, &EventSink::discard()).await.unwrap();
        assert_eq!(update.summary.as_deref(), Some("25 days, accrued monthly."));
    }

    #[tokio::test]
    async fn answer_step_appends_streamed_text() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_text_stream("You get 25 days.");

        let step = AnswerStep::direct(
            completion,
            Arc::new(ToolRegistry::new()),
            AgentProfile::policy(),
        );
        let state = RunState::new(vec![Message::user("How much PTO do I get?")]);

        let update = step.run(&state, &EventSink::discard()).await.unwrap();
        assert_eq!(update.response_append.as_deref(), Some("You get 25 days."));
        assert_eq!(step.name(), "direct_answer");
    }
}
