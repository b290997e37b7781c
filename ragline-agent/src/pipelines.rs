//! The shipped pipeline wirings.
//!
//! Two graph shapes cover the three agents: the policy pipeline ranks and
//! reflects before answering, the post-hoc shape (scripture, analytics)
//! answers first and reflects on the draft. Both route general questions to
//! a direct answer and bound reflection-requested retrieval cycles by the
//! profile's `max_cycles`.

use std::sync::Arc;

use ragline_core::prelude::*;
use ragline_tools::ToolRegistry;

use crate::{
    ports::{Completion, Retrieval},
    profile::AgentProfile,
    steps::{
        AnswerStep, ClassifyStep, QueryGenStep, RankStep, ReflectStep, ReflectionInput,
        RetrieveStep, SummarizeStep,
    },
};

/// The capability implementations a pipeline is wired against.
#[derive(Clone)]
pub struct AgentPorts {
    pub completion: Arc<dyn Completion>,
    pub retrieval: Arc<dyn Retrieval>,
    pub tools: Arc<ToolRegistry>,
}

fn is_in_domain(state: &RunState) -> bool {
    // A missing classification falls back to the direct path rather than
    // spending retrieval cycles on an unclassified question.
    state
        .classification
        .as_ref()
        .is_some_and(|c| c.domain == QueryDomain::InDomain)
}

fn wants_more_retrieval(state: &RunState, max_cycles: u32) -> bool {
    state
        .reflection
        .as_ref()
        .is_some_and(|r| r.requires_additional_retrieval)
        && state.cycle_count < max_cycles
}

/// Steps of the policy pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyStep {
    Classify,
    DirectAnswer,
    QueryGen,
    Retrieve,
    Rank,
    Reflect,
    Summarize,
    Generate,
}

impl StepId for PolicyStep {
    fn name(&self) -> &'static str {
        match self {
            PolicyStep::Classify => "classify",
            PolicyStep::DirectAnswer => "direct_answer",
            PolicyStep::QueryGen => "query_gen",
            PolicyStep::Retrieve => "retrieve",
            PolicyStep::Rank => "rank",
            PolicyStep::Reflect => "reflect",
            PolicyStep::Summarize => "summarize",
            PolicyStep::Generate => "generate",
        }
    }
}

/// Build the policy workflow: classify, then either answer directly or loop
/// query-gen / retrieve / rank / reflect until reflection is satisfied or
/// the cycle bound is hit, then summarize and generate.
pub fn policy_pipeline(
    ports: &AgentPorts,
    profile: AgentProfile,
) -> Result<Workflow<PolicyStep>> {
    let max_cycles = profile.max_cycles;

    Workflow::builder(profile.name.clone())
        .start(PolicyStep::Classify)
        .step(
            PolicyStep::Classify,
            ClassifyStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PolicyStep::DirectAnswer,
            AnswerStep::direct(
                ports.completion.clone(),
                ports.tools.clone(),
                profile.clone(),
            ),
        )
        .step(
            PolicyStep::QueryGen,
            QueryGenStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PolicyStep::Retrieve,
            RetrieveStep::new(ports.retrieval.clone(), profile.retrieval_k),
        )
        .step(
            PolicyStep::Rank,
            RankStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PolicyStep::Reflect,
            ReflectStep::new(
                ports.completion.clone(),
                profile.clone(),
                ReflectionInput::RelevantDocuments,
            ),
        )
        .step(
            PolicyStep::Summarize,
            SummarizeStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PolicyStep::Generate,
            AnswerStep::grounded(
                ports.completion.clone(),
                ports.tools.clone(),
                profile.clone(),
            ),
        )
        .branch(
            PolicyStep::Classify,
            vec![
                Next::Step(PolicyStep::QueryGen),
                Next::Step(PolicyStep::DirectAnswer),
            ],
            |state| {
                if is_in_domain(state) {
                    Next::Step(PolicyStep::QueryGen)
                } else {
                    Next::Step(PolicyStep::DirectAnswer)
                }
            },
        )
        .edge(PolicyStep::DirectAnswer, Next::End)
        .edge(PolicyStep::QueryGen, Next::Step(PolicyStep::Retrieve))
        .edge(PolicyStep::Retrieve, Next::Step(PolicyStep::Rank))
        .edge(PolicyStep::Rank, Next::Step(PolicyStep::Reflect))
        .branch(
            PolicyStep::Reflect,
            vec![
                Next::Step(PolicyStep::QueryGen),
                Next::Step(PolicyStep::Summarize),
            ],
            move |state| {
                if wants_more_retrieval(state, max_cycles) {
                    Next::Step(PolicyStep::QueryGen)
                } else {
                    Next::Step(PolicyStep::Summarize)
                }
            },
        )
        .edge(PolicyStep::Summarize, Next::Step(PolicyStep::Generate))
        .edge(PolicyStep::Generate, Next::End)
        .build()
}

/// Steps of the post-hoc-reflection shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostHocStep {
    Classify,
    DirectAnswer,
    QueryGen,
    Retrieve,
    Summarize,
    Generate,
    Reflect,
}

impl StepId for PostHocStep {
    fn name(&self) -> &'static str {
        match self {
            PostHocStep::Classify => "classify",
            PostHocStep::DirectAnswer => "direct_answer",
            PostHocStep::QueryGen => "query_gen",
            PostHocStep::Retrieve => "retrieve",
            PostHocStep::Summarize => "summarize",
            PostHocStep::Generate => "generate",
            PostHocStep::Reflect => "reflect",
        }
    }
}

/// Build a post-hoc-reflection workflow: answer from one retrieval pass,
/// then critique the draft and loop back to query generation if the critique
/// asks for more material. No ranking; every retrieved document feeds the
/// summary.
pub fn posthoc_pipeline(
    ports: &AgentPorts,
    profile: AgentProfile,
) -> Result<Workflow<PostHocStep>> {
    let max_cycles = profile.max_cycles;

    Workflow::builder(profile.name.clone())
        .start(PostHocStep::Classify)
        .step(
            PostHocStep::Classify,
            ClassifyStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PostHocStep::DirectAnswer,
            AnswerStep::direct(
                ports.completion.clone(),
                ports.tools.clone(),
                profile.clone(),
            ),
        )
        .step(
            PostHocStep::QueryGen,
            QueryGenStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PostHocStep::Retrieve,
            RetrieveStep::new(ports.retrieval.clone(), profile.retrieval_k),
        )
        .step(
            PostHocStep::Summarize,
            SummarizeStep::new(ports.completion.clone(), profile.clone()),
        )
        .step(
            PostHocStep::Generate,
            AnswerStep::grounded(
                ports.completion.clone(),
                ports.tools.clone(),
                profile.clone(),
            ),
        )
        .step(
            PostHocStep::Reflect,
            ReflectStep::new(
                ports.completion.clone(),
                profile.clone(),
                ReflectionInput::DraftResponse,
            ),
        )
        .branch(
            PostHocStep::Classify,
            vec![
                Next::Step(PostHocStep::QueryGen),
                Next::Step(PostHocStep::DirectAnswer),
            ],
            |state| {
                if is_in_domain(state) {
                    Next::Step(PostHocStep::QueryGen)
                } else {
                    Next::Step(PostHocStep::DirectAnswer)
                }
            },
        )
        .edge(PostHocStep::DirectAnswer, Next::End)
        .edge(PostHocStep::QueryGen, Next::Step(PostHocStep::Retrieve))
        .edge(PostHocStep::Retrieve, Next::Step(PostHocStep::Summarize))
        .edge(PostHocStep::Summarize, Next::Step(PostHocStep::Generate))
        .edge(PostHocStep::Generate, Next::Step(PostHocStep::Reflect))
        .branch(
            PostHocStep::Reflect,
            vec![Next::Step(PostHocStep::QueryGen), Next::End],
            move |state| {
                if wants_more_retrieval(state, max_cycles) {
                    Next::Step(PostHocStep::QueryGen)
                } else {
                    Next::End
                }
            },
        )
        .build()
}

/// The scripture agent: post-hoc shape over a dense corpus.
pub fn scripture_pipeline(ports: &AgentPorts) -> Result<Workflow<PostHocStep>> {
    posthoc_pipeline(ports, AgentProfile::scripture())
}

/// The retail-analytics agent: post-hoc shape with the analytics profile.
pub fn analytics_pipeline(ports: &AgentPorts) -> Result<Workflow<PostHocStep>> {
    posthoc_pipeline(ports, AgentProfile::analytics())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::testkit::{FakeRetrieval, ScriptedCompletion};

    fn analyzer_payload(domain: &str) -> Value {
        json!({
            "query_domain": domain,
            "key_topics": ["pto"],
            "context_requirements": "leave policy",
            "query_complexity": "Medium",
            "user_language": "English",
        })
    }

    fn reflection_payload(requires: bool) -> Value {
        json!({
            "requires_additional_retrieval": requires,
            "reflection": "needs the carryover rule",
            "recommended_next_steps": "search for carryover",
        })
    }

    fn ports_with(completion: Arc<ScriptedCompletion>, retrieval: FakeRetrieval) -> AgentPorts {
        AgentPorts {
            completion,
            retrieval: Arc::new(retrieval),
            tools: Arc::new(ToolRegistry::new()),
        }
    }

    fn question() -> RunState {
        RunState::new(vec![Message::user("How much PTO do I get?")])
    }

    #[tokio::test]
    async fn policy_run_terminates_under_insatiable_reflection() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(analyzer_payload("in-domain"));
        // Cycle 1: two queries, k=2 each, so four flags.
        completion.push_structured(json!({ "queries": ["pto accrual", "pto carryover"] }));
        completion.push_structured(json!({ "relevance_flags": [true, true, false, true] }));
        completion.push_structured(reflection_payload(true));
        // Cycle 2: reflection asks again, bound stops it afterwards.
        completion.push_structured(json!({ "queries": ["notice period"] }));
        completion.push_structured(json!({ "relevance_flags": [true, false] }));
        completion.push_structured(reflection_payload(true));
        completion.push_plain("25 days, carryover capped at 5.");
        completion.push_text_stream("You get 25 days of PTO.");

        let ports = ports_with(completion, FakeRetrieval::new());
        let workflow = policy_pipeline(&ports, AgentProfile::policy()).unwrap();
        let outcome = workflow
            .execute(question(), &EventSink::discard())
            .await
            .unwrap();

        // Two batches despite reflection always asking for more.
        assert_eq!(outcome.state.retrieved_documents.len(), 2);
        assert_eq!(outcome.state.relevance_flags.len(), 2);
        assert_eq!(outcome.state.cycle_count, 2);
        assert_eq!(
            outcome.state.summary.as_deref(),
            Some("25 days, carryover capped at 5.")
        );
        assert_eq!(outcome.state.response, "You get 25 days of PTO.");

        let order: Vec<&str> = outcome.trace.iter().map(|t| t.step).collect();
        assert_eq!(
            order,
            vec![
                "classify", "query_gen", "retrieve", "rank", "reflect", "query_gen", "retrieve",
                "rank", "reflect", "summarize", "generate",
            ]
        );
    }

    #[tokio::test]
    async fn policy_loop_exits_once_reflection_is_satisfied() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(analyzer_payload("in-domain"));
        completion.push_structured(json!({ "queries": ["pto accrual"] }));
        completion.push_structured(json!({ "relevance_flags": [true, true] }));
        completion.push_structured(reflection_payload(true));
        completion.push_structured(json!({ "queries": ["pto carryover"] }));
        completion.push_structured(json!({ "relevance_flags": [true, false] }));
        completion.push_structured(reflection_payload(false));
        completion.push_plain("25 days, carryover capped at 5.");
        completion.push_text_stream("You get 25 days of PTO.");

        let ports = ports_with(completion, FakeRetrieval::new());
        let workflow = policy_pipeline(&ports, AgentProfile::policy()).unwrap();
        let outcome = workflow
            .execute(question(), &EventSink::discard())
            .await
            .unwrap();

        // One granted extra cycle, then reflection was satisfied.
        assert_eq!(outcome.state.retrieved_documents.len(), 2);
        assert_eq!(outcome.state.cycle_count, 1);
        assert!(!outcome.state.response.is_empty());

        let order: Vec<&str> = outcome.trace.iter().map(|t| t.step).collect();
        assert_eq!(order.iter().filter(|s| **s == "summarize").count(), 1);
        assert_eq!(order.iter().filter(|s| **s == "generate").count(), 1);
    }

    #[tokio::test]
    async fn general_question_takes_the_direct_path() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(analyzer_payload("general"));
        completion.push_text_stream("Paris is the capital of France.");

        let ports = ports_with(completion, FakeRetrieval::new());
        let workflow = policy_pipeline(&ports, AgentProfile::policy()).unwrap();
        let outcome = workflow
            .execute(
                RunState::new(vec![Message::user("What is the capital of France?")]),
                &EventSink::discard(),
            )
            .await
            .unwrap();

        assert!(outcome.state.retrieved_documents.is_empty());
        assert_eq!(outcome.state.response, "Paris is the capital of France.");
        assert_eq!(outcome.steps, 2);

        let order: Vec<&str> = outcome.trace.iter().map(|t| t.step).collect();
        assert_eq!(order, vec!["classify", "direct_answer"]);
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_with_the_retrieve_step_named() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(analyzer_payload("in-domain"));
        completion.push_structured(json!({ "queries": ["bad topic"] }));

        let ports = ports_with(completion, FakeRetrieval::new().failing_on("bad topic"));
        let workflow = policy_pipeline(&ports, AgentProfile::policy()).unwrap();
        let err = workflow
            .execute(question(), &EventSink::discard())
            .await
            .unwrap_err();

        assert_eq!(err.failing_step(), Some("retrieve"));
    }

    #[tokio::test]
    async fn posthoc_run_reflects_on_the_draft_and_loops_once() {
        let completion = Arc::new(ScriptedCompletion::new());
        completion.push_structured(analyzer_payload("in-domain"));
        completion.push_structured(json!({ "queries": ["fasting before communion"] }));
        completion.push_plain("Fasting practice summary.");
        completion.push_text_stream("A first draft. ");
        completion.push_structured(reflection_payload(true));
        completion.push_structured(json!({ "queries": ["eucharistic fast duration"] }));
        completion.push_plain("Expanded fasting summary.");
        completion.push_text_stream("A fuller answer.");
        completion.push_structured(reflection_payload(false));

        let ports = ports_with(completion, FakeRetrieval::new());
        let workflow = scripture_pipeline(&ports).unwrap();
        let outcome = workflow
            .execute(
                RunState::new(vec![Message::user("How long is the fast before communion?")]),
                &EventSink::discard(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.state.retrieved_documents.len(), 2);
        // Scripture retrieval pulls ten documents per query.
        assert_eq!(outcome.state.retrieved_documents[0].len(), 10);
        // No ranking in this shape.
        assert!(outcome.state.relevance_flags.is_empty());
        assert_eq!(outcome.state.cycle_count, 1);
        assert_eq!(outcome.state.response, "A first draft. A fuller answer.");

        let order: Vec<&str> = outcome.trace.iter().map(|t| t.step).collect();
        assert_eq!(
            order,
            vec![
                "classify", "query_gen", "retrieve", "summarize", "generate", "reflect",
                "query_gen", "retrieve", "summarize", "generate", "reflect",
            ]
        );
    }

    #[test]
    fn branch_predicates_are_total_over_missing_state() {
        let state = question();
        // No classification yet: the router must still pick a declared target.
        assert!(!is_in_domain(&state));
        // No reflection yet: no extra cycle is requested.
        assert!(!wants_more_retrieval(&state, 2));

        let mut state = question();
        state.apply(StateUpdate::none().with_reflection(Reflection {
            requires_additional_retrieval: true,
            critique: None,
            recommended_next_steps: None,
        }));
        assert!(wants_more_retrieval(&state, 2));
        state.apply(StateUpdate::none().bump_cycle().bump_cycle());
        assert!(!wants_more_retrieval(&state, 2));
    }

    #[tokio::test]
    async fn pipelines_build_against_shared_ports() {
        let completion = Arc::new(ScriptedCompletion::new());
        let ports = ports_with(completion, FakeRetrieval::new());

        assert!(policy_pipeline(&ports, AgentProfile::policy()).is_ok());
        assert!(scripture_pipeline(&ports).is_ok());
        assert!(analytics_pipeline(&ports).is_ok());
    }
}
