//! Prompt assembly for the pipeline steps.
//!
//! Deliberately minimal templates: each function builds the conversation a
//! step sends through its completion port, interpolating the profile's
//! domain label and whatever the run state has accumulated so far.

use ragline_core::state::{Document, Message, RunState};

use crate::profile::AgentProfile;

/// Render retrieved documents for inclusion in a prompt.
pub fn format_documents(documents: &[&Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let metadata = serde_json::to_string(&doc.metadata).unwrap_or_default();
            format!(
                "Document {}\nMetadata: {}\nContent: {}",
                i + 1,
                metadata,
                doc.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Content of the most recent user message.
fn latest_question(user_input: &[Message]) -> &str {
    user_input
        .iter()
        .rev()
        .find(|m| m.role == ragline_core::state::Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Conversation for the classification step.
pub fn classification_request(profile: &AgentProfile, user_input: &[Message]) -> Vec<Message> {
    let mut messages = vec![Message::system(format!(
        "Classify the user's question with respect to {}. Decide whether it is \
         in-domain (needs the document corpus) or general, list its key topics, \
         describe the context required to answer it, rate its complexity, and \
         name the user's language.",
        profile.domain_label
    ))];
    messages.extend_from_slice(user_input);
    messages
}

/// Conversation for the query-generation step, first cycle.
pub fn query_generation_request(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    let classification = state
        .classification
        .as_ref()
        .map(|c| c.summary())
        .unwrap_or_default();
    vec![
        Message::system(format!(
            "Generate focused search queries against the {} corpus that together \
             cover the user's question.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\n{classification}",
            latest_question(&state.user_input)
        )),
    ]
}

/// Conversation for the query-generation step when a prior reflection asked
/// for another cycle.
pub fn reflective_query_request(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    let reflection = state
        .reflection
        .as_ref()
        .map(|r| r.summary())
        .unwrap_or_default();
    vec![
        Message::system(format!(
            "A previous search against the {} corpus was insufficient. Generate \
             new search queries targeting the gaps the reflection identified. Do \
             not repeat queries that were already tried.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\nPrevious queries: {}\n\n{reflection}",
            latest_question(&state.user_input),
            state.generated_queries.join("; "),
        )),
    ]
}

/// Conversation for the ranking step over the latest batch.
pub fn ranking_request(
    profile: &AgentProfile,
    state: &RunState,
    batch: &[Document],
) -> Vec<Message> {
    let docs: Vec<&Document> = batch.iter().collect();
    vec![
        Message::system(format!(
            "Judge each retrieved document for relevance to the user's question \
             about {}. Return one boolean per document, in order.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\n{}",
            latest_question(&state.user_input),
            format_documents(&docs),
        )),
    ]
}

/// Conversation for reflecting over the documents gathered so far.
pub fn reflection_over_documents(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    vec![
        Message::system(format!(
            "Assess whether the gathered {} material suffices to answer the \
             question. If not, say what is missing and what to search for next.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\n{}",
            latest_question(&state.user_input),
            format_documents(&state.relevant_documents()),
        )),
    ]
}

/// Conversation for reflecting over a drafted answer.
pub fn reflection_over_draft(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    vec![
        Message::system(format!(
            "Critique the drafted answer about {}. Decide whether more material \
             must be retrieved before the answer is adequate.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\nDraft answer: {}",
            latest_question(&state.user_input),
            state.response,
        )),
    ]
}

/// Conversation for the summarization step.
pub fn summarization_request(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    vec![
        Message::system(format!(
            "Condense the following {} material into a briefing that answers the \
             question. Keep every load-bearing fact and citation metadata.",
            profile.domain_label
        )),
        Message::user(format!(
            "Question: {}\n\n{}",
            latest_question(&state.user_input),
            format_documents(&state.relevant_documents()),
        )),
    ]
}

/// Conversation for answering a general question directly. The
/// classification summary rides along so the answer matches the question's
/// language and complexity.
pub fn direct_answer_request(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    let mut messages = vec![Message::system(profile.system_prompt.clone())];
    if let Some(classification) = &state.classification {
        messages.push(Message::system(classification.summary()));
    }
    messages.extend_from_slice(&state.user_input);
    messages
}

/// Conversation for generating the final grounded answer.
pub fn grounded_answer_request(profile: &AgentProfile, state: &RunState) -> Vec<Message> {
    let classification = state
        .classification
        .as_ref()
        .map(|c| c.summary())
        .unwrap_or_default();
    let mut messages = vec![
        Message::system(profile.system_prompt.clone()),
        Message::system(format!(
            "Ground your answer in this briefing:\n{}\n\n{classification}",
            state.summary.as_deref().unwrap_or("(no briefing available)"),
        )),
    ];
    messages.extend_from_slice(&state.user_input);
    messages
}

#[cfg(test)]
mod tests {
    use ragline_core::state::{Document, RunState, StateUpdate};
    use serde_json::json;

    use super::*;

    #[test]
    fn documents_are_numbered_with_metadata() {
        let docs = [
            Document::new("first").with_metadata("source", json!("handbook.pdf")),
            Document::new("second"),
        ];
        let refs: Vec<&Document> = docs.iter().collect();
        let rendered = format_documents(&refs);

        assert!(rendered.starts_with("Document 1"));
        assert!(rendered.contains("handbook.pdf"));
        assert!(rendered.contains("Document 2"));
    }

    #[test]
    fn reflective_query_request_carries_previous_queries() {
        let mut state = RunState::new(vec![Message::user("How much PTO?")]);
        state.apply(StateUpdate::none().replace_queries(vec!["pto accrual".to_string()]));

        let messages = reflective_query_request(&AgentProfile::policy(), &state);
        assert!(messages[1].content.contains("pto accrual"));
        assert!(messages[1].content.contains("How much PTO?"));
    }

    #[test]
    fn direct_answer_carries_the_classification_summary() {
        use ragline_core::state::{Classification, Complexity, Message, QueryDomain};

        let mut state = RunState::new(vec![Message::user("Qual é a capital da França?")]);
        state.apply(StateUpdate::none().with_classification(Classification {
            domain: QueryDomain::General,
            key_topics: vec!["geography".to_string()],
            context_requirements: "none".to_string(),
            complexity: Complexity::Low,
            user_language: "Portuguese".to_string(),
        }));

        let messages = direct_answer_request(&AgentProfile::policy(), &state);
        assert!(messages[1].content.contains("Portuguese"));
        assert_eq!(messages.last().unwrap().content, "Qual é a capital da França?");

        // Without a classification the conversation is just prompt + input.
        let bare = RunState::new(vec![Message::user("hi")]);
        assert_eq!(direct_answer_request(&AgentProfile::policy(), &bare).len(), 2);
    }

    #[test]
    fn grounded_answer_includes_summary_and_question() {
        let mut state = RunState::new(vec![Message::user("How much PTO?")]);
        state.apply(StateUpdate::none().with_summary("25 days per year."));

        let messages = grounded_answer_request(&AgentProfile::policy(), &state);
        assert!(messages[1].content.contains("25 days per year."));
        assert_eq!(messages.last().unwrap().content, "How much PTO?");
    }
}
