//! Tool-calling completion loop.
//!
//! Alternates between awaiting the model and executing the tools it asked
//! for, feeding each result back into the conversation, until the model
//! answers with text only. Text chunks are forwarded to the event sink as
//! they arrive, so the caller sees the answer stream even when tool calls
//! interleave.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use ragline_core::{
    error::{EngineError, Result},
    event::EventSink,
    state::Message,
};
use ragline_tools::{ToolError, ToolRegistry};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    error::AgentError,
    ports::{Completion, CompletionChunk},
};

/// Ceiling on tool round-trips per completion. Hitting it stops tool use and
/// answers with whatever text has accumulated.
pub const MAX_TOOL_ROUNDS: usize = 6;

/// Default deadline per tool call.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// One tool-calling completion over a conversation.
pub struct ToolLoop {
    completion: Arc<dyn Completion>,
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
    tool_timeout: Duration,
}

impl ToolLoop {
    pub fn new(completion: Arc<dyn Completion>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            completion,
            tools,
            max_rounds: MAX_TOOL_ROUNDS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run the loop to completion and return the accumulated answer text.
    ///
    /// A call to an unknown tool, or a call with malformed arguments, is fed
    /// back to the model as a tool message so it can correct itself. An
    /// execution failure of a known tool is fatal for the calling step, as is
    /// a call that outlives the per-call deadline.
    pub async fn run(
        &self,
        mut conversation: Vec<Message>,
        step: &str,
        events: &EventSink,
    ) -> Result<String> {
        let specs = self.tools.specs().await;
        let mut answer = String::new();
        let mut rounds = 0usize;

        loop {
            let mut stream = self
                .completion
                .stream(&conversation, &specs)
                .await
                .map_err(EngineError::from)?;

            let mut text = String::new();
            let mut pending: BTreeMap<usize, PendingCall> = BTreeMap::new();

            while let Some(chunk) = stream.next().await {
                match chunk.map_err(EngineError::from)? {
                    CompletionChunk::Text(piece) => {
                        events.response(step, piece.clone()).await?;
                        text.push_str(&piece);
                    }
                    CompletionChunk::ToolCallFragment {
                        index,
                        id,
                        name,
                        arguments,
                    } => {
                        let call = pending.entry(index).or_default();
                        if id.is_some() {
                            call.id = id;
                        }
                        if name.is_some() {
                            call.name = name;
                        }
                        call.arguments.push_str(&arguments);
                    }
                }
            }

            answer.push_str(&text);

            if pending.is_empty() {
                return Ok(answer);
            }

            rounds += 1;
            if rounds > self.max_rounds {
                warn!(step, rounds, "tool round limit reached, answering with accumulated text");
                events
                    .reasoning(step, "Stopping tool use after reaching the round limit")
                    .await?;
                return Ok(answer);
            }

            if !text.is_empty() {
                conversation.push(Message::assistant(text));
            }

            for (index, call) in pending {
                let name = call.name.ok_or_else(|| {
                    EngineError::from(AgentError::streaming(
                        "tool call fragment arrived without a tool name",
                    ))
                })?;
                let call_id = call.id.unwrap_or_else(|| format!("call-{index}"));

                conversation.push(Message::assistant(serde_json::to_string(&json!({
                    "tool_call": { "id": call_id, "name": name, "arguments": call.arguments }
                }))?));
                events
                    .reasoning(step, format!("Using the {name} tool"))
                    .await?;

                let arguments: Value = match serde_json::from_str(&call.arguments) {
                    Ok(value) => value,
                    Err(err) => {
                        conversation.push(Message::tool(
                            call_id,
                            format!("Invalid tool arguments: {err}"),
                        ));
                        continue;
                    }
                };

                match self
                    .tools
                    .execute_with_timeout(&name, &arguments, self.tool_timeout)
                    .await
                {
                    Ok(output) => {
                        debug!(step, tool = %name, bytes = output.content.len(), "tool call finished");
                        conversation.push(Message::tool(call_id, output.content));
                    }
                    Err(ToolError::Timeout(message)) => {
                        return Err(AgentError::timeout(message).into());
                    }
                    Err(err) if err.is_recoverable() => {
                        conversation.push(Message::tool(call_id, err.to_string()));
                    }
                    Err(err) => {
                        return Err(AgentError::tool(&name, err.to_string()).into());
                    }
                }
            }
        }
    }
}
