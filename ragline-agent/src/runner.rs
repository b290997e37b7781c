//! Run boundary: spawn a workflow and hand back its live event stream.

use std::sync::Arc;

use ragline_core::{
    error::Result,
    event::{event_channel, EventStream},
    flow::{RunOutcome, StepId, Workflow},
    state::{Message, RunState},
};
use tokio::task::JoinHandle;
use tracing::info;

/// Default event channel capacity per run.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Owns a built workflow and starts runs on it.
///
/// Each run executes on its own tokio task, so concurrent runs never block
/// one another. Dropping the returned stream cancels the run at its next
/// event emission.
pub struct AgentRunner<S: StepId> {
    workflow: Arc<Workflow<S>>,
    buffer: usize,
}

impl<S: StepId> AgentRunner<S> {
    pub fn new(workflow: Workflow<S>) -> Self {
        Self {
            workflow: Arc::new(workflow),
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_event_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Start one run over the given conversation.
    ///
    /// Returns the live event stream and a handle resolving to the final
    /// outcome once the run ends.
    pub fn run(&self, user_input: Vec<Message>) -> (EventStream, JoinHandle<Result<RunOutcome>>) {
        let (sink, stream) = event_channel(self.buffer);
        let workflow = self.workflow.clone();
        let state = RunState::new(user_input);

        info!(workflow = workflow.name(), run_id = %state.run_id, "spawning run");
        let handle = tokio::spawn(async move { workflow.execute(state, &sink).await });

        (stream, handle)
    }
}
