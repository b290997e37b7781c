//! Step abstraction for ragline workflows.

use async_trait::async_trait;

use crate::{
    error::Result,
    event::EventSink,
    state::{RunState, StateUpdate},
};

/// A single named unit of work within a workflow.
///
/// A step reads the shared run state, optionally calls out to external
/// capabilities, publishes events, and returns a partial state update. The
/// executor performs the merge.
#[async_trait]
pub trait Step: Send + Sync {
    /// Execute the step's logic.
    async fn run(&self, state: &RunState, events: &EventSink) -> Result<StateUpdate>;

    /// Name of this step for routing errors, events and logs.
    fn name(&self) -> String;
}

/// A functional step that wraps an async closure. Used mostly in tests and
/// for small pure steps.
pub struct FnStep<F>
where
    F: Fn(
            RunState,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<StateUpdate>> + Send>,
        > + Send
        + Sync,
{
    func: F,
    name: String,
}

impl<F> std::fmt::Debug for FnStep<F>
where
    F: Fn(
            RunState,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<StateUpdate>> + Send>,
        > + Send
        + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

impl<F> FnStep<F>
where
    F: Fn(
            RunState,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<StateUpdate>> + Send>,
        > + Send
        + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            func,
            name: name.into(),
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(
            RunState,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<StateUpdate>> + Send>,
        > + Send
        + Sync,
{
    async fn run(&self, state: &RunState, _events: &EventSink) -> Result<StateUpdate> {
        (self.func)(state.clone()).await
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Helper functions for creating common step types.
pub mod helpers {
    use super::*;

    /// Create a functional step from an async closure over a state snapshot.
    #[allow(clippy::type_complexity)]
    pub fn fn_step<F, Fut>(
        name: impl Into<String>,
        f: F,
    ) -> FnStep<
        impl Fn(
            RunState,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<StateUpdate>> + Send>,
        > + Send
        + Sync,
    >
    where
        F: Fn(RunState) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        FnStep::new(name, move |state| Box::pin(f(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Message;

    #[tokio::test]
    async fn fn_step_runs_closure_on_snapshot() {
        let step = helpers::fn_step("echo", |state: RunState| async move {
            Ok(StateUpdate::none().append_response(state.user_input[0].content.clone()))
        });

        let state = RunState::new(vec![Message::user("ping")]);
        let update = step.run(&state, &EventSink::discard()).await.unwrap();

        assert_eq!(update.response_append.as_deref(), Some("ping"));
        assert_eq!(step.name(), "echo");
    }
}
