//! # ragline-core
//!
//! Workflow graph and executor for retrieval-augmented agent pipelines.
//!
//! ## Core Concepts
//!
//! - **Step**: a unit of work that reads the run state and returns a partial update
//! - **RunState**: the record threaded through one run, merged by the executor
//! - **StepId**: a closed enum identifying the steps of one workflow
//! - **Workflow**: the fixed graph of steps, edges and branches, plus the executor
//! - **EventSink / EventStream**: the live reasoning/response channel to the caller
//!
//! ## Quick Start
//!
//! ```rust
//! use ragline_core::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Echo {
//!     Say,
//! }
//!
//! impl StepId for Echo {
//!     fn name(&self) -> &'static str {
//!         "say"
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let workflow = Workflow::builder("echo")
//!     .start(Echo::Say)
//!     .step(
//!         Echo::Say,
//!         ragline_core::step::helpers::fn_step("say", |state: RunState| async move {
//!             Ok(StateUpdate::none().append_response(state.user_input[0].content.clone()))
//!         }),
//!     )
//!     .edge(Echo::Say, Next::End)
//!     .build()?;
//!
//! let outcome = workflow
//!     .execute(RunState::new(vec![Message::user("hi")]), &EventSink::discard())
//!     .await?;
//! assert_eq!(outcome.state.response, "hi");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod flow;
pub mod state;
pub mod step;

/// Convenient re-exports for common use.
pub mod prelude {
    pub use async_trait::async_trait;
    pub use eyre;
    pub use serde::{Deserialize, Serialize};
    pub use tokio;

    pub use crate::{
        error::{EngineError, Result},
        event::{event_channel, AgentEvent, EventKind, EventSink, EventStream},
        flow::{Next, RunOutcome, StepId, StepTrace, Workflow, WorkflowBuilder},
        state::{
            Classification, Complexity, Document, Message, QueryDomain, Reflection, Role,
            RunState, StateUpdate,
        },
        step::{FnStep, Step},
    };
}
