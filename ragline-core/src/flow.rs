//! Workflow graph definition and execution.
//!
//! A workflow is a fixed directed graph of named steps with one entry step,
//! unconditional and branch transitions, and `End` exits. Step identifiers
//! are a closed enum per workflow, so a typo in a routing target is a
//! compile-time error instead of a runtime key lookup failure.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    error::{EngineError, Result},
    event::EventSink,
    state::RunState,
    step::Step,
};

/// Identifier of a step within one workflow's closed step enumeration.
pub trait StepId:
    Clone + Copy + PartialEq + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static
{
    /// Stable name used in errors, events and logs.
    fn name(&self) -> &'static str;
}

/// Routing target: another step or a terminal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Next<S: StepId> {
    Step(S),
    End,
}

type BranchFn<S> = Arc<dyn Fn(&RunState) -> Next<S> + Send + Sync>;

enum Transition<S: StepId> {
    Direct(Next<S>),
    Branch {
        targets: Vec<Next<S>>,
        choose: BranchFn<S>,
    },
}

/// Default ceiling on executed steps per run. Generous for the shipped
/// pipelines (a full two-cycle policy run is under 16 steps); hitting it
/// means a branch function stopped honoring its cycle bound.
pub const DEFAULT_MAX_STEPS: usize = 64;

/// Per-step execution record.
#[derive(Debug, Clone)]
pub struct StepTrace {
    pub step: &'static str,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final state; `response` is the accumulated answer.
    pub state: RunState,
    /// Number of steps executed.
    pub steps: usize,
    /// Total execution time.
    pub duration: Duration,
    /// Execution order with timings.
    pub trace: Vec<StepTrace>,
}

/// A validated, immutable workflow graph.
pub struct Workflow<S: StepId> {
    name: String,
    start: S,
    steps: HashMap<S, Arc<dyn Step>>,
    transitions: HashMap<S, Transition<S>>,
    max_steps: usize,
}

impl<S: StepId> Workflow<S> {
    /// Create a new workflow builder.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder<S> {
        WorkflowBuilder::new(name)
    }

    /// Workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the workflow over an initial state, publishing events to the
    /// given sink.
    ///
    /// Steps run strictly sequentially in graph traversal order. A failing
    /// step aborts the run; whatever events were emitted before the failure
    /// stay with the subscriber, followed by one terminal failure event.
    pub async fn execute(&self, mut state: RunState, events: &EventSink) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut current = self.start;
        let mut steps_run = 0usize;
        let mut trace = Vec::new();

        info!(workflow = %self.name, run_id = %state.run_id, "starting run");

        loop {
            if steps_run >= self.max_steps {
                warn!(workflow = %self.name, steps = steps_run, "step ceiling hit");
                let _ = events
                    .failure(
                        current.name(),
                        format!("cycle bound exceeded after {steps_run} steps"),
                    )
                    .await;
                return Err(EngineError::CycleBoundExceeded { steps: steps_run });
            }

            let step = self.steps.get(&current).ok_or_else(|| {
                EngineError::configuration(format!(
                    "no step registered for id '{}'",
                    current.name()
                ))
            })?;

            debug!(workflow = %self.name, step = current.name(), "executing step");
            let stamp = chrono::Utc::now();
            let step_started = Instant::now();

            let update = match step.run(&state, events).await {
                Ok(update) => update,
                // Subscriber is gone; nothing left to notify.
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => {
                    let _ = events.failure(current.name(), err.to_string()).await;
                    return Err(EngineError::step(current.name(), Box::new(err)));
                }
            };

            state.apply(update);
            steps_run += 1;
            trace.push(StepTrace {
                step: current.name(),
                started_at: stamp,
                duration: step_started.elapsed(),
            });

            let next = match self.transitions.get(&current) {
                Some(Transition::Direct(next)) => *next,
                Some(Transition::Branch { targets, choose }) => {
                    let chosen = choose(&state);
                    if !targets.contains(&chosen) {
                        let message = format!(
                            "branch from '{}' chose undeclared target {chosen:?}",
                            current.name()
                        );
                        let _ = events.failure(current.name(), message.clone()).await;
                        return Err(EngineError::configuration(message));
                    }
                    chosen
                }
                // Unreachable after build() validation.
                None => {
                    return Err(EngineError::configuration(format!(
                        "step '{}' has no outgoing transition",
                        current.name()
                    )));
                }
            };

            match next {
                Next::End => {
                    info!(
                        workflow = %self.name,
                        run_id = %state.run_id,
                        steps = steps_run,
                        "run finished"
                    );
                    return Ok(RunOutcome {
                        state,
                        steps: steps_run,
                        duration: started.elapsed(),
                        trace,
                    });
                }
                Next::Step(id) => current = id,
            }
        }
    }
}

impl<S: StepId> std::fmt::Debug for Workflow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("start", &self.start)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Workflow`]. All definition mistakes are collected and
/// reported together by [`WorkflowBuilder::build`].
pub struct WorkflowBuilder<S: StepId> {
    name: String,
    start: Option<S>,
    steps: HashMap<S, Arc<dyn Step>>,
    transitions: HashMap<S, Transition<S>>,
    max_steps: usize,
    problems: Vec<String>,
}

impl<S: StepId> WorkflowBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            steps: HashMap::new(),
            transitions: HashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
            problems: Vec::new(),
        }
    }

    /// Set the entry step.
    pub fn start(mut self, id: S) -> Self {
        self.start = Some(id);
        self
    }

    /// Register a step under its identifier. Duplicate registration is a
    /// configuration error.
    pub fn step(mut self, id: S, step: impl Step + 'static) -> Self {
        if self.steps.insert(id, Arc::new(step)).is_some() {
            self.problems
                .push(format!("duplicate step registration for '{}'", id.name()));
        }
        self
    }

    /// Add an unconditional transition.
    pub fn edge(mut self, from: S, to: Next<S>) -> Self {
        if self
            .transitions
            .insert(from, Transition::Direct(to))
            .is_some()
        {
            self.problems
                .push(format!("duplicate transition from '{}'", from.name()));
        }
        self
    }

    /// Add a conditional transition. `targets` declares every value the
    /// chooser may return; they are validated at build time, and a chooser
    /// escaping the declared set is rejected at run time.
    pub fn branch(
        mut self,
        from: S,
        targets: Vec<Next<S>>,
        choose: impl Fn(&RunState) -> Next<S> + Send + Sync + 'static,
    ) -> Self {
        if targets.is_empty() {
            self.problems
                .push(format!("branch from '{}' declares no targets", from.name()));
        }
        if self
            .transitions
            .insert(
                from,
                Transition::Branch {
                    targets,
                    choose: Arc::new(choose),
                },
            )
            .is_some()
        {
            self.problems
                .push(format!("duplicate transition from '{}'", from.name()));
        }
        self
    }

    /// Override the defensive step ceiling.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate and build the workflow.
    pub fn build(self) -> Result<Workflow<S>> {
        let mut problems = self.problems;

        let start = match self.start {
            Some(start) => {
                if !self.steps.contains_key(&start) {
                    problems.push(format!("start step '{}' is not registered", start.name()));
                }
                Some(start)
            }
            None => {
                problems.push("start step not set".to_string());
                None
            }
        };

        for (from, transition) in &self.transitions {
            if !self.steps.contains_key(from) {
                problems.push(format!("transition from unregistered step '{}'", from.name()));
            }
            let targets: Vec<Next<S>> = match transition {
                Transition::Direct(next) => vec![*next],
                Transition::Branch { targets, .. } => targets.clone(),
            };
            for target in targets {
                if let Next::Step(id) = target
                    && !self.steps.contains_key(&id)
                {
                    problems.push(format!(
                        "transition from '{}' references unregistered step '{}'",
                        from.name(),
                        id.name()
                    ));
                }
            }
        }

        for id in self.steps.keys() {
            if !self.transitions.contains_key(id) {
                problems.push(format!("step '{}' has no outgoing transition", id.name()));
            }
        }

        if !problems.is_empty() {
            return Err(EngineError::configuration(problems.join("; ")));
        }

        Ok(Workflow {
            name: self.name,
            // Validated above.
            start: start.ok_or_else(|| EngineError::configuration("start step not set"))?,
            steps: self.steps,
            transitions: self.transitions,
            max_steps: self.max_steps,
        })
    }
}
