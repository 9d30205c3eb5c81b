//! Loop Controller: the bounded iterate-until-status driver.
//!
//! Each iteration runs the pre-step stages, the step (under its retry
//! policy), the post-step stages and then the condition evaluator, whose
//! delta is applied before the next iteration. The run ends when the
//! condition terminates it, when `max_iterations` is used up, or on the
//! first fatal step error.

use crate::condition::{ConditionEvaluator, Signal};
use crate::stage::Stage;
use crate::step::{RetryPolicy, StepExecutor, run_step};
use agentloop_core::error::LoopError;
use agentloop_core::event::{EventBus, LoopEvent};
use agentloop_core::state::SessionState;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How a loop run ended. Produced exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The condition evaluator signalled termination
    Completed { reason: String, iterations: u32 },
    /// The iteration bound was reached without a terminal status
    Exhausted { iterations: u32 },
}

impl LoopOutcome {
    pub fn iterations(&self) -> u32 {
        match self {
            LoopOutcome::Completed { iterations, .. } | LoopOutcome::Exhausted { iterations } => {
                *iterations
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, LoopOutcome::Completed { .. })
    }
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopOutcome::Completed { reason, iterations } => {
                write!(f, "completed ({reason}) after {iterations} iteration(s)")
            }
            LoopOutcome::Exhausted { iterations } => {
                write!(f, "exhausted after {iterations} iteration(s)")
            }
        }
    }
}

/// Everything a finished run hands back.
#[derive(Debug, Clone)]
pub struct LoopRun {
    pub outcome: LoopOutcome,
    pub state: SessionState,
    /// Number of iterations whose step produced a result
    pub steps_invoked: u32,
}

pub struct LoopController {
    name: String,
    step: Arc<dyn StepExecutor>,
    condition: Arc<dyn ConditionEvaluator>,
    max_iterations: u32,
    retry: RetryPolicy,
    stages: Vec<Box<dyn Stage>>,
    time_budget: Option<Duration>,
    event_bus: Option<Arc<EventBus>>,
}

impl LoopController {
    pub fn new(step: Arc<dyn StepExecutor>, condition: Arc<dyn ConditionEvaluator>) -> Self {
        Self {
            name: "StatusPoller".into(),
            step,
            condition,
            max_iterations: 10,
            retry: RetryPolicy::default(),
            stages: Vec::new(),
            time_budget: None,
            event_bus: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Upper bound on iterations. Zero is rejected when the loop runs.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Append a stage; stages run in the order they were added.
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the loop to its outcome, starting from `initial` state.
    pub async fn run(&self, initial: SessionState) -> Result<LoopRun, LoopError> {
        if self.max_iterations == 0 {
            return Err(LoopError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }

        info!(
            loop_name = %self.name,
            step = %self.step.name(),
            max_iterations = self.max_iterations,
            "Starting loop"
        );

        let run = match self.time_budget {
            Some(budget) => tokio::time::timeout(budget, self.drive(initial))
                .await
                .map_err(|_| LoopError::DeadlineExceeded {
                    budget_ms: budget.as_millis() as u64,
                })??,
            None => self.drive(initial).await?,
        };

        info!(loop_name = %self.name, outcome = %run.outcome, "Loop finished");
        self.publish(LoopEvent::LoopFinished {
            loop_name: self.name.clone(),
            outcome: run.outcome.to_string(),
            iterations: run.outcome.iterations(),
            timestamp: Utc::now(),
        });
        Ok(run)
    }

    async fn drive(&self, mut state: SessionState) -> Result<LoopRun, LoopError> {
        let mut steps_invoked = 0;

        for iteration in 1..=self.max_iterations {
            debug!(loop_name = %self.name, iteration, "Loop iteration");
            self.publish(LoopEvent::IterationStarted {
                loop_name: self.name.clone(),
                iteration,
                timestamp: Utc::now(),
            });

            for stage in &self.stages {
                stage.pre_step(&mut state);
            }

            let result = run_step(
                self.step.as_ref(),
                &mut state,
                &self.retry,
                self.event_bus.as_deref(),
            )
            .await
            .map_err(|source| LoopError::Step { iteration, source })?;
            steps_invoked += 1;

            for stage in &self.stages {
                stage.post_step(&mut state, &result);
            }

            let decision = self.condition.evaluate(&state);
            state.apply(&decision.delta);

            debug!(
                iteration,
                status = %decision.status,
                terminate = decision.is_terminal(),
                "Condition evaluated"
            );
            self.publish(LoopEvent::ConditionEvaluated {
                iteration,
                status: decision.status.clone(),
                terminate: decision.is_terminal(),
                timestamp: Utc::now(),
            });

            if let Signal::Terminate { reason } = decision.signal {
                return Ok(LoopRun {
                    outcome: LoopOutcome::Completed {
                        reason,
                        iterations: iteration,
                    },
                    state,
                    steps_invoked,
                });
            }
        }

        Ok(LoopRun {
            outcome: LoopOutcome::Exhausted {
                iterations: self.max_iterations,
            },
            state,
            steps_invoked,
        })
    }

    fn publish(&self, event: LoopEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}
