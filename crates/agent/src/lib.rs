//! Agentic patterns for agentloop.
//!
//! The central piece is the bounded **iterate-until-status** loop:
//!
//! 1. **Run the step**: render an instruction from session state, call the
//!    provider, validate the answer and write it under the output key
//! 2. **Evaluate the condition** over the updated state
//! 3. **Stop** on a terminal status, otherwise go again until
//!    `max_iterations` is used up
//!
//! The same steps compose into sequential and parallel chains, and the
//! tool agent runs the Plan → Act → Observe cycle with tools that mutate
//! session state.

pub mod chain;
pub mod condition;
pub mod loop_controller;
pub mod stage;
pub mod step;
pub mod template;
pub mod tool_agent;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chain::{ChainRun, ChainStage, ParallelChain, SequentialChain};
pub use condition::{ConditionEvaluator, Decision, Signal, StatusCondition};
pub use loop_controller::{LoopController, LoopOutcome, LoopRun};
pub use stage::{IterationCounter, Stage, StepTrace};
pub use step::{LlmStep, RetryPolicy, StepExecutor, StepResult, execute_with_retry, run_step};
pub use template::PromptTemplate;
pub use tool_agent::ToolAgent;
