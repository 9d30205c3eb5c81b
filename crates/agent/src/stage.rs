//! Pipeline stages: hooks the loop controller runs around every step.

use crate::step::StepResult;
use agentloop_core::state::SessionState;
use tracing::info;

/// A pre/post hook over session state. Both hooks default to no-ops.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn pre_step(&self, _state: &mut SessionState) {}

    fn post_step(&self, _state: &mut SessionState, _result: &StepResult) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeStep,
    AfterStep,
}

/// Increments a numeric key once per step, starting from any seeded value.
#[derive(Debug, Clone)]
pub struct IterationCounter {
    key: String,
    phase: Phase,
}

impl IterationCounter {
    /// Count before the step runs, so the step's instruction sees the new value.
    pub fn before(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            phase: Phase::BeforeStep,
        }
    }

    /// Count after the step has produced its result.
    pub fn after(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            phase: Phase::AfterStep,
        }
    }

    fn bump(&self, state: &mut SessionState) {
        let next = state.get_number(&self.key).unwrap_or(0.0) + 1.0;
        state.set(self.key.clone(), next);
    }
}

impl Stage for IterationCounter {
    fn name(&self) -> &str {
        &self.key
    }

    fn pre_step(&self, state: &mut SessionState) {
        if self.phase == Phase::BeforeStep {
            self.bump(state);
        }
    }

    fn post_step(&self, state: &mut SessionState, _result: &StepResult) {
        if self.phase == Phase::AfterStep {
            self.bump(state);
        }
    }
}

/// Logs the value under a key before and after each step.
#[derive(Debug, Clone)]
pub struct StepTrace {
    key: String,
}

impl StepTrace {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn current(&self, state: &SessionState) -> String {
        state
            .get(&self.key)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unset>".into())
    }
}

impl Stage for StepTrace {
    fn name(&self) -> &str {
        "trace"
    }

    fn pre_step(&self, state: &mut SessionState) {
        info!(key = %self.key, value = %self.current(state), "Before step");
    }

    fn post_step(&self, state: &mut SessionState, result: &StepResult) {
        info!(key = %self.key, value = %self.current(state), result = %result.preview(120), "After step");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_one() {
        let counter = IterationCounter::before("checking");
        let mut state = SessionState::new();
        counter.pre_step(&mut state);
        counter.pre_step(&mut state);
        assert_eq!(state.get_i64("checking"), Some(2));
    }

    #[test]
    fn counter_respects_seeded_value() {
        let counter = IterationCounter::after("iterative");
        let mut state = SessionState::new();
        state.set("iterative", 5);
        let result = StepResult::Text("ok".into());

        counter.pre_step(&mut state);
        assert_eq!(state.get_i64("iterative"), Some(5));
        counter.post_step(&mut state, &result);
        assert_eq!(state.get_i64("iterative"), Some(6));
    }

    #[test]
    fn trace_leaves_state_alone() {
        let trace = StepTrace::new("status_update");
        let mut state = SessionState::new();
        trace.pre_step(&mut state);
        trace.post_step(&mut state, &StepResult::Text("x".into()));
        assert!(state.is_empty());
    }
}
