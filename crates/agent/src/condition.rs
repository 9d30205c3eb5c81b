//! Condition Evaluator: decides after each iteration whether to stop.
//!
//! Evaluation is a pure function of the state snapshot. It never fails:
//! anything it cannot interpret counts as the pending status.

use agentloop_core::schema::decode_record;
use agentloop_core::state::{SessionState, StateDelta, StateValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Whether the loop keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Terminate { reason: String },
}

/// The evaluator's verdict for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub signal: Signal,
    /// The status the evaluator derived, `pending` when nothing usable was found
    pub status: String,
    /// Writes the controller applies before the next iteration
    pub delta: StateDelta,
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        matches!(self.signal, Signal::Terminate { .. })
    }
}

pub trait ConditionEvaluator: Send + Sync {
    fn name(&self) -> &str {
        "condition"
    }

    fn evaluate(&self, state: &SessionState) -> Decision;
}

/// Terminates once a status field reaches its terminal literal.
///
/// By default the status is read from the `status` field of the record stored
/// under `status_update`. Text values are decoded first, so a record and its
/// serialized form are treated the same.
#[derive(Debug, Clone)]
pub struct StatusCondition {
    key: String,
    /// `None` reads the key itself as a flat status string
    field: Option<String>,
    terminal: String,
    pending: String,
    mirror_key: Option<String>,
}

impl StatusCondition {
    pub fn new() -> Self {
        Self {
            key: "status_update".into(),
            field: Some("status".into()),
            terminal: "completed".into(),
            pending: "pending".into(),
            mirror_key: Some("status".into()),
        }
    }

    /// Read `key` as a plain status string (`status = "completed"`).
    pub fn flat(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: None,
            mirror_key: None,
            ..Self::new()
        }
    }

    /// Build from the `[loop]` section of the config file.
    pub fn from_config(config: &agentloop_config::LoopConfig) -> Self {
        Self {
            key: config.output_key.clone(),
            field: Some(config.status_field.clone()),
            terminal: config.terminal_status.clone(),
            pending: config.pending_status.clone(),
            mirror_key: config.mirror_key().map(str::to_string),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_terminal(mut self, terminal: impl Into<String>) -> Self {
        self.terminal = terminal.into();
        self
    }

    pub fn with_pending(mut self, pending: impl Into<String>) -> Self {
        self.pending = pending.into();
        self
    }

    /// Where the derived status is copied after every evaluation. `None` disables.
    pub fn with_mirror_key(mut self, key: Option<String>) -> Self {
        self.mirror_key = key;
        self
    }

    fn field_of(&self, record: &Map<String, Value>, field: &str) -> Option<String> {
        record.get(field).and_then(Value::as_str).map(str::to_string)
    }

    fn observed_status(&self, state: &SessionState) -> Option<String> {
        let value = state.get(&self.key)?;
        let Some(field) = &self.field else {
            return value.as_text().map(|s| s.trim().to_string());
        };

        match value {
            StateValue::Record(record) => self.field_of(record, field),
            StateValue::Text(raw) => match decode_record(raw) {
                Ok(record) => self.field_of(&record, field),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Could not decode status text, treating as pending");
                    None
                }
            },
            other => {
                debug!(key = %self.key, kind = other.kind(), "Status value has no status field");
                None
            }
        }
    }
}

impl Default for StatusCondition {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator for StatusCondition {
    fn name(&self) -> &str {
        "ConditionChecker"
    }

    fn evaluate(&self, state: &SessionState) -> Decision {
        let status = self
            .observed_status(state)
            .unwrap_or_else(|| self.pending.clone());

        let signal = if status == self.terminal {
            Signal::Terminate {
                reason: status.clone(),
            }
        } else {
            Signal::Continue
        };

        let delta = match &self.mirror_key {
            Some(key) => StateDelta::new().set(key.clone(), status.clone()),
            None => StateDelta::new(),
        };

        Decision {
            signal,
            status,
            delta,
        }
    }
}
