//! Session state: the per-run key-value store shared by every step.
//!
//! Values are an explicit tagged union ([`StateValue`]) rather than loose
//! JSON, so readers use typed accessors instead of probing runtime types.
//! Keys may carry a scope prefix (`app:`, `user:`, `temp:`). The prefix only
//! drives persistence in the session service; lookup always uses the full key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StateError;

pub const APP_PREFIX: &str = "app:";
pub const USER_PREFIX: &str = "user:";
pub const TEMP_PREFIX: &str = "temp:";

/// A single value held in session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Record(Map<String, Value>),
}

impl StateValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value as an integer, if it is an integral number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Map<String, Value>> {
        match self {
            StateValue::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StateValue::Bool(_) => "boolean",
            StateValue::Number(_) => "number",
            StateValue::Text(_) => "string",
            StateValue::Record(_) => "record",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            StateValue::Bool(b) => Value::Bool(*b),
            StateValue::Number(n) => match self.as_i64() {
                Some(i) => Value::from(i),
                None => serde_json::Number::from_f64(*n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            },
            StateValue::Text(s) => Value::String(s.clone()),
            StateValue::Record(r) => Value::Object(r.clone()),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Text(s) => f.write_str(s),
            StateValue::Bool(b) => write!(f, "{b}"),
            StateValue::Number(n) => match self.as_i64() {
                Some(i) => write!(f, "{i}"),
                None => write!(f, "{n}"),
            },
            StateValue::Record(r) => {
                let json = serde_json::to_string(r).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl TryFrom<Value> for StateValue {
    type Error = StateError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(StateValue::Bool(b)),
            Value::Number(n) => n
                .as_f64()
                .map(StateValue::Number)
                .ok_or_else(|| StateError::UnsupportedValue(format!("number {n}"))),
            Value::String(s) => Ok(StateValue::Text(s)),
            Value::Object(o) => Ok(StateValue::Record(o)),
            Value::Null => Err(StateError::UnsupportedValue("null".into())),
            Value::Array(_) => Err(StateError::UnsupportedValue("array".into())),
        }
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Text(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::Text(s)
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<f64> for StateValue {
    fn from(n: f64) -> Self {
        StateValue::Number(n)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        StateValue::Number(n as f64)
    }
}

impl From<i32> for StateValue {
    fn from(n: i32) -> Self {
        StateValue::Number(f64::from(n))
    }
}

impl From<Map<String, Value>> for StateValue {
    fn from(r: Map<String, Value>) -> Self {
        StateValue::Record(r)
    }
}

/// Persistence scope implied by a key's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateScope {
    /// Shared by every user of an app (`app:`)
    App,
    /// Durable for one user across sessions (`user:`)
    User,
    /// Discarded when the current turn is committed (`temp:`)
    Temp,
    /// Lives as long as the session (no prefix)
    Session,
}

impl StateScope {
    pub fn of(key: &str) -> Self {
        if key.starts_with(APP_PREFIX) {
            StateScope::App
        } else if key.starts_with(USER_PREFIX) {
            StateScope::User
        } else if key.starts_with(TEMP_PREFIX) {
            StateScope::Temp
        } else {
            StateScope::Session
        }
    }
}

/// An ordered batch of writes, applied in sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    writes: Vec<(String, StateValue)>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write to the batch.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.writes.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Mapping from key to [`StateValue`] for one session.
///
/// Writes overwrite; nothing is ever removed implicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState {
    values: BTreeMap<String, StateValue>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from a JSON object, rejecting unsupported values.
    pub fn from_json(value: Value) -> Result<Self, StateError> {
        let Value::Object(map) = value else {
            return Err(StateError::UnsupportedValue(
                "session state must be a JSON object".into(),
            ));
        };
        let mut state = Self::new();
        for (key, value) in map {
            state.set(key, StateValue::try_from(value)?);
        }
        Ok(state)
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Store a raw JSON value, converting it at the boundary.
    pub fn set_json(&mut self, key: impl Into<String>, value: Value) -> Result<(), StateError> {
        let value = StateValue::try_from(value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(StateValue::as_text)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(StateValue::as_number)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(StateValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(StateValue::as_bool)
    }

    pub fn get_record(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(StateValue::as_record)
    }

    /// Apply every write in `delta`, in order.
    pub fn apply(&mut self, delta: &StateDelta) {
        for (key, value) in delta.iter() {
            self.values.insert(key.to_string(), value.clone());
        }
    }

    /// Merge another state into this one; `other` wins on conflicts.
    pub fn extend(&mut self, other: SessionState) {
        self.values.extend(other.values);
    }

    /// Owned copy for read-only consumers.
    pub fn snapshot(&self) -> SessionState {
        self.clone()
    }

    /// Copy of the entries whose key falls in `scope`.
    pub fn scoped(&self, scope: StateScope) -> SessionState {
        self.filtered(|key| StateScope::of(key) == scope)
    }

    /// Copy of the entries whose key does not fall in `scope`.
    pub fn without_scope(&self, scope: StateScope) -> SessionState {
        self.filtered(|key| StateScope::of(key) != scope)
    }

    fn filtered(&self, keep: impl Fn(&str) -> bool) -> SessionState {
        self.values
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Dump the whole state as a JSON object for inspection.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, StateValue)> for SessionState {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_writes_overwrite() {
        let mut state = SessionState::new();
        state.set("status", "pending");
        state.set("status", "completed");
        assert_eq!(state.len(), 1);
        assert_eq!(state.get_text("status"), Some("completed"));
    }

    #[test]
    fn typed_accessors_reject_other_kinds() {
        let mut state = SessionState::new();
        state.set("iterative", 3);
        state.set("ready", true);
        assert_eq!(state.get_i64("iterative"), Some(3));
        assert_eq!(state.get_text("iterative"), None);
        assert_eq!(state.get_bool("ready"), Some(true));
        assert_eq!(state.get_record("ready"), None);
    }

    #[test]
    fn from_json_rejects_null_and_arrays() {
        assert!(SessionState::from_json(json!({"a": null})).is_err());
        assert!(SessionState::from_json(json!({"a": [1, 2]})).is_err());
        assert!(SessionState::from_json(json!("not an object")).is_err());

        let state = SessionState::from_json(json!({
            "checking": 1,
            "status_update": {"status": "pending"}
        }))
        .unwrap();
        assert_eq!(state.get_i64("checking"), Some(1));
        assert_eq!(
            state.get_record("status_update").unwrap()["status"],
            json!("pending")
        );
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(StateValue::from(4).to_string(), "4");
        assert_eq!(StateValue::from(0.5).to_string(), "0.5");
        assert_eq!(StateValue::from(4).to_json(), json!(4));
    }

    #[test]
    fn record_displays_as_compact_json() {
        let value = StateValue::try_from(json!({"status": "completed"})).unwrap();
        assert_eq!(value.to_string(), r#"{"status":"completed"}"#);
    }

    #[test]
    fn scope_follows_prefix() {
        assert_eq!(StateScope::of("app:theme"), StateScope::App);
        assert_eq!(StateScope::of("user:login_count"), StateScope::User);
        assert_eq!(StateScope::of("temp:validation_needed"), StateScope::Temp);
        assert_eq!(StateScope::of("task_status"), StateScope::Session);
        // A prefix must lead the key
        assert_eq!(StateScope::of("last_user:x"), StateScope::Session);
    }

    #[test]
    fn scoped_copies_partition_state() {
        let mut state = SessionState::new();
        state.set("user:login_count", 2);
        state.set("temp:validation_needed", true);
        state.set("task_status", "active");

        let durable = state.without_scope(StateScope::Temp);
        assert!(!durable.contains("temp:validation_needed"));
        assert_eq!(durable.len(), 2);
        assert_eq!(state.scoped(StateScope::User).len(), 1);
        // The source is untouched
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn delta_applies_in_order() {
        let delta = StateDelta::new().set("status", "pending").set("status", "completed");
        let mut state = SessionState::new();
        state.apply(&delta);
        assert_eq!(state.get_text("status"), Some("completed"));
        assert_eq!(delta.len(), 2);
    }

    #[test]
    fn state_serializes_transparently() {
        let mut state = SessionState::new();
        state.set("a", "x");
        state.set("b", 2);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({"a": "x", "b": 2.0}));
        let back: SessionState = serde_json::from_value(json).unwrap();
        assert_eq!(back.get_i64("b"), Some(2));
    }
}
