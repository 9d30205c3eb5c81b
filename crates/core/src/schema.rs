//! Declared output schemas and the decode step for loose model output.
//!
//! Model answers arrive as text. [`decode_record`] is the single place that
//! turns such text into a JSON record (tolerating code fences), and
//! [`OutputSchema::validate`] checks the record against the declared fields.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DecodeError, OutputError, SchemaError};

/// The declared type of a schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// A string restricted to a fixed set of literal values
    Literal(Vec<String>),
}

impl FieldKind {
    fn expected(&self) -> String {
        match self {
            FieldKind::String => "a string".into(),
            FieldKind::Number => "a number".into(),
            FieldKind::Boolean => "a boolean".into(),
            FieldKind::Literal(values) => format!("one of {values:?}"),
        }
    }

    fn shape(&self) -> String {
        match self {
            FieldKind::String => "string".into(),
            FieldKind::Number => "number".into(),
            FieldKind::Boolean => "boolean".into(),
            FieldKind::Literal(values) => values
                .iter()
                .map(|v| format!("\"{v}\""))
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

/// One named field of an [`OutputSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// A closed record schema: named fields with declared types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field (builder style).
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// The single-field `{"status": ...}` schema used by status polling.
    pub fn status(allowed: &[&str]) -> Self {
        Self::new("StatusResult").field(FieldSpec::required(
            "status",
            FieldKind::Literal(allowed.iter().map(|s| s.to_string()).collect()),
        ))
    }

    /// Compact shape hint for instructions, e.g. `{"status": "completed" | "pending"}`.
    pub fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                let marker = if f.required { "" } else { "?" };
                format!("\"{}\"{marker}: {}", f.name, f.kind.shape())
            })
            .collect();
        format!("{{{}}}", fields.join(", "))
    }

    /// Validate a decoded value and return it as a record.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>, SchemaError> {
        let Value::Object(record) = value else {
            return Err(SchemaError::NotAnObject(self.name.clone()));
        };

        for key in record.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                return Err(SchemaError::UnknownField(key.clone()));
            }
        }

        for field in &self.fields {
            match record.get(&field.name) {
                None if field.required => {
                    return Err(SchemaError::MissingField(field.name.clone()));
                }
                None => {}
                Some(found) => check_kind(field, found)?,
            }
        }

        Ok(record.clone())
    }

    /// Decode loose model text and validate it in one go.
    pub fn parse(&self, raw: &str) -> Result<Map<String, Value>, OutputError> {
        let record = decode_record(raw)?;
        Ok(self.validate(&Value::Object(record))?)
    }
}

fn check_kind(field: &FieldSpec, found: &Value) -> Result<(), SchemaError> {
    let ok = match (&field.kind, found) {
        (FieldKind::String, Value::String(_)) => true,
        (FieldKind::Number, Value::Number(_)) => true,
        (FieldKind::Boolean, Value::Bool(_)) => true,
        (FieldKind::Literal(allowed), Value::String(s)) => {
            if allowed.iter().any(|a| a == s) {
                true
            } else {
                return Err(SchemaError::InvalidLiteral {
                    field: field.name.clone(),
                    value: s.clone(),
                    allowed: allowed.clone(),
                });
            }
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(SchemaError::WrongType {
            field: field.name.clone(),
            expected: field.kind.expected(),
            found: json_kind(found).into(),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Decode model text that should contain a JSON object.
///
/// Accepts bare JSON or JSON wrapped in a Markdown code fence. Bare JSON
/// wins, so fences quoted inside string values are left alone.
pub fn decode_record(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(bare_err) => {
            let body = fence_pattern()
                .captures(trimmed)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .ok_or_else(|| DecodeError::NotJson(bare_err.to_string()))?;
            serde_json::from_str(body).map_err(|e| DecodeError::NotJson(e.to_string()))?
        }
    };

    match value {
        Value::Object(record) => Ok(record),
        other => Err(DecodeError::NotAnObject(json_kind(&other).into())),
    }
}
