//! Prompt templates rendered against session state.
//!
//! `{name}` and `{scope:name}` are substituted with the state value's
//! display form. `{name?}` renders empty when the key is absent. Braces that
//! do not hold an identifier (literal JSON in an instruction, say) are left
//! as written.

use agentloop_core::error::TemplateError;
use agentloop_core::state::SessionState;
use regex_lite::Regex;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?::[A-Za-z_][A-Za-z0-9_]*)?)(\?)?\}")
            .expect("placeholder pattern is valid")
    })
}

/// An instruction or message with `{placeholders}` filled from state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of every placeholder, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        placeholder()
            .captures_iter(&self.source)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Substitute every placeholder from `state`.
    pub fn render(&self, state: &SessionState) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        let mut last = 0;

        for caps in placeholder().captures_iter(&self.source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let optional = caps.get(2).is_some();

            out.push_str(&self.source[last..whole.start()]);
            match state.get(name.as_str()) {
                Some(value) => out.push_str(&value.to_string()),
                None if optional => {}
                None => return Err(TemplateError::MissingVariable(name.as_str().to_string())),
            }
            last = whole.end();
        }

        out.push_str(&self.source[last..]);
        Ok(out)
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for PromptTemplate {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        let mut state = SessionState::new();
        state.set("topic", "Rust ownership");
        state.set("user:login_count", 3);
        state
    }

    #[test]
    fn substitutes_plain_and_scoped_keys() {
        let t = PromptTemplate::new("Topic: {topic}, logins: {user:login_count}");
        assert_eq!(t.render(&state()).unwrap(), "Topic: Rust ownership, logins: 3");
    }

    #[test]
    fn leaves_literal_json_alone() {
        let t = PromptTemplate::new(r#"Reply {"status": "completed"} about {topic}"#);
        assert_eq!(
            t.render(&state()).unwrap(),
            r#"Reply {"status": "completed"} about Rust ownership"#
        );
    }

    #[test]
    fn missing_variable_is_an_error() {
        let t = PromptTemplate::new("Summarize {text}");
        assert_eq!(
            t.render(&state()).unwrap_err(),
            TemplateError::MissingVariable("text".into())
        );
    }

    #[test]
    fn optional_variable_renders_empty() {
        let t = PromptTemplate::new("Previous: [{last_greeting?}]");
        assert_eq!(t.render(&state()).unwrap(), "Previous: []");
    }

    #[test]
    fn records_render_as_json() {
        let mut s = SessionState::new();
        s.set_json("status_update", serde_json::json!({"status": "pending"})).unwrap();
        let t = PromptTemplate::new("Last: {status_update}");
        assert_eq!(t.render(&s).unwrap(), r#"Last: {"status":"pending"}"#);
    }

    #[test]
    fn lists_variables() {
        let t = PromptTemplate::new("{a} {user:b} {c?} {\"d\": 1}");
        assert_eq!(t.variables(), vec!["a", "user:b", "c"]);
    }
}
