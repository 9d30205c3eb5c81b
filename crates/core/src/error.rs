//! Error types for the agentloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agentloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Step / loop errors ---
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Loop error: {0}")]
    Loop(#[from] LoopError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session / state errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the external completion service. Always fatal for a loop.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of a single step execution.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("step '{step}' failed calling the completion service: {source}")]
    Service {
        step: String,
        #[source]
        source: ProviderError,
    },

    #[error("malformed structured output from step '{step}' after {attempts} attempt(s): {source}")]
    Validation {
        step: String,
        attempts: u32,
        #[source]
        source: OutputError,
    },

    #[error("step '{step}' could not render its instruction: {source}")]
    Template {
        step: String,
        #[source]
        source: TemplateError,
    },
}

impl StepError {
    /// Whether a retry with a stricter instruction may fix this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Validation { .. })
    }
}

/// Fatal loop failures. Running out of iterations is not one of them.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    #[error("iteration {iteration} failed: {source}")]
    Step {
        iteration: u32,
        #[source]
        source: StepError,
    },

    #[error("invalid loop configuration: {0}")]
    InvalidConfig(String),

    #[error("loop exceeded its time budget of {budget_ms}ms")]
    DeadlineExceeded { budget_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session not found: {app}/{user}/{session_id}")]
    NotFound {
        app: String,
        user: String,
        session_id: String,
    },

    #[error("Session already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("unsupported state value: {0}")]
    UnsupportedValue(String),
}

/// Raised by the decode step that turns loose model text into a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("output is empty")]
    Empty,

    #[error("output is not valid JSON: {0}")]
    NotJson(String),

    #[error("output is JSON but not an object (found {0})")]
    NotAnObject(String),
}

/// Raised when a decoded record does not conform to a declared schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("schema '{0}' expects a JSON object")]
    NotAnObject(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be {expected}, found {found}")]
    WrongType {
        field: String,
        expected: String,
        found: String,
    },

    #[error("field '{field}' has value '{value}', expected one of {allowed:?}")]
    InvalidLiteral {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("unexpected field '{0}'")]
    UnknownField(String),
}

/// Why a model answer could not be used as a structured record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("missing template variable '{0}'")]
    MissingVariable(String),
}
