use serde_json::Value;
use thiserror::Error;

const MISSING_DOCUMENT: &str = "No document to save";

/// The one error kind surfaced by controllers. Causes are told apart by message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ControllerError {
    message: String,
}

impl ControllerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_document() -> Self {
        Self::new(MISSING_DOCUMENT)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Whatever a collaborator failed with, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Error(ControllerError),
    Message(String),
    Value(Value),
}

impl Failure {
    /// Folds any failure into a [`ControllerError`].
    ///
    /// The order is fixed: error objects pass through, bare strings are wrapped,
    /// then a `code` field wins over a `message` field, and anything else is
    /// serialized whole.
    pub fn normalize(self) -> ControllerError {
        match self {
            Failure::Error(err) => err,
            Failure::Message(message) => ControllerError::new(message),
            Failure::Value(Value::String(message)) => ControllerError::new(message),
            Failure::Value(value) => {
                if let Some(code) = value.get("code") {
                    ControllerError::new(field_text(code))
                } else if let Some(message) = value.get("message") {
                    ControllerError::new(field_text(message))
                } else {
                    ControllerError::new(value.to_string())
                }
            }
        }
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl From<ControllerError> for Failure {
    fn from(value: ControllerError) -> Self {
        Failure::Error(value)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(value: anyhow::Error) -> Self {
        Failure::Error(ControllerError::new(format!("{value:#}")))
    }
}

impl From<String> for Failure {
    fn from(value: String) -> Self {
        Failure::Message(value)
    }
}

impl From<&str> for Failure {
    fn from(value: &str) -> Self {
        Failure::Message(value.to_string())
    }
}

impl From<Value> for Failure {
    fn from(value: Value) -> Self {
        Failure::Value(value)
    }
}

impl From<Failure> for ControllerError {
    fn from(value: Failure) -> Self {
        value.normalize()
    }
}
