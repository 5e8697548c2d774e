use crate::core::class::Visibility;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors raised while generating proxy definitions or dispatching accesses on them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// The original type cannot be proxied by the requested proxy kind
    #[error("class {class} cannot be proxied: {reason}")]
    Shape { class: String, reason: String },

    /// Raised by a user-supplied initializer, propagated unchanged
    #[error("initializer failed: {message}")]
    Initializer { message: String },

    #[error("cannot access {visibility} property {class}::${member} from {scope}")]
    AccessViolation {
        class: String,
        member: String,
        visibility: Visibility,
        scope: String,
    },

    #[error("cannot call {visibility} method {class}::{method}() from {scope}")]
    MethodAccessViolation {
        class: String,
        method: String,
        visibility: Visibility,
        scope: String,
    },

    #[error("unknown class {name}")]
    UnknownClass { name: String },

    #[error("call to undefined method {class}::{method}()")]
    UnknownMethod { class: String, method: String },

    #[error("cannot call abstract method {class}::{method}()")]
    AbstractMethod { class: String, method: String },

    #[error("too few arguments to {class}::{method}(): expected {expected}, found {found}")]
    ArgumentCount {
        class: String,
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("value holder for {class} was initialized without a wrapped instance")]
    MissingWrappedValue { class: String },

    #[error("indirect modification of overloaded property {class}::${member}")]
    IndirectModification { class: String, member: String },

    #[error("cannot create dynamic property {class}::${member}")]
    DynamicProperty { class: String, member: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProxyError {
    pub fn initializer(message: impl Into<String>) -> Self {
        Self::Initializer {
            message: message.into(),
        }
    }

    pub fn shape(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Shape {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was signaled by a visibility rule rather than a missing member
    pub fn is_access_violation(&self) -> bool {
        matches!(
            self,
            Self::AccessViolation { .. } | Self::MethodAccessViolation { .. }
        )
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for ProxyError {
    fn from(error: bincode::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
