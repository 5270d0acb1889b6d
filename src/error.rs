//! Error type shared by actions, stores and the container.
//!
//! Errors travel two ways:
//! - configuration errors are returned from `Cat::register_*`
//! - data errors are delivered on the error channel of the returned
//!   [`Observable`](crate::Observable)
//!
//! `CatError` is `Clone` because one error may be fanned out to many
//! subscribers.

use thiserror::Error;

/// Errors produced by fluxcat.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatError {
    /// An action, actions collection or store was built without a name.
    #[error("{kind} does not have a displayName")]
    MissingDisplayName {
        /// `"action"`, `"actions"` or `"store"`.
        kind: &'static str,
    },

    /// An action's mapping function failed.
    #[error("action {action} failed to map its payload: {message}")]
    ActionMapping {
        /// Display name of the action.
        action: String,
        /// Rendered error chain of the mapping failure.
        message: String,
    },

    /// An init hook of an actions collection or store failed.
    #[error("init of {name} failed: {message}")]
    Init {
        /// Display name of the instance being built.
        name: String,
        /// Rendered error chain of the hook failure.
        message: String,
    },

    /// `hydrate` received something other than a JSON object.
    #[error("hydrate should get objects but got {found}")]
    HydrateInput {
        /// JSON type of the rejected input.
        found: &'static str,
    },

    /// `deserialize` received something other than a string.
    #[error("deserialize expects a string but got {found}")]
    DeserializeInput {
        /// JSON type of the rejected input.
        found: &'static str,
    },

    /// The serialized state parsed into something other than an object.
    #[error("deserialized state should be an object or null but got {found}")]
    NotObjectOrNull {
        /// JSON type of the parse result.
        found: &'static str,
    },

    /// The serialized state could not be encoded or parsed.
    #[error("invalid serialized state: {message}")]
    Json {
        /// Message from `serde_json`.
        message: String,
    },

    /// A time-based operator was subscribed outside a tokio runtime.
    #[error("delay requires a running tokio runtime")]
    NoRuntime,
}

impl CatError {
    pub(crate) fn action_mapping(action: &str, err: &anyhow::Error) -> Self {
        CatError::ActionMapping {
            action: action.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn init(name: &str, err: &anyhow::Error) -> Self {
        CatError::Init {
            name: name.to_string(),
            message: format!("{err:#}"),
        }
    }
}

impl From<serde_json::Error> for CatError {
    fn from(err: serde_json::Error) -> Self {
        CatError::Json {
            message: err.to_string(),
        }
    }
}

/// Name of the JSON type of `value`, used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_name_the_problem() {
        let err = CatError::MissingDisplayName { kind: "store" };
        assert_eq!(err.to_string(), "store does not have a displayName");

        let err = CatError::HydrateInput { found: "string" };
        assert!(err.to_string().contains("hydrate should get objects"));

        let err = CatError::NotObjectOrNull { found: "number" };
        assert!(err.to_string().contains("should be an object or null"));
    }

    #[test]
    fn mapping_error_keeps_the_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let err = CatError::action_mapping("doAction", &err);
        assert_eq!(
            err.to_string(),
            "action doAction failed to map its payload: outer: inner"
        );
    }

    #[test]
    fn json_kinds() {
        assert_eq!(json_kind(&json!(null)), "null");
        assert_eq!(json_kind(&json!(1)), "number");
        assert_eq!(json_kind(&json!("x")), "string");
        assert_eq!(json_kind(&json!({})), "object");
    }
}
