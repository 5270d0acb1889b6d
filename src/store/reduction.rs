use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An instruction telling a store how to compute its next value.
///
/// Serialized externally tagged, as `{"replace": value}` or
/// `{"merge": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// The next value is exactly this one.
    Replace(Value),
    /// The next value is the current one with these keys overwritten.
    Merge(Map<String, Value>),
}

impl Reduction {
    /// Replace the store value with `value`.
    pub fn replace(value: impl Into<Value>) -> Self {
        Reduction::Replace(value.into())
    }

    /// Shallow-merge `partial` into the store value.
    pub fn merge(partial: Map<String, Value>) -> Self {
        Reduction::Merge(partial)
    }

    /// Compute the value that follows `current`.
    ///
    /// A merge over a non-object value starts from an empty object.
    pub fn reduce(self, current: Value) -> Value {
        match self {
            Reduction::Replace(value) => value,
            Reduction::Merge(partial) => {
                let mut base = match current {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                base.extend(partial);
                Value::Object(base)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn replace_ignores_current() {
        let next = Reduction::replace(json!({"a": 1})).reduce(json!({"b": 2}));
        assert_eq!(next, json!({"a": 1}));
    }

    #[test]
    fn merge_is_shallow() {
        let current = json!({"keep": true, "nested": {"x": 1, "y": 2}});
        let next = Reduction::merge(object(json!({"nested": {"x": 3}}))).reduce(current);
        assert_eq!(next, json!({"keep": true, "nested": {"x": 3}}));
    }

    #[test]
    fn merge_over_non_object_starts_empty() {
        let next = Reduction::merge(object(json!({"a": 1}))).reduce(json!("text"));
        assert_eq!(next, json!({"a": 1}));
    }

    #[test]
    fn wire_format_is_tagged() {
        assert_eq!(
            serde_json::to_value(Reduction::replace(json!([1]))).unwrap(),
            json!({"replace": [1]})
        );
        let parsed: Reduction = serde_json::from_value(json!({"merge": {"k": "v"}})).unwrap();
        assert_eq!(parsed, Reduction::merge(object(json!({"k": "v"}))));
    }
}
