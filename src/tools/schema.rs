//! Declared tool signatures and argument validation.

use serde_json::{Map, Value, json};

use crate::tools::error::ToolError;

/// Type and bounds of one argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    /// Non-empty string of at most `max_len` characters.
    String {
        /// Maximum length in characters.
        max_len: usize,
    },
    /// Integer in `min..=max`.
    Integer {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// One of a fixed set of lowercase strings.
    Enum(&'static [&'static str]),
    /// Boolean flag.
    Boolean,
}

/// One declared argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgSpec {
    /// Argument name.
    pub name: &'static str,
    /// Description shown to the reasoning model.
    pub description: &'static str,
    /// Type and bounds.
    pub kind: ArgKind,
    /// Whether the argument must be present.
    pub required: bool,
}

impl ArgSpec {
    /// A required argument.
    #[must_use]
    pub const fn required(name: &'static str, description: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    /// An optional argument.
    #[must_use]
    pub const fn optional(name: &'static str, description: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }

    fn to_json(&self) -> Value {
        let mut schema = match &self.kind {
            ArgKind::String { max_len } => json!({"type": "string", "maxLength": max_len}),
            ArgKind::Integer { min, max } => json!({"type": "integer", "minimum": min, "maximum": max}),
            ArgKind::Enum(values) => json!({"type": "string", "enum": values}),
            ArgKind::Boolean => json!({"type": "boolean"}),
        };
        if let Some(object) = schema.as_object_mut() {
            object.insert("description".to_string(), Value::from(self.description));
        }
        schema
    }

    /// Check one value against this argument, returning the canonical form.
    fn check(&self, tool: &str, value: &Value) -> Result<Value, ToolError> {
        let name = self.name;
        match &self.kind {
            ArgKind::String { max_len } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| ToolError::argument(tool, format!("`{name}` must be a string")))?
                    .trim();
                if text.is_empty() {
                    return Err(ToolError::argument(tool, format!("`{name}` must not be empty")));
                }
                if text.chars().count() > *max_len {
                    return Err(ToolError::argument(
                        tool,
                        format!("`{name}` exceeds {max_len} characters"),
                    ));
                }
                Ok(Value::from(text))
            }
            ArgKind::Integer { min, max } => {
                let number = integer_value(value)
                    .ok_or_else(|| ToolError::argument(tool, format!("`{name}` must be an integer")))?;
                if number < *min || number > *max {
                    return Err(ToolError::argument(
                        tool,
                        format!("`{name}` must be between {min} and {max}"),
                    ));
                }
                Ok(Value::from(number))
            }
            ArgKind::Enum(values) => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ToolError::argument(tool, format!("`{name}` must be a string")))?;
                let needle = raw.trim().to_lowercase();
                values
                    .iter()
                    .find(|candidate| **candidate == needle)
                    .map(|candidate| Value::from(*candidate))
                    .ok_or_else(|| {
                        ToolError::argument(tool, format!("`{name}` must be one of {}", values.join(", ")))
                    })
            }
            ArgKind::Boolean => value
                .as_bool()
                .map(Value::from)
                .ok_or_else(|| ToolError::argument(tool, format!("`{name}` must be a boolean"))),
        }
    }
}

/// Integers, integral floats, and numeric strings are accepted.
#[allow(clippy::cast_possible_truncation)]
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Declared signature of a tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    /// Registered name.
    pub name: &'static str,
    /// Description shown to the reasoning model.
    pub description: &'static str,
    /// Declared arguments.
    pub args: Vec<ArgSpec>,
}

impl ToolSpec {
    /// JSON description for the reasoning prompt.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|arg| (arg.name.to_string(), arg.to_json()))
            .collect();
        let required: Vec<&str> = self.args.iter().filter(|a| a.required).map(|a| a.name).collect();
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }

    /// Validate raw arguments. `null` values count as absent.
    ///
    /// # Errors
    /// Returns [`ToolError::Argument`] for a non-object, an unknown key, a
    /// missing required argument, or a value of the wrong type or range.
    pub fn validate(&self, arguments: &Value) -> Result<Arguments, ToolError> {
        let empty = Map::new();
        let object = match arguments {
            Value::Object(object) => object,
            Value::Null => &empty,
            _ => return Err(ToolError::argument(self.name, "arguments must be a JSON object")),
        };

        if let Some(unknown) = object.keys().find(|key| !self.args.iter().any(|a| a.name == *key)) {
            return Err(ToolError::argument(self.name, format!("unknown argument `{unknown}`")));
        }

        let mut checked = Map::new();
        for arg in &self.args {
            match object.get(arg.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    checked.insert(arg.name.to_string(), arg.check(self.name, value)?);
                }
                None if arg.required => {
                    return Err(ToolError::argument(
                        self.name,
                        format!("missing required argument `{}`", arg.name),
                    ));
                }
                None => {}
            }
        }
        Ok(Arguments(checked))
    }
}

/// Arguments that passed validation, in canonical form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// String argument (also enum values).
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Integer argument.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Boolean argument.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Canonical arguments as JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "demo",
            description: "demo tool",
            args: vec![
                ArgSpec::required("query", "search text", ArgKind::String { max_len: 10 }),
                ArgSpec::optional("count", "how many", ArgKind::Integer { min: 1, max: 5 }),
                ArgSpec::optional("topic", "topic", ArgKind::Enum(&["general", "news"])),
                ArgSpec::optional("fresh", "flag", ArgKind::Boolean),
            ],
        }
    }

    fn message(err: ToolError) -> String {
        match err {
            ToolError::Argument { message, .. } => message,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_valid_arguments_are_canonicalized() {
        let args = spec()
            .validate(&json!({"query": " rust ", "count": "3", "topic": "NEWS", "fresh": true}))
            .unwrap();
        assert_eq!(args.str("query"), Some("rust"));
        assert_eq!(args.int("count"), Some(3));
        assert_eq!(args.str("topic"), Some("news"));
        assert_eq!(args.bool("fresh"), Some(true));
    }

    #[test]
    fn test_null_counts_as_absent() {
        let args = spec().validate(&json!({"query": "x", "count": null})).unwrap();
        assert_eq!(args.int("count"), None);
    }

    #[test]
    fn test_rejections() {
        let s = spec();
        assert!(message(s.validate(&json!([1])).unwrap_err()).contains("object"));
        assert!(message(s.validate(&json!({})).unwrap_err()).contains("missing"));
        assert!(message(s.validate(&json!({"query": "x", "extra": 1})).unwrap_err()).contains("unknown"));
        assert!(message(s.validate(&json!({"query": 5})).unwrap_err()).contains("string"));
        assert!(message(s.validate(&json!({"query": "01234567890"})).unwrap_err()).contains("exceeds"));
        assert!(message(s.validate(&json!({"query": "x", "count": 9})).unwrap_err()).contains("between"));
        assert!(message(s.validate(&json!({"query": "x", "count": 1.5})).unwrap_err()).contains("integer"));
        assert!(message(s.validate(&json!({"query": "x", "topic": "sports"})).unwrap_err()).contains("one of"));
        assert!(message(s.validate(&json!({"query": "   "})).unwrap_err()).contains("empty"));
    }

    #[test]
    fn test_json_description() {
        let value = spec().to_json();
        assert_eq!(value["name"], "demo");
        assert_eq!(value["parameters"]["required"], json!(["query"]));
        assert_eq!(value["parameters"]["properties"]["topic"]["enum"], json!(["general", "news"]));
    }
}
