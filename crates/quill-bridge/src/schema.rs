//! Schema registry primitives.
//!
//! Each operation on the capability surface owns one [`Schema`]: a closed,
//! declarative contract over its payload. Validation produces a sanitized
//! copy containing only the declared fields; payloads carrying undeclared
//! keys are rejected outright. Error messages name the field and the
//! violated bound, never the offending value.

use serde_json::{Map, Value};

use quill_types::BridgeError;

#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 string with an inclusive character-count range.
    Str { min: usize, max: usize },
    /// Unsigned integer with an inclusive range.
    Uint { min: u64, max: u64 },
    Bool,
    /// Closed string enumeration.
    OneOf(&'static [&'static str]),
    /// Homogeneous array with a cardinality cap.
    Array {
        max_items: usize,
        item: Box<FieldKind>,
    },
    /// Nested closed object.
    Object(Vec<FieldRule>),
    /// Free-form JSON value bounded by serialized size.
    Json { max_bytes: usize },
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

impl FieldRule {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldRule>,
}

impl Schema {
    pub fn object(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }

    /// A schema that accepts only an empty payload (`{}` or absent).
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Validate `payload` against this schema, returning a sanitized copy.
    pub fn validate(&self, channel: &str, payload: &Value) -> Result<Value, BridgeError> {
        let empty = Map::new();
        let object = match payload {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(BridgeError::validation(channel, "payload must be an object"));
            }
        };
        validate_object(channel, "payload", &self.fields, object)
    }
}

fn validate_object(
    channel: &str,
    path: &str,
    rules: &[FieldRule],
    object: &Map<String, Value>,
) -> Result<Value, BridgeError> {
    for key in object.keys() {
        if !rules.iter().any(|rule| rule.name == key) {
            return Err(BridgeError::validation(
                channel,
                format!("{path} contains undeclared field `{key}`"),
            ));
        }
    }

    let mut clean = Map::new();
    for rule in rules {
        match object.get(rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    return Err(BridgeError::validation(
                        channel,
                        format!("{path} is missing required field `{}`", rule.name),
                    ));
                }
            }
            Some(value) => {
                let field_path = format!("{path}.{}", rule.name);
                clean.insert(
                    rule.name.to_string(),
                    check_kind(channel, &field_path, &rule.kind, value)?,
                );
            }
        }
    }
    Ok(Value::Object(clean))
}

fn check_kind(
    channel: &str,
    path: &str,
    kind: &FieldKind,
    value: &Value,
) -> Result<Value, BridgeError> {
    match kind {
        FieldKind::Str { min, max } => {
            let Some(s) = value.as_str() else {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be a string"),
                ));
            };
            let chars = s.chars().count();
            if chars < *min || chars > *max {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be {min}..={max} characters, got {chars}"),
                ));
            }
            Ok(value.clone())
        }
        FieldKind::Uint { min, max } => {
            let Some(n) = value.as_u64() else {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be a non-negative integer"),
                ));
            };
            if n < *min || n > *max {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be in {min}..={max}"),
                ));
            }
            Ok(value.clone())
        }
        FieldKind::Bool => {
            if value.as_bool().is_none() {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be a boolean"),
                ));
            }
            Ok(value.clone())
        }
        FieldKind::OneOf(allowed) => {
            let matches = value
                .as_str()
                .is_some_and(|s| allowed.iter().any(|candidate| *candidate == s));
            if !matches {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be one of {allowed:?}"),
                ));
            }
            Ok(value.clone())
        }
        FieldKind::Array { max_items, item } => {
            let Some(items) = value.as_array() else {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be an array"),
                ));
            };
            if items.len() > *max_items {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} holds at most {max_items} items, got {}", items.len()),
                ));
            }
            let mut clean = Vec::with_capacity(items.len());
            for (idx, element) in items.iter().enumerate() {
                clean.push(check_kind(
                    channel,
                    &format!("{path}[{idx}]"),
                    item,
                    element,
                )?);
            }
            Ok(Value::Array(clean))
        }
        FieldKind::Object(rules) => {
            let Some(map) = value.as_object() else {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} must be an object"),
                ));
            };
            validate_object(channel, path, rules, map)
        }
        FieldKind::Json { max_bytes } => {
            let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
            if size > *max_bytes {
                return Err(BridgeError::validation(
                    channel,
                    format!("{path} serializes to {size} bytes, limit is {max_bytes}"),
                ));
            }
            Ok(value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_schema() -> Schema {
        Schema::object(vec![
            FieldRule::required("message", FieldKind::Str { min: 1, max: 2000 }),
            FieldRule::optional("maxSteps", FieldKind::Uint { min: 1, max: 10 }),
            FieldRule::optional(
                "provider",
                FieldKind::OneOf(&["openai", "anthropic", "ollama"]),
            ),
            FieldRule::optional(
                "history",
                FieldKind::Array {
                    max_items: 100,
                    item: Box::new(FieldKind::Object(vec![
                        FieldRule::required("role", FieldKind::OneOf(&["system", "user", "assistant"])),
                        FieldRule::required("content", FieldKind::Str { min: 1, max: 5000 }),
                    ])),
                },
            ),
        ])
    }

    #[test]
    fn accepts_valid_payload_and_passes_fields_through() {
        let clean = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "maxSteps": 3}))
            .unwrap();
        assert_eq!(clean["message"], "hi");
        assert_eq!(clean["maxSteps"], 3);
    }

    #[test]
    fn rejects_empty_string_below_min() {
        let err = message_schema()
            .validate("sendChatMessage", &json!({"message": ""}))
            .unwrap_err();
        assert!(err.to_string().contains("sendChatMessage"));
        assert!(err.to_string().contains("payload.message"));
    }

    #[test]
    fn rejects_string_over_max_without_echoing_it() {
        let long = "a".repeat(2001);
        let err = message_schema()
            .validate("sendChatMessage", &json!({ "message": long }))
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("2001"));
        assert!(!rendered.contains("aaaa"));
    }

    #[test]
    fn rejects_undeclared_fields() {
        let err = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "shell": "sh"}))
            .unwrap_err();
        assert!(err.to_string().contains("undeclared field `shell`"));
    }

    #[test]
    fn rejects_out_of_range_integer() {
        let err = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "maxSteps": 11}))
            .unwrap_err();
        assert!(err.to_string().contains("1..=10"));
    }

    #[test]
    fn rejects_value_outside_closed_enum() {
        let err = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "provider": "groq"}))
            .unwrap_err();
        assert!(err.to_string().contains("payload.provider"));
    }

    #[test]
    fn enforces_array_cardinality_cap() {
        let entry = json!({"role": "user", "content": "x"});
        let history: Vec<_> = (0..101).map(|_| entry.clone()).collect();
        let err = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "history": history}))
            .unwrap_err();
        assert!(err.to_string().contains("at most 100"));
    }

    #[test]
    fn validates_nested_object_rules() {
        let err = message_schema()
            .validate(
                "sendChatMessage",
                &json!({"message": "hi", "history": [{"role": "robot", "content": "x"}]}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("history[0].role"));
    }

    #[test]
    fn json_blob_is_size_bounded() {
        let schema = Schema::object(vec![FieldRule::required(
            "value",
            FieldKind::Json { max_bytes: 64 },
        )]);
        assert!(schema
            .validate("setSetting", &json!({"value": {"theme": "dark"}}))
            .is_ok());
        let big = json!({ "value": "v".repeat(200) });
        assert!(schema.validate("setSetting", &big).is_err());
    }

    #[test]
    fn empty_schema_accepts_null_and_empty_object_only() {
        let schema = Schema::empty();
        assert!(schema.validate("getKnowledgeStatus", &Value::Null).is_ok());
        assert!(schema.validate("getKnowledgeStatus", &json!({})).is_ok());
        assert!(schema
            .validate("getKnowledgeStatus", &json!({"x": 1}))
            .is_err());
        assert!(schema.validate("getKnowledgeStatus", &json!(42)).is_err());
    }

    #[test]
    fn optional_null_is_treated_as_absent() {
        let clean = message_schema()
            .validate("sendChatMessage", &json!({"message": "hi", "maxSteps": null}))
            .unwrap();
        assert!(clean.get("maxSteps").is_none());
    }
}
