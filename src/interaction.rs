//! Callee-initiated interactions: elicitation, sampling and root listing.
//!
//! The callbacks defined here are supplied by the caller side and run when the
//! peer's tool pauses to ask a question. Elicitation results are checked against
//! the requested schema at the boundary, so a tool only ever sees data that has
//! the shape it asked for.

use crate::error::{Error, Result};
use crate::session::BoxFuture;
use crate::types::{
    CreateMessageParams, CreateMessageResult, ElicitRequestParams, ElicitResult, ListRootsResult,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type ElicitCallback =
    Arc<dyn Fn(ElicitRequestParams) -> BoxFuture<'static, Result<ElicitResult>> + Send + Sync>;
pub type SampleCallback = Arc<
    dyn Fn(CreateMessageParams) -> BoxFuture<'static, Result<CreateMessageResult>> + Send + Sync,
>;
pub type RootsCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<ListRootsResult>> + Send + Sync>;

/// Fills absent top-level properties with the `default` declared in the schema.
pub fn apply_defaults(schema: &Value, content: &mut Map<String, Value>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (key, property) in properties {
        if content.contains_key(key) {
            continue;
        }
        if let Some(default) = property.get("default") {
            content.insert(key.clone(), default.clone());
        }
    }
}

/// Validates accepted content against the requested schema.
pub fn validate_accept(schema: &Value, content: &Map<String, Value>) -> Result<()> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::Malformed(format!("invalid requested schema: {}", e)))?;
    let instance = Value::Object(content.clone());
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Malformed(format!(
            "accepted content does not match the requested schema: {}",
            errors.join("; ")
        )))
    }
}

/// Applies defaults to an `accept` and validates it. `decline` and `cancel` pass through.
pub fn check_elicit_result(schema: &Value, result: ElicitResult) -> Result<ElicitResult> {
    match result {
        ElicitResult::Accept { mut content } => {
            apply_defaults(schema, &mut content);
            validate_accept(schema, &content)?;
            Ok(ElicitResult::Accept { content })
        }
        other => Ok(other),
    }
}

/// A typed elicitation outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Elicitation<T> {
    Accept(T),
    Decline,
    Cancel,
}

impl<T: DeserializeOwned> Elicitation<T> {
    pub fn from_result(result: ElicitResult) -> Result<Self> {
        match result {
            ElicitResult::Accept { content } => serde_json::from_value(Value::Object(content))
                .map(Elicitation::Accept)
                .map_err(|e| Error::Malformed(format!("accepted content: {}", e))),
            ElicitResult::Decline => Ok(Elicitation::Decline),
            ElicitResult::Cancel => Ok(Elicitation::Cancel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn order_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "want_toppings": { "type": "boolean" },
                "toppings": { "type": "string", "default": "mushrooms" }
            },
            "required": ["want_toppings"]
        })
    }

    fn content(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_fill_absent_optional_fields() {
        let checked = check_elicit_result(
            &order_schema(),
            ElicitResult::Accept {
                content: content(json!({ "want_toppings": true })),
            },
        )
        .unwrap();
        assert_eq!(
            checked,
            ElicitResult::Accept {
                content: content(json!({ "want_toppings": true, "toppings": "mushrooms" }))
            }
        );
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let result = check_elicit_result(
            &order_schema(),
            ElicitResult::Accept {
                content: content(json!({ "toppings": "olives" })),
            },
        );
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let err = validate_accept(&order_schema(), &content(json!({ "want_toppings": "yes" })));
        assert!(matches!(err, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decline_and_cancel_skip_validation() {
        assert_eq!(
            check_elicit_result(&order_schema(), ElicitResult::Decline).unwrap(),
            ElicitResult::Decline
        );
        assert_eq!(
            check_elicit_result(&order_schema(), ElicitResult::Cancel).unwrap(),
            ElicitResult::Cancel
        );
    }

    #[test]
    fn test_typed_elicitation() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Prefs {
            want_toppings: bool,
            toppings: String,
        }
        let accepted = Elicitation::<Prefs>::from_result(ElicitResult::Accept {
            content: content(json!({ "want_toppings": false, "toppings": "ham" })),
        })
        .unwrap();
        assert_eq!(
            accepted,
            Elicitation::Accept(Prefs {
                want_toppings: false,
                toppings: "ham".to_string()
            })
        );
        assert_eq!(
            Elicitation::<Prefs>::from_result(ElicitResult::Cancel).unwrap(),
            Elicitation::Cancel
        );
    }
}
