use serde_json::{Map, Value};

pub const ENVELOPE_TYPE_KEY: &str = "type";
pub const ENVELOPE_VALUE_KEY: &str = "value";

/// A map is an envelope when its keys are exactly `type` and `value`.
///
/// Domain objects that declare exactly these two fields are indistinguishable
/// from envelopes; callers decode against the raw tree first so such targets
/// keep their own shape.
pub fn is_envelope(map: &Map<String, Value>) -> bool {
    map.len() == 2 && map.contains_key(ENVELOPE_TYPE_KEY) && map.contains_key(ENVELOPE_VALUE_KEY)
}

/// Replaces every envelope in the tree with its unwrapped `value`.
///
/// Nested envelopes collapse in one pass, envelopes inside ordinary object
/// fields and sequence elements are resolved too. Total over any JSON value.
pub fn unwrap_envelopes(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if is_envelope(&map) {
                map.remove(ENVELOPE_VALUE_KEY)
                    .map_or(Value::Null, unwrap_envelopes)
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(key, value)| (key, unwrap_envelopes(value)))
                        .collect(),
                )
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_envelopes).collect()),
        scalar => scalar,
    }
}

pub fn contains_envelope(value: &Value) -> bool {
    match value {
        Value::Object(map) => is_envelope(map) || map.values().any(contains_envelope),
        Value::Array(items) => items.iter().any(contains_envelope),
        _ => false,
    }
}

/// Parses `text` as a JSON object and unwraps it. `None` when the text is not
/// a JSON object.
pub fn unwrap_text(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ Value::Object(_)) => Some(unwrap_envelopes(value)),
        _ => None,
    }
}

/// Plain-text spelling of a scalar: string contents, or the JSON spelling of
/// numbers and booleans.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn collapses_envelopes_inside_fields() {
        let tree = json!({
            "name": {"type": "string", "value": "John"},
            "age": {"type": "integer", "value": 30}
        });
        assert!(contains_envelope(&tree));
        assert_eq!(unwrap_envelopes(tree), json!({"name": "John", "age": 30}));
    }

    #[test]
    fn nested_envelopes_collapse_in_one_pass() {
        let tree = json!({"type": "object", "value": {"type": "string", "value": "deep"}});
        assert_eq!(unwrap_envelopes(tree), json!("deep"));
    }

    #[test]
    fn envelope_value_is_unwrapped_recursively() {
        let tree = json!({
            "type": "array",
            "value": [
                {"type": "string", "value": "a"},
                {"label": {"type": "string", "value": "b"}}
            ]
        });
        assert_eq!(unwrap_envelopes(tree), json!(["a", {"label": "b"}]));
    }

    #[test]
    fn extra_keys_disqualify_an_envelope() {
        let tree = json!({"type": "string", "value": "x", "note": "kept"});
        assert!(!contains_envelope(&tree));
        assert_eq!(unwrap_envelopes(tree.clone()), tree);

        let one_key = json!({"value": 1});
        assert_eq!(unwrap_envelopes(one_key.clone()), one_key);
    }

    #[test]
    fn unwrap_is_idempotent() {
        let tree = json!({
            "items": [{"type": "integer", "value": 1}, 2, null],
            "meta": {"source": {"type": "string", "value": "llm"}}
        });
        let once = unwrap_envelopes(tree);
        let twice = unwrap_envelopes(once.clone());
        assert_eq!(once, twice);
        assert!(!contains_envelope(&twice));
    }

    #[test]
    fn scalars_pass_through() {
        for scalar in [json!(null), json!(true), json!(1.5), json!("text")] {
            assert_eq!(unwrap_envelopes(scalar.clone()), scalar);
        }
    }

    #[test]
    fn unwrap_text_only_accepts_objects() {
        assert_eq!(
            unwrap_text(r#" {"type":"integer","value":42} "#),
            Some(json!(42))
        );
        assert_eq!(unwrap_text("[1,2]"), None);
        assert_eq!(unwrap_text("not json"), None);
    }

    #[test]
    fn scalar_text_spells_json_scalars() {
        assert_eq!(scalar_text(&json!("John")).as_deref(), Some("John"));
        assert_eq!(scalar_text(&json!(30)).as_deref(), Some("30"));
        assert_eq!(scalar_text(&json!(2.5)).as_deref(), Some("2.5"));
        assert_eq!(scalar_text(&json!(false)).as_deref(), Some("false"));
        assert_eq!(scalar_text(&json!(null)), None);
        assert_eq!(scalar_text(&json!({"a": 1})), None);
    }
}
