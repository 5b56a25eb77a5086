use std::collections::BTreeMap;

use glue_rt::json::JsonValue;

use crate::interp::value::{Composite, Value};

pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Int(v) => JsonValue::Int(*v),
        Value::Float(v) => JsonValue::Float(*v),
        Value::String(v) => JsonValue::String(v.clone()),
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Composite(composite) => match composite.as_ref() {
            Composite::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
            Composite::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value_to_json(value)))
                    .collect(),
            ),
        },
    }
}

/// JSON `null` has no runtime counterpart and decodes to `Int(0)`.
pub fn json_to_value(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Int(0),
        JsonValue::Bool(v) => Value::Bool(*v),
        JsonValue::Int(v) => Value::Int(*v),
        JsonValue::Float(v) => Value::Float(*v),
        JsonValue::String(v) => Value::String(v.clone()),
        JsonValue::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        JsonValue::Object(map) => {
            let fields: BTreeMap<String, Value> = map
                .iter()
                .map(|(key, value)| (key.clone(), json_to_value(value)))
                .collect();
            Value::object(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glue_rt::json;

    #[test]
    fn nested_values_survive_the_wire() {
        let mut inner = BTreeMap::new();
        inner.insert("pi".to_string(), Value::Float(3.25));
        inner.insert("ok".to_string(), Value::Bool(false));
        inner.insert(
            "tags".to_string(),
            Value::array(vec![Value::String("a\"b".into()), Value::Int(-9)]),
        );
        let original = Value::array(vec![Value::object(inner), Value::Int(7)]);

        let text = json::encode(&value_to_json(&original));
        let decoded = json_to_value(&json::decode(&text).unwrap());

        // composites compare by identity, so compare their wire forms
        assert_eq!(value_to_json(&decoded), value_to_json(&original));
        assert_eq!(decoded.to_string_value(), original.to_string_value());
    }

    #[test]
    fn null_decodes_to_zero() {
        let decoded = json_to_value(&json::decode(r#"{"a":null}"#).unwrap());
        let fields = decoded.as_object().unwrap();
        assert_eq!(fields["a"], Value::Int(0));
    }

    #[test]
    fn numbers_keep_their_kind() {
        assert!(matches!(json_to_value(&JsonValue::Int(3)), Value::Int(3)));
        let decoded = json_to_value(&json::decode("2.0").unwrap());
        assert!(matches!(decoded, Value::Float(v) if v == 2.0));
    }
}
