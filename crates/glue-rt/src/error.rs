use std::collections::BTreeMap;

use crate::json::JsonValue;

/// Body shape shared by every JSON error response: `{"error":{"code","message"}}`.
pub fn error_json(code: &str, message: &str) -> JsonValue {
    let mut err = BTreeMap::new();
    err.insert("code".to_string(), JsonValue::String(code.to_string()));
    err.insert(
        "message".to_string(),
        JsonValue::String(message.to_string()),
    );
    let mut root = BTreeMap::new();
    root.insert("error".to_string(), JsonValue::Object(err));
    JsonValue::Object(root)
}
