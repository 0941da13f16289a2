//! Payload filtering.

use serde_json::Value;

/// Extracts the event data from a decoded payload.
///
/// The payload is kept only if it contains `filter` as a substring, parses
/// as a JSON array, and its second element is an object whose `data` field
/// is an object. That `data` object is returned.
#[must_use]
pub fn extract_data(payload: &str, filter: &str) -> Option<Value> {
    if !payload.contains(filter) {
        return None;
    }

    let envelope: Vec<Value> = serde_json::from_str(payload).ok()?;

    match envelope.into_iter().nth(1)? {
        Value::Object(mut body) => match body.remove("data")? {
            data @ Value::Object(_) => Some(data),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_extracts_data_object() {
        let payload = r#"["chat_message",{"data":{"text":"hi"}}]"#;
        assert_eq!(
            extract_data(payload, "chat_message"),
            Some(json!({"text": "hi"}))
        );
    }

    #[test]
    fn test_filter_is_a_substring_match() {
        let payload = r#"["chat_message",{"data":{"room":"lobby"}}]"#;
        assert!(extract_data(payload, "lobby").is_some());
        assert!(extract_data(payload, "").is_some());
        assert!(extract_data(payload, "presence").is_none());
    }

    #[test]
    fn test_drops_malformed_payloads() {
        assert_eq!(extract_data("40", "4"), None);
        assert_eq!(extract_data(r#"["x"]"#, "x"), None);
        assert_eq!(extract_data(r#"["x","body"]"#, "x"), None);
        assert_eq!(extract_data(r#"["x",{"other":{}}]"#, "x"), None);
        assert_eq!(extract_data(r#"["x",{"data":[1,2]}]"#, "x"), None);
        assert_eq!(extract_data(r#"["x",{"data":null}]"#, "x"), None);
        assert_eq!(extract_data(r#"{"x":1}"#, "x"), None);
        assert_eq!(extract_data(r#"["channel_inited",null]"#, "channel"), None);
    }
}
