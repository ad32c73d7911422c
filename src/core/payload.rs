//! Inbound processing request and its outbound key/value form.
//!
//! The external processor receives a flat JSON object. [`Payload::from_request`]
//! is the one place that conversion happens; absent values are dropped rather
//! than sent as `null`, so the processor never has to distinguish "field
//! omitted" from "field present but empty".
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound key carrying the caller-supplied job key
pub const KEY_FIELD: &str = "callkey";
/// Outbound key carrying the text to process
pub const TEXT_FIELD: &str = "text";
/// Outbound key carrying the optional system prompt
pub const SYSTEM_PROMPT_FIELD: &str = "system_prompt";

/// Body of `POST {base}/process`.
///
/// `key` and `input_text` are optional at the type level so that missing
/// fields surface as taxonomy codes instead of JSON rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default, alias = "callkey")]
    pub key: Option<String>,
    #[serde(default, alias = "text")]
    pub input_text: Option<String>,
    #[serde(default, alias = "system_prompt")]
    pub system_prompt: Option<String>,
    /// Free-form processor options, forwarded as top-level keys
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

impl ProcessRequest {
    pub fn new(key: impl Into<String>, input_text: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            input_text: Some(input_text.into()),
            system_prompt: None,
            options: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    pub fn input_str(&self) -> &str {
        self.input_text.as_deref().unwrap_or_default()
    }
}

/// Flat key/value body sent to the external processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Convert a request into the outbound map.
    ///
    /// Rules:
    /// * `key` → `callkey`, `input_text` → `text`, `system_prompt` → `system_prompt`
    /// * every `options` entry is copied to the top level, but never replaces
    ///   one of the three reserved keys
    /// * any entry whose value is absent or `null` is left out
    pub fn from_request(request: &ProcessRequest) -> Self {
        let mut map = Map::new();

        let reserved = [
            (KEY_FIELD, &request.key),
            (TEXT_FIELD, &request.input_text),
            (SYSTEM_PROMPT_FIELD, &request.system_prompt),
        ];

        if let Some(options) = &request.options {
            for (name, value) in options {
                if reserved.iter().any(|(field, _)| *field == name.as_str()) {
                    continue;
                }
                map.insert(name.clone(), value.clone());
            }
        }

        for (field, value) in reserved {
            if let Some(v) = value {
                map.insert(field.to_string(), Value::String(v.clone()));
            }
        }

        Self(map).strip_absent()
    }

    /// Drop every `null` entry. Idempotent.
    pub fn strip_absent(mut self) -> Self {
        self.0.retain(|_, value| !value.is_null());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;

    fn key_set(payload: &Payload) -> BTreeSet<String> {
        payload.keys().cloned().collect()
    }

    #[test]
    fn test_absent_fields_are_not_transmitted() {
        let payload = Payload::from_request(&ProcessRequest::new("k1", "hello"));
        assert_eq!(
            key_set(&payload),
            BTreeSet::from(["callkey".to_string(), "text".to_string()])
        );
        assert!(!payload.contains_key(SYSTEM_PROMPT_FIELD));
    }

    #[test]
    fn test_null_options_dropped_and_others_flattened() {
        let request = ProcessRequest::new("k1", "hello")
            .with_system_prompt("be brief")
            .with_option("pipeline_name", "summary")
            .with_option("temperature", json!(0.2))
            .with_option("unused", Value::Null);
        let payload = Payload::from_request(&request);

        assert_eq!(payload.len(), 5);
        assert_eq!(payload.get("pipeline_name"), Some(&json!("summary")));
        assert_eq!(payload.get("system_prompt"), Some(&json!("be brief")));
        assert!(!payload.contains_key("unused"));
    }

    #[test]
    fn test_options_cannot_override_reserved_keys() {
        let request = ProcessRequest::new("real-key", "real text")
            .with_option("callkey", "spoofed")
            .with_option("text", "spoofed");
        let payload = Payload::from_request(&request);
        assert_eq!(payload.get("callkey"), Some(&json!("real-key")));
        assert_eq!(payload.get("text"), Some(&json!("real text")));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let payload = Payload::from_request(&ProcessRequest::new("k", "t"));
        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body, json!({"callkey": "k", "text": "t"}));
    }

    #[test]
    fn test_request_accepts_camel_case_and_legacy_names() {
        let camel: ProcessRequest =
            serde_json::from_value(json!({"key": "a", "inputText": "b", "systemPrompt": "c"}))
                .unwrap();
        let legacy: ProcessRequest =
            serde_json::from_value(json!({"callkey": "a", "text": "b", "system_prompt": "c"}))
                .unwrap();
        assert_eq!(camel, legacy);
        assert_eq!(camel.key_str(), "a");
        assert_eq!(camel.input_str(), "b");
    }

    #[test]
    fn test_strip_absent_is_idempotent() {
        let mut map = Map::new();
        map.insert("a".into(), Value::Null);
        map.insert("b".into(), json!(1));
        let once = Payload::from(map).strip_absent();
        let twice = once.clone().strip_absent();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }
}
