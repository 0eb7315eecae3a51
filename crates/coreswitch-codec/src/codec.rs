//! The per-engine codec contract and helpers shared by the codecs.

use coreswitch_core::CoreEngine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CodecError, Result};
use crate::inbound::Inbound;

/// Listeners parsed from a native document, with non-fatal findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Parsed {
    /// Parsed listeners in document order.
    pub inbounds: Vec<Inbound>,
    /// Listeners skipped or fields ignored while parsing.
    pub warnings: Vec<String>,
}

/// Listeners rendered into an engine's native JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Native {
    /// One native inbound object per kept listener.
    pub inbounds: Vec<Value>,
    /// Listeners or fields dropped because the engine has no equivalent.
    pub warnings: Vec<String>,
}

/// Detection, parsing and serialization for one engine's native format.
pub trait Codec: Send + Sync {
    /// Engine handled by this codec.
    fn engine(&self) -> CoreEngine;

    /// Confidence that a document is in this engine's format; 0 means no.
    fn detect(&self, doc: &Value) -> u32;

    /// Parse the listeners of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or a listener in it is malformed.
    fn parse(&self, doc: &Value) -> Result<Parsed>;

    /// Render canonical listeners into native inbound objects.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be encoded.
    fn to_native(&self, inbounds: &[Inbound]) -> Result<Native>;
}

/// The `inbounds` array of a document; absent means empty.
pub(crate) fn inbound_values(doc: &Value) -> Result<&[Value]> {
    let Some(object) = doc.as_object() else {
        return Err(CodecError::InvalidDocument(
            "top level must be a JSON object".to_string(),
        ));
    };
    match object.get("inbounds") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(CodecError::InvalidDocument(
            "\"inbounds\" must be an array".to_string(),
        )),
    }
}

/// The tag of a raw listener object, or empty.
pub(crate) fn raw_tag(value: &Value) -> &str {
    value.get("tag").and_then(Value::as_str).unwrap_or_default()
}

/// Score the objects of a top-level array by the keys they carry.
pub(crate) fn score_array(doc: &Value, array: &str, weights: &[(&str, u32)]) -> u32 {
    doc.get(array)
        .and_then(Value::as_array)
        .map_or(0, |items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| {
                    weights
                        .iter()
                        .filter(|(key, _)| item.contains_key(*key))
                        .map(|(_, weight)| weight)
                        .sum::<u32>()
                })
                .sum()
        })
}

/// Score a document by its distinctive top-level keys.
pub(crate) fn score_top_level(doc: &Value, keys: &[&str]) -> u32 {
    let Some(object) = doc.as_object() else {
        return 0;
    };
    let hits = keys.iter().filter(|key| object.contains_key(**key)).count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

/// Deserialize either a single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// First non-empty string of a list.
pub(crate) fn first_non_empty(values: &[String]) -> String {
    values
        .iter()
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_default()
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Hosts {
        #[serde(default, deserialize_with = "one_or_many")]
        host: Vec<String>,
    }

    #[test]
    fn inbound_values_shapes() {
        assert!(inbound_values(&json!({})).unwrap().is_empty());
        assert_eq!(inbound_values(&json!({"inbounds": [{}]})).unwrap().len(), 1);
        assert!(inbound_values(&json!([])).is_err());
        assert!(inbound_values(&json!({"inbounds": {}})).is_err());
    }

    #[test]
    fn one_or_many_accepts_both() {
        let one: Hosts = serde_json::from_value(json!({"host": "a.com"})).unwrap();
        assert_eq!(one.host, vec!["a.com"]);
        let many: Hosts = serde_json::from_value(json!({"host": ["a.com", "b.com"]})).unwrap();
        assert_eq!(many.host.len(), 2);
        let none: Hosts = serde_json::from_value(json!({})).unwrap();
        assert!(none.host.is_empty());
    }
}
