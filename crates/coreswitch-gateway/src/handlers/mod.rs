//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

use std::str::FromStr;

use coreswitch_control::InstanceId;
use serde_json::Value;

use crate::error::ApiError;

pub mod agents;
pub mod convert;
pub mod health;
pub mod instances;
pub mod switch_logs;
pub mod templates;

/// Parse a path identifier, naming its kind in the error.
fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {kind} ID: {raw}")))
}

fn parse_instance_id(raw: &str) -> Result<InstanceId, ApiError> {
    InstanceId::new(raw).map_err(|e| ApiError::BadRequest(format!("invalid instance ID: {e}")))
}

/// Configuration payloads may be sent as a JSON string or inline as JSON.
fn config_text(config: Option<Value>) -> Option<String> {
    match config? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreswitch_control::AgentHostId;
    use serde_json::json;

    #[test]
    fn config_text_accepts_both_shapes() {
        assert_eq!(config_text(None), None);
        assert_eq!(config_text(Some(Value::Null)), None);
        assert_eq!(config_text(Some(json!("{\"a\":1}"))).as_deref(), Some("{\"a\":1}"));
        assert_eq!(config_text(Some(json!({"a": 1}))).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn parse_id_names_the_kind() {
        let err = parse_id::<AgentHostId>("agent host", "nope").unwrap_err();
        assert_eq!(err.to_string(), "bad request: invalid agent host ID: nope");
        assert!(parse_instance_id("bad/id").is_err());
    }
}
