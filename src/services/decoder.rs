use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::warn;
use serde_json::Value;

use crate::error::BridgeError;
use crate::models::opcua::{Node, NodeReading};

/// Pulls the batch body out of an event envelope.
///
/// Accepts `{"body": ...}` as well as an Event Grid event carrying it under `data`,
/// where `data` may itself be a serialized JSON string.
pub fn extract_body(event: &str) -> Result<String, BridgeError> {
    let envelope: Value = serde_json::from_str(event)
        .map_err(|e| BridgeError::PayloadDecode(format!("event is not valid JSON: {}", e)))?;

    let data = match envelope.get("data") {
        Some(Value::Null) => return Err(BridgeError::EmptyEvent),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(BridgeError::EmptyEvent),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| BridgeError::PayloadDecode(format!("event data is not valid JSON: {}", e)))?,
        Some(other) => other.clone(),
        None if envelope.get("body").is_some() => envelope,
        None => return Err(BridgeError::EmptyEvent),
    };

    match data.get("body") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(body @ Value::Array(_)) => Ok(body.to_string()),
        Some(Value::Null) | None => Err(BridgeError::PayloadDecode("event data has no 'body' field".into())),
        Some(_) => Err(BridgeError::PayloadDecode("'body' must be a string or an array".into())),
    }
}

/// True when `text` should be treated as Base64 rather than plain JSON.
pub fn is_base64(text: &str) -> bool {
    !text.is_empty()
        && text.len() % 4 == 0
        && !text.chars().any(char::is_whitespace)
        && BASE64.decode(text).is_ok()
}

/// Returns the plain text of a body that may or may not be Base64 encoded.
pub fn decode_body(raw: &str) -> Result<String, BridgeError> {
    if !is_base64(raw) {
        return Ok(raw.to_string());
    }
    let bytes = BASE64
        .decode(raw)
        .map_err(|e| BridgeError::PayloadDecode(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| BridgeError::PayloadDecode(format!("decoded body is not UTF-8: {}", e)))
}

/// Decodes a batch body into readings. Nodes without a value object are skipped.
pub fn decode(raw: &str) -> Result<Vec<NodeReading>, BridgeError> {
    let text = decode_body(raw)?;
    let nodes: Vec<Node> = serde_json::from_str(&text)
        .map_err(|e| BridgeError::PayloadDecode(format!("body is not a JSON array of nodes: {}", e)))?;
    if nodes.is_empty() {
        return Err(BridgeError::EmptyPayload);
    }

    let mut readings = Vec::with_capacity(nodes.len());
    for node in nodes {
        let address = node.node_id.clone();
        match NodeReading::from_node(node) {
            Some(r) => readings.push(r),
            None => warn!("Node '{}' carries no value, skipping", address),
        }
    }
    Ok(readings)
}
