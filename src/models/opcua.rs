//! Wire shapes emitted by the OPC UA publisher.
//!
//! The publisher is not consistent about casing across versions, so every field
//! accepts both the PascalCase and the camelCase spelling.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One monitored item as it appears in a publisher batch.
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "NodeId", alias = "nodeId", alias = "sourceAddress", alias = "SourceAddress")]
    pub node_id: String,
    #[serde(default, rename = "ApplicationUri", alias = "applicationUri")]
    pub application_uri: Option<String>,
    #[serde(default, rename = "DisplayName", alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, rename = "Value", alias = "value")]
    pub value: Option<NodeValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeValue {
    #[serde(default, rename = "Value", alias = "value", deserialize_with = "textual")]
    pub value: String,
    #[serde(
        default,
        rename = "SourceTimestamp",
        alias = "SourceTimeStamp",
        alias = "sourceTimestamp",
        alias = "sourceTimeStamp"
    )]
    pub source_timestamp: String,
}

/// Normalized reading handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReading {
    pub source_address: String,
    pub display_name: Option<String>,
    pub value: String,
    pub source_timestamp: String,
}

impl NodeReading {
    /// Builds a reading from a publisher node; `None` when the node carries no value object.
    pub fn from_node(node: Node) -> Option<Self> {
        let value = node.value?;
        Some(NodeReading {
            source_address: node.node_id,
            display_name: node.display_name,
            value: value.value,
            source_timestamp: value.source_timestamp,
        })
    }

    /// Join key: everything after the last `=`, or the whole address when there is none.
    pub fn node_key(&self) -> &str {
        match self.source_address.rfind('=') {
            Some(idx) => &self.source_address[idx + 1..],
            None => &self.source_address,
        }
    }
}

/// Publishers emit numbers and booleans as bare JSON scalars; keep their textual form.
fn textual<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}
