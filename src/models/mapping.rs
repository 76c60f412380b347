use serde::{Deserialize, Serialize};

/// One row of the node-to-twin mapping document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    #[serde(alias = "NodeId", alias = "nodeId")]
    pub node_key: String,
    #[serde(alias = "TwinId", alias = "twinId")]
    pub entity_id: String,
    #[serde(alias = "ModelId")]
    pub model_id: String,
    #[serde(alias = "Property", alias = "property")]
    pub property_name: String,
}
