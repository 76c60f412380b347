use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;

use crate::error::BridgeError;
use crate::models::mapping::MappingEntry;
use crate::models::opcua::NodeReading;
use crate::models::twin::ResolvedUpdate;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parses a source timestamp; zone-less values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Joins every reading against the mapping table.
///
/// Any reading whose key matches zero or several rows aborts the whole batch, as does
/// an unparseable timestamp: nothing is written when the table cannot be trusted.
pub fn resolve(readings: &[NodeReading], mapping: &[MappingEntry]) -> Result<Vec<ResolvedUpdate>, BridgeError> {
    let mut by_key: HashMap<&str, Vec<&MappingEntry>> = HashMap::new();
    for entry in mapping {
        by_key.entry(entry.node_key.as_str()).or_default().push(entry);
    }

    let mut updates = Vec::with_capacity(readings.len());
    for reading in readings {
        let key = reading.node_key();
        let entry = match by_key.get(key).map(Vec::as_slice) {
            Some([only]) => *only,
            other => {
                return Err(BridgeError::MappingResolution {
                    key: key.to_string(),
                    matches: other.map_or(0, <[_]>::len),
                });
            }
        };
        if entry.property_name.trim().is_empty() {
            return Err(BridgeError::EmptyPropertyName { key: key.to_string() });
        }

        let timestamp = parse_timestamp(&reading.source_timestamp).ok_or_else(|| BridgeError::TimestampParse {
            address: reading.source_address.clone(),
            raw: reading.source_timestamp.clone(),
        })?;

        updates.push(ResolvedUpdate {
            node_key: key.to_string(),
            entity_id: entry.entity_id.clone(),
            model_id: entry.model_id.clone(),
            property_name: entry.property_name.clone(),
            value: reading.value.clone(),
            timestamp,
        });
    }

    if updates.is_empty() {
        return Err(BridgeError::EmptyResultSet);
    }
    Ok(updates)
}
