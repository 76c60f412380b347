//! Twin-side types: resolved updates, per-entity patches and the request
//! bodies sent to the twin store.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A reading joined against its mapping row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpdate {
    pub node_key: String,
    pub entity_id: String,
    pub model_id: String,
    pub property_name: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

/// Coerced property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Numeric(f64),
    Text(String),
}

impl PatchValue {
    /// Numeric when the text is a finite float under locale-independent parsing, text otherwise.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => PatchValue::Numeric(n),
            _ => PatchValue::Text(raw.to_string()),
        }
    }
}

impl Serialize for PatchValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PatchValue::Numeric(n) => serializer.serialize_f64(*n),
            PatchValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyUpdate {
    pub property_name: String,
    pub value: PatchValue,
}

/// JSON Patch operation as the twin store expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: &'static str,
    pub path: String,
    pub value: PatchValue,
}

/// All property writes for one entity in one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPatch {
    pub entity_id: String,
    pub model_id: String,
    pub properties: Vec<PropertyUpdate>,
    /// Latest source timestamp among the readings folded into this patch.
    pub observed_at: Option<DateTime<Utc>>,
}

impl EntityPatch {
    pub fn new(entity_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        EntityPatch {
            entity_id: entity_id.into(),
            model_id: model_id.into(),
            properties: Vec::new(),
            observed_at: None,
        }
    }

    /// Sets a property, replacing an earlier write to the same name in place.
    pub fn set(&mut self, property_name: &str, value: PatchValue) {
        match self.properties.iter_mut().find(|p| p.property_name == property_name) {
            Some(existing) => existing.value = value,
            None => self.properties.push(PropertyUpdate {
                property_name: property_name.to_string(),
                value,
            }),
        }
    }

    /// Root-level `add` operations, one per property.
    pub fn operations(&self) -> Vec<PatchOperation> {
        self.properties
            .iter()
            .map(|p| PatchOperation {
                op: "add",
                path: format!("/{}", p.property_name),
                value: p.value.clone(),
            })
            .collect()
    }
}

/// Body for create-or-replace: an empty twin of the given model.
#[derive(Debug, Clone, Serialize)]
pub struct NewTwin<'a> {
    #[serde(rename = "$dtId")]
    pub id: &'a str,
    #[serde(rename = "$metadata")]
    pub metadata: NewTwinMetadata<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTwinMetadata<'a> {
    #[serde(rename = "$model")]
    pub model: &'a str,
}

impl<'a> NewTwin<'a> {
    pub fn new(id: &'a str, model: &'a str) -> Self {
        NewTwin {
            id,
            metadata: NewTwinMetadata { model },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_invariant_numbers() {
        assert_eq!(PatchValue::coerce("21.75"), PatchValue::Numeric(21.75));
        assert_eq!(PatchValue::coerce("-7"), PatchValue::Numeric(-7.0));
        assert_eq!(PatchValue::coerce("1e3"), PatchValue::Numeric(1000.0));
        assert_eq!(PatchValue::coerce(" 42 "), PatchValue::Numeric(42.0));
    }

    #[test]
    fn keeps_non_numbers_as_text() {
        assert_eq!(PatchValue::coerce("OK"), PatchValue::Text("OK".into()));
        assert_eq!(PatchValue::coerce("21,75"), PatchValue::Text("21,75".into()));
        assert_eq!(PatchValue::coerce("1,000"), PatchValue::Text("1,000".into()));
        assert_eq!(PatchValue::coerce(""), PatchValue::Text(String::new()));
        assert_eq!(PatchValue::coerce("NaN"), PatchValue::Text("NaN".into()));
        assert_eq!(PatchValue::coerce("inf"), PatchValue::Text("inf".into()));
    }

    #[test]
    fn later_write_replaces_earlier_in_place() {
        let mut patch = EntityPatch::new("pump-1", "dtmi:pump;1");
        patch.set("Speed", PatchValue::Numeric(1.0));
        patch.set("State", PatchValue::Text("RUN".into()));
        patch.set("Speed", PatchValue::Numeric(2.0));
        assert_eq!(patch.properties.len(), 2);
        assert_eq!(patch.properties[0].property_name, "Speed");
        assert_eq!(patch.properties[0].value, PatchValue::Numeric(2.0));
    }

    #[test]
    fn operations_serialize_as_json_patch() {
        let mut patch = EntityPatch::new("sensor-1", "dtmi:sensor;1");
        patch.set("Temperature", PatchValue::Numeric(21.5));
        patch.set("Status", PatchValue::Text("OK".into()));
        let doc = serde_json::to_value(patch.operations()).unwrap();
        assert_eq!(
            doc,
            json!([
                { "op": "add", "path": "/Temperature", "value": 21.5 },
                { "op": "add", "path": "/Status", "value": "OK" }
            ])
        );
    }

    #[test]
    fn new_twin_body_carries_model_only() {
        let body = serde_json::to_value(NewTwin::new("sensor-1", "dtmi:sensor;1")).unwrap();
        assert_eq!(body, json!({ "$dtId": "sensor-1", "$metadata": { "$model": "dtmi:sensor;1" } }));
    }
}
