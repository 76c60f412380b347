use std::collections::HashMap;

use crate::models::twin::{EntityPatch, PatchValue, ResolvedUpdate};

/// Groups updates per entity in first-seen order and coerces each value.
///
/// Within an entity a repeated property keeps its first position but takes the later value.
pub fn build_patches(updates: &[ResolvedUpdate]) -> Vec<EntityPatch> {
    let mut patches: Vec<EntityPatch> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for update in updates {
        let slot = *index.entry(update.entity_id.as_str()).or_insert_with(|| {
            patches.push(EntityPatch::new(&update.entity_id, &update.model_id));
            patches.len() - 1
        });
        let patch = &mut patches[slot];
        patch.set(&update.property_name, PatchValue::coerce(&update.value));
        if patch.observed_at.is_none_or(|t| update.timestamp > t) {
            patch.observed_at = Some(update.timestamp);
        }
    }

    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn update(entity: &str, model: &str, property: &str, value: &str, minute: u32) -> ResolvedUpdate {
        ResolvedUpdate {
            node_key: format!("{}-{}", entity, property),
            entity_id: entity.into(),
            model_id: model.into(),
            property_name: property.into(),
            value: value.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[test]
    fn two_properties_one_entity() {
        let patches = build_patches(&[
            update("sensor-1", "dtmi:sensor;1", "Temperature", "21.5", 0),
            update("sensor-1", "dtmi:sensor;1", "Status", "OK", 1),
        ]);
        assert_eq!(patches.len(), 1);
        let p = &patches[0];
        assert_eq!(p.properties.len(), 2);
        assert_eq!(p.properties[0].value, PatchValue::Numeric(21.5));
        assert_eq!(p.properties[1].value, PatchValue::Text("OK".into()));
        assert_eq!(p.observed_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()));
    }

    #[test]
    fn same_property_keeps_later_value() {
        let patches = build_patches(&[
            update("sensor-1", "dtmi:sensor;1", "Temperature", "21.5", 5),
            update("sensor-1", "dtmi:sensor;1", "Temperature", "22.0", 2),
        ]);
        assert_eq!(patches[0].properties.len(), 1);
        assert_eq!(patches[0].properties[0].value, PatchValue::Numeric(22.0));
        // batch order decides the value, the newest timestamp is still reported
        assert_eq!(patches[0].observed_at, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()));
    }

    #[test]
    fn entity_order_and_first_model_are_kept() {
        let patches = build_patches(&[
            update("b", "dtmi:b;1", "X", "1", 0),
            update("a", "dtmi:a;1", "X", "1", 0),
            update("b", "dtmi:other;1", "Y", "2", 0),
        ]);
        let ids: Vec<_> = patches.iter().map(|p| p.entity_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(patches[0].model_id, "dtmi:b;1");
        assert_eq!(patches[0].properties.len(), 2);
    }

    #[test]
    fn no_updates_no_patches() {
        assert!(build_patches(&[]).is_empty());
    }
}
