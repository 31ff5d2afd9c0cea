//! Configuration merge logic
//!
//! Layers are merged as JSON values:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values; `overlay` wins on conflict.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_keys_merge() {
        let base = json!({"thresholds": {"auto_approve": 0.85, "auto_reject": 0.30}});
        let overlay = json!({"thresholds": {"auto_approve": 0.90}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["thresholds"]["auto_approve"], 0.90);
        assert_eq!(result["thresholds"]["auto_reject"], 0.30);
    }

    #[test]
    fn test_array_replaced() {
        let base = json!({"tags": ["a", "b", "c"]});
        let overlay = json!({"tags": ["x"]});
        assert_eq!(deep_merge(base, overlay)["tags"], json!(["x"]));
    }

    #[test]
    fn test_merge_layers_precedence() {
        let builtin = json!({
            "attestation": {"validity_days": 3650},
            "timeouts": {"grace_ms": 2000, "forensics_ms": 20000}
        });
        let file = json!({"timeouts": {"grace_ms": 500}});
        let cli = json!({"attestation": {"validity_days": 30}});

        let result = merge_layers(vec![builtin, file, cli]);

        assert_eq!(result["attestation"]["validity_days"], 30);
        assert_eq!(result["timeouts"]["grace_ms"], 500);
        assert_eq!(result["timeouts"]["forensics_ms"], 20000);
    }

    #[test]
    fn test_null_overrides() {
        let result = deep_merge(json!({"cancel_policy": "discard"}), json!({"cancel_policy": null}));
        assert!(result["cancel_policy"].is_null());
    }
}
