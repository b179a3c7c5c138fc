//! Quarter value extraction with prioritized field names.

use qcmp_core::Observation;
use serde_json::{Map, Value as JsonValue};

/// Returns the first usable value among `keys`, in order. Absence of every key
/// yields [`Observation::NotDeclared`]; it is never an error.
pub fn extract_value<K: AsRef<str>>(group: &Map<String, JsonValue>, keys: &[K]) -> Observation {
    keys.iter()
        .filter_map(|key| group.get(key.as_ref()))
        .find_map(coerce)
        .unwrap_or_default()
}

fn coerce(value: &JsonValue) -> Option<Observation> {
    match value {
        JsonValue::Null => None,
        JsonValue::Number(n) => n.as_f64().map(Observation::Amount),
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(Observation::Amount(v)),
                _ => Some(Observation::Text(s.clone())),
            }
        }
        other => Some(Observation::Text(other.to_string())),
    }
}
