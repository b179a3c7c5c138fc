//! Schema-tolerant extraction for quarter-compare: search responses, data
//! endpoint discovery, payload decoding and quarter reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

pub mod diagnostics;
pub mod discover;
pub mod payload;
pub mod reconcile;
pub mod value;

pub use diagnostics::{
    DiagnosticEvent, DiagnosticsSink, NoopDiagnostics, RecordingDiagnostics, TracingDiagnostics,
};
pub use discover::{decode_search_candidates, DataUrlLocator, DataUrlMatch, DiscoveryStrategy};
pub use payload::{decode_payload, parse_fundamentals, recover_json, sniff_payload, PayloadShape};
pub use reconcile::{find_period_key, normalize_label, rank_groups, select_best_group, GroupChoice};
pub use value::extract_value;

pub const CRATE_NAME: &str = "qcmp-extract";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("empty payload")]
    EmptyPayload,
    #[error("payload is not decodable JSON: {0}")]
    InvalidPayload(String),
    #[error("search response is not a candidate list: {0}")]
    InvalidSearchResponse(String),
    #[error("invalid discovery pattern: {0}")]
    InvalidPattern(String),
}

/// Where the fundamentals payload keeps its pieces and which fields carry each metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaProfile {
    pub container_key: String,
    pub period_order_key: String,
    pub groups_key: String,
    pub revenue_keys: Vec<String>,
    pub net_profit_keys: Vec<String>,
}

impl Default for SchemaProfile {
    fn default() -> Self {
        Self {
            container_key: "body".to_string(),
            period_order_key: "quarterlyOrder".to_string(),
            groups_key: "quarterlyDataDump".to_string(),
            revenue_keys: vec!["TOTAL_SR_Q".to_string(), "SR_Q".to_string()],
            net_profit_keys: vec!["NP_Q".to_string()],
        }
    }
}

pub(crate) fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

pub(crate) fn json_object<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a Map<String, JsonValue>> {
    json_at(value, path)?.as_object()
}

/// Strings as-is, numbers rendered; empty strings count as absent.
pub(crate) fn json_text(value: &JsonValue, path: &[&str]) -> Option<String> {
    let text = match json_at(value, path)? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn json_i64(value: &JsonValue, path: &[&str]) -> Option<i64> {
    match json_at(value, path)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn json_string_vec(value: &JsonValue, path: &[&str]) -> Vec<String> {
    json_at(value, path)
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}
