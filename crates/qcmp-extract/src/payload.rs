//! Fundamentals payload decoding and quarter reconciliation into a
//! [`CompanyResult`].

use qcmp_core::{CompanyResult, EntityReference, Observation, PeriodSequence, QuarterRow};
use serde_json::{Map, Value as JsonValue};

use crate::diagnostics::DiagnosticsSink;
use crate::reconcile::{find_period_key, select_best_group};
use crate::value::extract_value;
use crate::{json_object, json_string_vec, ExtractError, SchemaProfile};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const SNIPPET_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Empty,
    Json,
    /// Something other than a JSON object or array up front, e.g. an HTML
    /// error page or a JSONP wrapper.
    Suspect,
}

fn trim_payload(body: &[u8]) -> &[u8] {
    body.strip_prefix(UTF8_BOM).unwrap_or(body).trim_ascii()
}

pub fn sniff_payload(body: &[u8]) -> PayloadShape {
    match trim_payload(body).first().copied() {
        None => PayloadShape::Empty,
        Some(b'{' | b'[') => PayloadShape::Json,
        Some(_) => PayloadShape::Suspect,
    }
}

/// Cuts the first balanced JSON object or array out of `body`, skipping
/// brackets inside string literals.
pub fn recover_json(body: &[u8]) -> Option<&[u8]> {
    let start = body.iter().position(|b| matches!(b, b'{' | b'['))?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in body[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decodes a data-endpoint body. Empty bodies fail; bodies that do not open
/// with a JSON token are reported as suspect and then parsed best-effort.
pub fn decode_payload(
    entity: &str,
    body: &[u8],
    sink: &dyn DiagnosticsSink,
) -> Result<JsonValue, ExtractError> {
    let trimmed = trim_payload(body);
    match sniff_payload(trimmed) {
        PayloadShape::Empty => Err(ExtractError::EmptyPayload),
        PayloadShape::Json => serde_json::from_slice(trimmed).or_else(|err| {
            recover_json(trimmed)
                .and_then(|slice| serde_json::from_slice(slice).ok())
                .ok_or_else(|| ExtractError::InvalidPayload(err.to_string()))
        }),
        PayloadShape::Suspect => {
            let snippet = String::from_utf8_lossy(&trimmed[..trimmed.len().min(SNIPPET_LEN)]);
            sink.payload_suspect(entity, &snippet);
            recover_json(trimmed)
                .ok_or_else(|| ExtractError::InvalidPayload("no JSON value in body".to_string()))
                .and_then(|slice| {
                    serde_json::from_slice(slice)
                        .map_err(|e| ExtractError::InvalidPayload(e.to_string()))
                })
        }
    }
}

/// Reconciles one decoded payload into a four-slot record.
///
/// Never fails: metrics that cannot be read become `not declared` and every
/// gap is reported to `sink`. Each declared period keeps its own slot; an
/// unresolved period between resolved ones stays labelled with `not declared`
/// values, while trailing unresolved periods are left blank.
pub fn parse_fundamentals(
    entity: &EntityReference,
    document: &JsonValue,
    profile: &SchemaProfile,
    sink: &dyn DiagnosticsSink,
) -> CompanyResult {
    let id = entity.display_id.as_str();

    let container = match document.get(&profile.container_key) {
        Some(inner) if inner.is_object() => inner,
        _ => {
            sink.container_missing(id);
            document
        }
    };

    let order = json_string_vec(container, &[profile.period_order_key.as_str()]);
    let periods = PeriodSequence::new(order);
    if periods.is_empty() {
        sink.periods_missing(id);
        return CompanyResult::from_rows(entity, Vec::new());
    }

    let Some(groups) = json_object(container, &[profile.groups_key.as_str()]) else {
        sink.group_missing(id, &format!("no `{}` object", profile.groups_key));
        periods.iter().for_each(|p| sink.period_missing(id, p));
        return CompanyResult::from_rows(entity, Vec::new());
    };

    let Some(choice) = select_best_group(groups, &periods) else {
        sink.group_missing(id, "no group matches the declared periods");
        periods.iter().for_each(|p| sink.period_missing(id, p));
        return CompanyResult::from_rows(entity, Vec::new());
    };
    sink.group_selected(id, choice.name, choice.score);

    let mut rows = Vec::with_capacity(periods.len());
    let mut resolved = 0;
    for period in periods.iter() {
        let Some(quarter) = locate_quarter(id, choice.group, period, sink) else {
            sink.period_missing(id, period);
            rows.push(QuarterRow {
                period: period.to_string(),
                revenue: Observation::NotDeclared,
                net_profit: Observation::NotDeclared,
            });
            continue;
        };

        let revenue = extract_value(quarter, &profile.revenue_keys);
        if !revenue.is_declared() {
            sink.metric_missing(id, period, "revenue", &profile.revenue_keys);
        }
        let net_profit = extract_value(quarter, &profile.net_profit_keys);
        if !net_profit.is_declared() {
            sink.metric_missing(id, period, "net_profit", &profile.net_profit_keys);
        }

        rows.push(QuarterRow {
            period: period.to_string(),
            revenue,
            net_profit,
        });
        resolved = rows.len();
    }

    // Unresolved periods after the last resolved one become blank padding.
    rows.truncate(resolved);
    CompanyResult::from_rows(entity, rows)
}

/// Direct key first, then the fuzzy match. Only object values count as a
/// period entry.
fn locate_quarter<'a>(
    id: &str,
    group: &'a Map<String, JsonValue>,
    period: &str,
    sink: &dyn DiagnosticsSink,
) -> Option<&'a Map<String, JsonValue>> {
    if let Some(quarter) = group.get(period).and_then(JsonValue::as_object) {
        return Some(quarter);
    }
    let matched = find_period_key(group, period)?;
    sink.fallback_used(id, period, matched);
    group.get(matched).and_then(JsonValue::as_object)
}
