//! Core domain model for quarter-compare: entities, search candidates,
//! observations and the resolved per-company record.

use std::fmt;

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};

pub mod stats;

pub const CRATE_NAME: &str = "qcmp-core";

/// Number of period slots every resolved record carries per metric.
pub const PERIOD_SLOTS: usize = 4;

/// Display text of a missing observation.
pub const NOT_DECLARED: &str = "not declared";

/// One business entity with a disclosure event, as handed over by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    #[serde(alias = "short_name")]
    pub display_id: String,
    #[serde(alias = "Long_Name", default)]
    pub long_label: String,
    #[serde(
        alias = "meeting_date",
        default,
        deserialize_with = "deserialize_event_date"
    )]
    pub as_of_date: Option<NaiveDate>,
}

impl EntityReference {
    pub fn new(
        display_id: impl Into<String>,
        long_label: impl Into<String>,
        as_of_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            display_id: display_id.into(),
            long_label: long_label.into(),
            as_of_date,
        }
    }
}

/// Accepts ISO dates and the `02 Jan 2006` layout used by exchange event feeds.
pub fn parse_event_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    ["%Y-%m-%d", "%d %b %Y"]
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
}

fn deserialize_event_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_event_date(text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unrecognised event date {text:?}"))),
    }
}

/// One match returned by the search index for an entity's short identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub candidate_id: String,
    pub numeric_key: Option<i64>,
    pub slug: String,
    pub raw_label: String,
    /// Detail page address when the index provides one directly.
    pub detail_url: Option<String>,
}

/// Ordered period labels, newest first, capped at [`PERIOD_SLOTS`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeriodSequence(Vec<String>);

impl PeriodSequence {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().take(PERIOD_SLOTS).map(Into::into).collect())
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// A value for one (entity, period, metric) triple.
///
/// The display channel and the numeric channel are both derived from this
/// single value; NaN is the numeric sentinel for anything missing or not a number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Observation {
    #[default]
    NotDeclared,
    Amount(f64),
    Text(String),
}

impl Observation {
    pub fn display_text(&self) -> String {
        match self {
            Observation::NotDeclared => NOT_DECLARED.to_string(),
            Observation::Amount(value) => format_amount(*value),
            Observation::Text(text) => text.clone(),
        }
    }

    pub fn numeric_value(&self) -> f64 {
        match self {
            Observation::NotDeclared => f64::NAN,
            Observation::Amount(value) => *value,
            Observation::Text(text) => parse_amount(text).unwrap_or(f64::NAN),
        }
    }

    pub fn is_declared(&self) -> bool {
        !matches!(self, Observation::NotDeclared)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// Two decimal places with trailing zeros and a trailing point removed.
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{value:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Lenient numeric parse used for the numeric channel: trims, drops thousands
/// separators and rejects non-finite results.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(NOT_DECLARED) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Values extracted for one declared period.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterRow {
    pub period: String,
    pub revenue: Observation,
    pub net_profit: Observation,
}

/// Terminal output of one successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyResult {
    pub display_id: String,
    pub long_label: String,
    pub periods: [String; PERIOD_SLOTS],
    pub revenue: [Observation; PERIOD_SLOTS],
    pub net_profit: [Observation; PERIOD_SLOTS],
}

impl CompanyResult {
    /// Builds the record from resolved rows, keeping at most [`PERIOD_SLOTS`]
    /// rows and right-padding the rest with empty labels and `not declared`.
    pub fn from_rows(entity: &EntityReference, rows: Vec<QuarterRow>) -> Self {
        let mut rows = rows.into_iter().take(PERIOD_SLOTS).map(Some).collect::<Vec<_>>();
        rows.resize(PERIOD_SLOTS, None);

        let periods = std::array::from_fn(|i| {
            rows[i].as_ref().map(|r| r.period.clone()).unwrap_or_default()
        });
        let revenue = std::array::from_fn(|i| {
            rows[i].as_ref().map(|r| r.revenue.clone()).unwrap_or_default()
        });
        let net_profit = std::array::from_fn(|i| {
            rows[i].as_ref().map(|r| r.net_profit.clone()).unwrap_or_default()
        });

        Self {
            display_id: entity.display_id.clone(),
            long_label: entity.long_label.clone(),
            periods,
            revenue,
            net_profit,
        }
    }

    pub fn revenue_numeric(&self) -> [f64; PERIOD_SLOTS] {
        self.revenue.each_ref().map(Observation::numeric_value)
    }

    pub fn net_profit_numeric(&self) -> [f64; PERIOD_SLOTS] {
        self.net_profit.each_ref().map(Observation::numeric_value)
    }

    /// Number of slots that carry a period label.
    pub fn resolved_periods(&self) -> usize {
        self.periods.iter().filter(|p| !p.is_empty()).count()
    }
}
