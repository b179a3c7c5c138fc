//! Search-response decoding and data endpoint discovery on detail pages.

use qcmp_core::SearchCandidate;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{json_i64, json_text, ExtractError};

/// Decodes an autocomplete response into candidates, keeping the index's order.
/// Non-object entries are skipped.
pub fn decode_search_candidates(body: &[u8]) -> Result<Vec<SearchCandidate>, ExtractError> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|e| ExtractError::InvalidSearchResponse(e.to_string()))?;
    let items = value.as_array().ok_or_else(|| {
        ExtractError::InvalidSearchResponse("expected a JSON array".to_string())
    })?;

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| SearchCandidate {
            candidate_id: json_text(item, &["id"]).unwrap_or_default(),
            numeric_key: json_i64(item, &["k"]),
            slug: json_text(item, &["slugname"]).unwrap_or_default(),
            raw_label: json_text(item, &["label"])
                .or_else(|| json_text(item, &["value"]))
                .unwrap_or_default(),
            detail_url: json_text(item, &["nexturl"]),
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    Attribute,
    QuotedAttribute,
    PathFragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrlMatch {
    pub url: String,
    pub strategy: DiscoveryStrategy,
}

/// Finds the embedded data endpoint in a detail page: an unquoted attribute
/// first, then the attribute as the DOM sees it (quoted variants), then any
/// URL carrying the known path fragment.
#[derive(Debug, Clone)]
pub struct DataUrlLocator {
    attribute_selector: String,
    unquoted: Regex,
    fragment_scan: Regex,
}

impl DataUrlLocator {
    pub fn new(attribute: &str, path_fragment: &str) -> Result<Self, ExtractError> {
        let attribute_selector = format!("[{attribute}]");
        Selector::parse(&attribute_selector)
            .map_err(|e| ExtractError::InvalidPattern(e.to_string()))?;
        let unquoted = Regex::new(&format!(
            r#"{}=(https?://[^\s"'<>]+)"#,
            regex::escape(attribute)
        ))
        .map_err(|e| ExtractError::InvalidPattern(e.to_string()))?;
        let fragment_scan = Regex::new(&format!(
            r#"https?://[^\s"'<>]*{}[^\s"'<>]*"#,
            regex::escape(path_fragment)
        ))
        .map_err(|e| ExtractError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            attribute_selector,
            unquoted,
            fragment_scan,
        })
    }

    pub fn locate(&self, html: &str) -> Option<DataUrlMatch> {
        if let Some(url) = self.unquoted.captures(html).and_then(|c| c.get(1)) {
            return Some(DataUrlMatch {
                url: url.as_str().to_string(),
                strategy: DiscoveryStrategy::Attribute,
            });
        }

        if let Some(url) = self.attribute_value(html) {
            return Some(DataUrlMatch {
                url,
                strategy: DiscoveryStrategy::QuotedAttribute,
            });
        }

        self.fragment_scan.find(html).map(|m| {
            let mut url = m.as_str().trim().to_string();
            if !url.ends_with('/') {
                url.push('/');
            }
            DataUrlMatch {
                url,
                strategy: DiscoveryStrategy::PathFragment,
            }
        })
    }

    fn attribute_value(&self, html: &str) -> Option<String> {
        let selector = Selector::parse(&self.attribute_selector).ok()?;
        let attr_name = self.attribute_selector.trim_start_matches('[').trim_end_matches(']');
        let document = Html::parse_document(html);
        let found = document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr_name))
            .map(str::trim)
            .find(|v| v.starts_with("http://") || v.starts_with("https://"))
            .map(ToString::to_string);
        found
    }
}
