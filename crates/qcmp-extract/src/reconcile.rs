//! Picks the authoritative metric group among reporting bases and matches
//! period labels against inconsistently spelled keys.

use qcmp_core::PeriodSequence;
use serde_json::{Map, Value as JsonValue};

/// Lower-cases and drops everything that is not an ASCII letter or digit.
pub fn normalize_label(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// Empty labels would "contain" each other trivially.
fn labels_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a == b || a.contains(b) || b.contains(a))
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupChoice<'a> {
    pub name: &'a str,
    pub group: &'a Map<String, JsonValue>,
    pub score: usize,
}

/// Number of expected periods matched by a distinct key of `group`.
fn score_group(group: &Map<String, JsonValue>, targets: &[String]) -> usize {
    let keys = group.keys().map(|k| normalize_label(k)).collect::<Vec<_>>();
    let mut used = vec![false; keys.len()];
    let mut score = 0;
    for target in targets {
        let hit = keys
            .iter()
            .enumerate()
            .position(|(i, key)| !used[i] && labels_match(key, target));
        if let Some(i) = hit {
            used[i] = true;
            score += 1;
        }
    }
    score
}

/// Scores every object-valued candidate, in document order.
pub fn rank_groups<'a>(
    groups: &'a Map<String, JsonValue>,
    expected: &PeriodSequence,
) -> Vec<GroupChoice<'a>> {
    let targets = expected.iter().map(normalize_label).collect::<Vec<_>>();
    groups
        .iter()
        .filter_map(|(name, value)| {
            let group = value.as_object()?;
            Some(GroupChoice {
                name: name.as_str(),
                group,
                score: score_group(group, &targets),
            })
        })
        .collect()
}

/// Highest-scoring candidate; the first one wins ties. `None` when nothing
/// scores above zero.
pub fn select_best_group<'a>(
    groups: &'a Map<String, JsonValue>,
    expected: &PeriodSequence,
) -> Option<GroupChoice<'a>> {
    let mut best: Option<GroupChoice<'a>> = None;
    for choice in rank_groups(groups, expected) {
        let current = best.as_ref().map_or(0, |b| b.score);
        if choice.score > current {
            best = Some(choice);
        }
    }
    best
}

/// Finds the key of `group` standing for `wanted`: normalized equality first,
/// then normalized containment either way. First hit in document order.
/// Keys whose value is not an object are never period entries.
pub fn find_period_key<'a>(group: &'a Map<String, JsonValue>, wanted: &str) -> Option<&'a str> {
    let wanted = normalize_label(wanted);
    if wanted.is_empty() {
        return None;
    }
    let entries = || group.iter().filter(|(_, v)| v.is_object()).map(|(k, _)| k);
    entries()
        .find(|k| normalize_label(k) == wanted)
        .or_else(|| entries().find(|k| labels_match(&normalize_label(k), &wanted)))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().expect("object")
    }

    fn seq(labels: &[&str]) -> PeriodSequence {
        PeriodSequence::new(labels.iter().copied())
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_label("Q1 FY-24"), "q1fy24");
        assert_eq!(normalize_label("Sep '24"), "sep24");
        assert_eq!(normalize_label("—"), "");
    }

    #[test]
    fn best_group_has_most_period_overlap() {
        let groups = map(json!({
            "standalone": {"Q1 FY25": {}, "Q4FY24": {}},
            "consolidated": {"Q1FY25": {}, "Q4 FY24": {}, "q3-fy24": {}},
            "meta": "not a group",
        }));
        let choice = select_best_group(&groups, &seq(&["Q1 FY25", "Q4 FY24", "Q3 FY24", "Q2 FY24"]))
            .expect("a group matches");
        assert_eq!(choice.name, "consolidated");
        assert_eq!(choice.score, 3);
    }

    #[test]
    fn ties_go_to_the_first_group_seen() {
        let groups = map(json!({
            "standalone": {"Q1": {}},
            "consolidated": {"Q1": {}},
        }));
        let choice = select_best_group(&groups, &seq(&["Q1"])).expect("match");
        assert_eq!(choice.name, "standalone");
    }

    #[test]
    fn selection_is_deterministic() {
        let groups = map(json!({
            "a": {"Q1": {}, "Q2": {}},
            "b": {"Q2": {}, "Q3": {}},
            "c": {"Q1": {}, "Q3": {}},
        }));
        let periods = seq(&["Q1", "Q2", "Q3"]);
        let first = select_best_group(&groups, &periods).map(|c| c.name);
        for _ in 0..10 {
            assert_eq!(select_best_group(&groups, &periods).map(|c| c.name), first);
        }
    }

    #[test]
    fn no_group_when_empty_or_all_zero() {
        assert!(select_best_group(&Map::new(), &seq(&["Q1"])).is_none());

        let groups = map(json!({"standalone": {"FY23": {}}, "consolidated": {}}));
        assert!(select_best_group(&groups, &seq(&["Q1", "Q2"])).is_none());
        assert!(select_best_group(&groups, &seq(&[])).is_none());
    }

    #[test]
    fn zero_score_group_never_beats_a_positive_one() {
        let groups = map(json!({
            "empty": {},
            "unrelated": {"FY23": {}},
            "partial": {"Q2": {}},
        }));
        let choice = select_best_group(&groups, &seq(&["Q1", "Q2"])).expect("partial matches");
        assert_eq!(choice.name, "partial");
        assert!(choice.score > 0);
    }

    #[test]
    fn one_key_counts_for_one_period_only() {
        // "q1fy24q2fy24" contains both targets but is a single key.
        let groups = map(json!({"odd": {"Q1FY24Q2FY24": {}}}));
        let choice = select_best_group(&groups, &seq(&["Q1 FY24", "Q2 FY24"])).expect("match");
        assert_eq!(choice.score, 1);
    }

    #[test]
    fn rank_reports_every_object_candidate() {
        let groups = map(json!({"a": {"Q1": {}}, "b": 3, "c": {}}));
        let ranked = rank_groups(&groups, &seq(&["Q1"]));
        let names = ranked.iter().map(|c| (c.name, c.score)).collect::<Vec<_>>();
        assert_eq!(names, vec![("a", 1), ("c", 0)]);
    }

    #[test]
    fn period_key_exact_after_normalization() {
        let group = map(json!({"Q4FY23": {}, "Q1FY24": {}}));
        assert_eq!(find_period_key(&group, "Q1 FY24"), Some("Q1FY24"));
    }

    #[test]
    fn period_key_prefers_exact_over_containment() {
        let group = map(json!({"Q1FY24 (restated)": {}, "q1-fy24": {}}));
        assert_eq!(find_period_key(&group, "Q1 FY24"), Some("q1-fy24"));
    }

    #[test]
    fn period_key_falls_back_to_containment() {
        let group = map(json!({"Mar 2024": {}, "Dec 2023": {}}));
        assert_eq!(find_period_key(&group, "Mar 2024 Q4"), Some("Mar 2024"));
        assert_eq!(find_period_key(&group, "2023"), Some("Dec 2023"));
        assert_eq!(find_period_key(&group, "Jun 2024"), None);
        assert_eq!(find_period_key(&group, ""), None);
    }

    #[test]
    fn period_key_skips_non_object_entries() {
        let group = map(json!({"Q1 FY24": null, "q1fy24": 7, "Q1 FY24 (restated)": {}}));
        assert_eq!(find_period_key(&group, "Q1 FY24"), Some("Q1 FY24 (restated)"));
        assert_eq!(find_period_key(&map(json!({"Q2": "n/a"})), "Q2"), None);
    }
}
