//! Search-candidate selection policies.

use qcmp_core::{EntityReference, SearchCandidate};
use qcmp_extract::normalize_label;
use strsim::jaro_winkler;

/// Picks the candidate a search result should resolve to. `None` means no
/// acceptable candidate, which the resolver reports as not found.
pub trait CandidateSelector: Send + Sync {
    fn select<'a>(
        &self,
        entity: &EntityReference,
        candidates: &'a [SearchCandidate],
    ) -> Option<&'a SearchCandidate>;
}

/// The search index's own ranking: first result wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCandidate;

impl CandidateSelector for FirstCandidate {
    fn select<'a>(
        &self,
        _entity: &EntityReference,
        candidates: &'a [SearchCandidate],
    ) -> Option<&'a SearchCandidate> {
        candidates.first()
    }
}

/// Requires the candidate id to equal the entity's short identifier, or the
/// normalized labels to be equal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactLabelMatch;

impl CandidateSelector for ExactLabelMatch {
    fn select<'a>(
        &self,
        entity: &EntityReference,
        candidates: &'a [SearchCandidate],
    ) -> Option<&'a SearchCandidate> {
        let wanted_label = normalize_label(&entity.long_label);
        candidates.iter().find(|c| {
            c.candidate_id.eq_ignore_ascii_case(entity.display_id.trim())
                || (!wanted_label.is_empty() && normalize_label(&c.raw_label) == wanted_label)
        })
    }
}

/// Best Jaro-Winkler similarity between the entity's long label and the
/// candidate label, at or above `min_score`. Earlier candidates win ties.
#[derive(Debug, Clone, Copy)]
pub struct SimilarLabel {
    pub min_score: f64,
}

impl Default for SimilarLabel {
    fn default() -> Self {
        Self { min_score: 0.85 }
    }
}

impl CandidateSelector for SimilarLabel {
    fn select<'a>(
        &self,
        entity: &EntityReference,
        candidates: &'a [SearchCandidate],
    ) -> Option<&'a SearchCandidate> {
        let wanted = entity.long_label.trim().to_lowercase();
        if wanted.is_empty() {
            return ExactLabelMatch.select(entity, candidates);
        }

        let mut best: Option<(&SearchCandidate, f64)> = None;
        for candidate in candidates {
            let score = jaro_winkler(&wanted, &candidate.raw_label.trim().to_lowercase());
            if score >= self.min_score && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best.map(|(candidate, _)| candidate)
    }
}
