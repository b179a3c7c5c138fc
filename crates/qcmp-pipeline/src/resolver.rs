//! Per-entity resolution: search, candidate selection, data endpoint
//! discovery, payload retrieval and reconciliation.

use std::sync::Arc;

use anyhow::Context;
use qcmp_core::{CompanyResult, EntityReference, SearchCandidate};
use qcmp_extract::{
    decode_payload, decode_search_candidates, parse_fundamentals, DataUrlLocator, DiagnosticsSink,
    TracingDiagnostics,
};
use qcmp_fetch::{DocumentFetcher, RequestProfile};
use tracing::{debug, info, info_span, Instrument};

use crate::select::{CandidateSelector, FirstCandidate};
use crate::{EndpointProfile, ResolveError};

pub struct FundamentalsResolver<F> {
    fetcher: F,
    endpoints: EndpointProfile,
    locator: DataUrlLocator,
    selector: Box<dyn CandidateSelector>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl<F: DocumentFetcher> FundamentalsResolver<F> {
    pub fn new(fetcher: F, endpoints: EndpointProfile) -> anyhow::Result<Self> {
        let locator = DataUrlLocator::new(&endpoints.data_attribute, &endpoints.data_path_fragment)
            .context("building data endpoint locator")?;
        Ok(Self {
            fetcher,
            endpoints,
            locator,
            selector: Box::new(FirstCandidate),
            diagnostics: Arc::new(TracingDiagnostics),
        })
    }

    pub fn with_selector(mut self, selector: impl CandidateSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn endpoints(&self) -> &EndpointProfile {
        &self.endpoints
    }

    /// Search index lookup by short identifier, in index order.
    pub async fn search(&self, entity: &EntityReference) -> Result<Vec<SearchCandidate>, ResolveError> {
        let url = self.endpoints.search_url(&entity.display_id)?;
        let referer = self.endpoints.site_root()?;
        let response = self
            .fetcher
            .fetch(url.as_str(), &RequestProfile::search(referer.as_str()))
            .await?;
        Ok(decode_search_candidates(&response.body)?)
    }

    pub async fn resolve(&self, entity: &EntityReference) -> Result<CompanyResult, ResolveError> {
        let span = info_span!("resolve", entity = %entity.display_id);
        self.resolve_stages(entity).instrument(span).await
    }

    async fn resolve_stages(&self, entity: &EntityReference) -> Result<CompanyResult, ResolveError> {
        let id = entity.display_id.as_str();

        let candidates = self.search(entity).await?;
        if candidates.is_empty() {
            return Err(ResolveError::NotFound(format!("search returned no candidates for {id}")));
        }
        let candidate = self.selector.select(entity, &candidates).ok_or_else(|| {
            ResolveError::NotFound(format!(
                "none of {} candidates accepted for {id}",
                candidates.len()
            ))
        })?;
        let detail_url = self.endpoints.detail_url(candidate)?;
        debug!(candidate = %candidate.candidate_id, detail_url = %detail_url, "candidate selected");

        let page = self
            .fetcher
            .fetch(detail_url.as_str(), &RequestProfile::page())
            .await?;
        let found = self.locator.locate(&page.text_lossy()).ok_or_else(|| {
            ResolveError::NotFound(format!("no data endpoint on {detail_url}"))
        })?;
        debug!(data_url = %found.url, strategy = ?found.strategy, "data endpoint located");

        let data = self
            .fetcher
            .fetch(&found.url, &RequestProfile::data(detail_url.as_str()))
            .await?;
        let document = decode_payload(id, &data.body, self.diagnostics.as_ref())?;
        let result = parse_fundamentals(
            entity,
            &document,
            &self.endpoints.schema,
            self.diagnostics.as_ref(),
        );
        info!(periods = result.resolved_periods(), "entity resolved");
        Ok(result)
    }
}
