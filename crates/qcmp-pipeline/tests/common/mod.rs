#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use qcmp_fetch::{DocumentFetcher, FetchError, FetchedResponse, RequestProfile, StatusCode};
use qcmp_pipeline::EndpointProfile;

pub const BASE: &str = "https://data.test/";

pub fn fixture(rel: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(rel);
    std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

pub fn endpoints() -> EndpointProfile {
    EndpointProfile {
        base_url: BASE.to_string(),
        ..Default::default()
    }
}

pub fn search_url(id: &str) -> String {
    format!("{BASE}member/api/ac_snames/all/?term={id}&all-results=true")
}

pub fn detail_url(id: &str, k: i64) -> String {
    format!("{BASE}equity/{k}/{id}/{}/", id.to_lowercase())
}

pub fn data_url(k: i64) -> String {
    format!("{BASE}api/stock/get-fundamental_results/{k}/")
}

pub fn search_body(id: &str, label: &str, k: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!([{
        "id": id,
        "label": label,
        "value": id,
        "k": k,
        "slugname": id.to_lowercase(),
        "nexturl": ""
    }]))
    .unwrap()
}

pub fn detail_page(k: i64) -> Vec<u8> {
    format!(
        r#"<html><body><div class="fundamentals" data-tablesurl="{}"></div></body></html>"#,
        data_url(k)
    )
    .into_bytes()
}

pub fn quarters_payload(periods: &[(&str, f64, f64)]) -> Vec<u8> {
    let order = periods.iter().map(|(p, _, _)| *p).collect::<Vec<_>>();
    let mut group = serde_json::Map::new();
    for (period, revenue, net_profit) in periods {
        group.insert(
            period.to_string(),
            serde_json::json!({"TOTAL_SR_Q": revenue, "NP_Q": net_profit}),
        );
    }
    serde_json::to_vec(&serde_json::json!({
        "body": {"quarterlyOrder": order, "quarterlyDataDump": {"consolidated": group}}
    }))
    .unwrap()
}

#[derive(Debug, Clone)]
enum Canned {
    Body(Vec<u8>),
    Status(u16),
}

/// Serves canned documents by exact address and remembers every request.
#[derive(Debug, Default)]
pub struct CannedFetcher {
    routes: HashMap<String, Canned>,
    calls: Mutex<Vec<(String, RequestProfile)>>,
}

impl CannedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.into(), Canned::Body(body.into()));
        self
    }

    pub fn status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.routes.insert(url.into(), Canned::Status(status));
        self
    }

    /// Search hit, detail page and data payload for one entity.
    pub fn entity(self, id: &str, k: i64, payload: impl Into<Vec<u8>>) -> Self {
        self.body(search_url(id), search_body(id, &format!("{id} Ltd"), k))
            .body(detail_url(id, k), detail_page(k))
            .body(data_url(k), payload)
    }

    pub fn calls(&self) -> Vec<(String, RequestProfile)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentFetcher for CannedFetcher {
    async fn fetch(&self, url: &str, profile: &RequestProfile) -> Result<FetchedResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), profile.clone()));
        tokio::task::yield_now().await;

        match self.routes.get(url) {
            Some(Canned::Body(body)) => Ok(FetchedResponse {
                status: StatusCode::OK,
                final_url: url.to_string(),
                content_type: Some("application/json".to_string()),
                body: body.clone(),
            }),
            Some(Canned::Status(status)) => Err(FetchError::HttpStatus {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}
