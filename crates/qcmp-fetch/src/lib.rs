//! HTTP document fetching for quarter-compare: request profiles, a shared
//! cookie-aware client and the `DocumentFetcher` seam used by the resolver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, REFERER};
pub use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "qcmp-fetch";

pub const DEFAULT_USER_AGENT: &str = "qcmp-client/0.1";

/// Status codes worth another attempt: server faults and throttling.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

pub fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Opt-in transport retries. The default never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub first_pause: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_attempts(0)
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: usize) -> Self {
        Self {
            attempts,
            first_pause: Duration::from_millis(250),
            ceiling: Duration::from_secs(5),
        }
    }

    /// Pause before the zero-based `retry`: doubles from `first_pause`, never
    /// above `ceiling`.
    pub fn pause_before(&self, retry: usize) -> Duration {
        let mut pause = self.first_pause;
        for _ in 0..retry {
            if pause >= self.ceiling {
                break;
            }
            pause = pause.saturating_mul(2);
        }
        pause.min(self.ceiling)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 32,
            retry: RetryPolicy::default(),
        }
    }
}

/// Header profile attached to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestProfile {
    pub accept: Option<String>,
    pub referer: Option<String>,
    pub xhr: bool,
}

impl RequestProfile {
    /// Autocomplete-style search calls made from the site root.
    pub fn search(site_root: impl Into<String>) -> Self {
        Self {
            accept: Some("*/*".to_string()),
            referer: Some(site_root.into()),
            xhr: true,
        }
    }

    /// Plain page navigation.
    pub fn page() -> Self {
        Self::default()
    }

    /// Data endpoint requested from within a detail page.
    pub fn data(page_url: impl Into<String>) -> Self {
        Self {
            accept: Some("*/*".to_string()),
            referer: Some(page_url.into()),
            xhr: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Anything that can turn an address into raw bytes. The resolver only talks
/// to this trait, so tests can serve canned documents.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, profile: &RequestProfile) -> Result<FetchedResponse, FetchError>;
}

#[async_trait]
impl<T: DocumentFetcher + ?Sized> DocumentFetcher for Arc<T> {
    async fn fetch(&self, url: &str, profile: &RequestProfile) -> Result<FetchedResponse, FetchError> {
        (**self).fetch(url, profile).await
    }
}

/// Shared reqwest client with a cookie store. Safe to use from many tasks at once.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            retry: config.retry,
        })
    }

    fn request(&self, url: &str, profile: &RequestProfile) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(accept) = &profile.accept {
            req = req.header(ACCEPT, accept);
        }
        if let Some(referer) = &profile.referer {
            req = req.header(REFERER, referer);
        }
        if profile.xhr {
            req = req.header("x-requested-with", "XMLHttpRequest");
        }
        req
    }

    async fn fetch_with_retries(
        &self,
        url: &str,
        profile: &RequestProfile,
    ) -> Result<FetchedResponse, FetchError> {
        let _permit = self.global_limit.acquire().await.expect("semaphore not closed");

        let mut retries = 0;
        loop {
            let outcome = self.request(url, profile).send().await;
            let transient = match &outcome {
                Ok(resp) => !resp.status().is_success() && is_transient_status(resp.status()),
                Err(err) => is_transient_error(err),
            };
            if transient && retries < self.retry.attempts {
                let pause = self.retry.pause_before(retries);
                debug!(retries, pause_ms = pause.as_millis() as u64, "transient failure, retrying");
                tokio::time::sleep(pause).await;
                retries += 1;
                continue;
            }

            let resp = outcome?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let body = resp.bytes().await?.to_vec();
            debug!(status = status.as_u16(), len = body.len(), "fetched");
            return Ok(FetchedResponse {
                status,
                final_url,
                content_type,
                body,
            });
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, profile: &RequestProfile) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url, xhr = profile.xhr);
        self.fetch_with_retries(url, profile).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn retries_are_off_unless_configured() {
        assert_eq!(RetryPolicy::default().attempts, 0);
        assert_eq!(HttpClientConfig::default().retry, RetryPolicy::default());
    }

    #[test]
    fn pauses_double_until_the_ceiling() {
        let policy = RetryPolicy {
            attempts: 4,
            first_pause: Duration::from_millis(40),
            ceiling: Duration::from_millis(100),
        };
        let pauses = (0..5).map(|r| policy.pause_before(r).as_millis()).collect::<Vec<_>>();
        assert_eq!(pauses, vec![40, 80, 100, 100, 100]);
        assert_eq!(policy.pause_before(usize::MAX), Duration::from_millis(100));
    }

    #[test]
    fn only_server_faults_and_throttling_are_transient() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn data_profile_sends_referer_and_xhr_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fundamentals/"))
            .and(header("referer", "https://example.test/equity/1/ACME/acme/"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"body":{}}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("client");
        let resp = fetcher
            .fetch(
                &format!("{}/fundamentals/", server.uri()),
                &RequestProfile::data("https://example.test/equity/1/ACME/acme/"),
            )
            .await
            .expect("fetch");

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
        assert_eq!(resp.text_lossy(), r#"{"body":{}}"#);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig::default()).expect("client");
        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()), &RequestProfile::page())
            .await
            .expect_err("404 must fail");

        match err {
            FetchError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn retryable_status_is_retried_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(HttpClientConfig {
            retry: RetryPolicy {
                attempts: 2,
                first_pause: Duration::from_millis(1),
                ceiling: Duration::from_millis(5),
            },
            ..Default::default()
        })
        .expect("client");
        let resp = fetcher
            .fetch(&format!("{}/flaky", server.uri()), &RequestProfile::page())
            .await
            .expect("second attempt succeeds");
        assert_eq!(resp.text_lossy(), "ok");
    }
}
