// File: fetcher.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, info, warn};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::BrowserDriver;
use crate::classifier::{classify, should_retry, ErrorKind};
use crate::config::{Renderer, TrackedPage, WatchConfig};
use crate::errors::{FetchError, WatchError, WatchResult};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.retry_attempts(), config.retry_delay())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub content: String,
    pub attempts: u32,
}

/// Final outcome of a page whose every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub url: String,
    pub slug: String,
    pub platform: String,
    pub reason: String,
    pub kind: ErrorKind,
    pub attempts: u32,
}

impl From<&FetchFailure> for WatchError {
    fn from(failure: &FetchFailure) -> Self {
        WatchError::Fetch {
            kind: failure.kind,
            retryable: should_retry(failure.kind),
            message: failure.reason.clone(),
        }
    }
}

pub fn build_client(user_agent: &str, request_timeout: Duration) -> WatchResult<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(request_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| WatchError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

pub struct FetchEngine {
    client: Client,
    browser: Arc<dyn BrowserDriver>,
    browser_timeout: Duration,
    settle_delay: Duration,
    retry: RetryPolicy,
}

impl FetchEngine {
    pub fn new(config: &WatchConfig, browser: Arc<dyn BrowserDriver>) -> WatchResult<Self> {
        Ok(Self {
            client: build_client(config.user_agent(), config.fetch_timeout())?,
            browser,
            browser_timeout: config.browser_timeout(),
            settle_delay: config.settle_delay(),
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// One attempt, no retries.
    pub async fn fetch(&self, url: &str, renderer: Renderer) -> Result<String, FetchError> {
        Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        match renderer {
            Renderer::Static => self.fetch_static(url).await,
            Renderer::Browser => self.fetch_rendered(url).await,
        }
    }

    async fn fetch_static(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.text().await?)
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String, FetchError> {
        let navigation = self
            .browser
            .navigate(url, self.browser_timeout, self.settle_delay)
            .await?;
        if navigation.is_success() {
            return Ok(navigation.html);
        }
        match navigation.status {
            Some(status) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            None => Err(FetchError::NoResponse(url.to_string())),
        }
    }

    /// Fetches a page under the retry policy. Permanent failures stop after
    /// the first attempt.
    pub async fn fetch_with_retry(&self, page: &TrackedPage) -> Result<FetchedPage, FetchFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                "Fetching {} ({}) attempt {}/{}",
                page.slug, page.renderer, attempt, self.retry.attempts
            );

            let error = match self.fetch(&page.url, page.renderer).await {
                Ok(content) => {
                    info!("Fetched {} ({} bytes)", page.url, content.len());
                    return Ok(FetchedPage {
                        content,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            let kind = classify(&error);
            warn!(
                "Attempt {} for {} failed [{}]: {}",
                attempt, page.url, kind, error
            );

            if !should_retry(kind) || attempt >= self.retry.attempts {
                return Err(FetchFailure {
                    url: page.url.clone(),
                    slug: page.slug.clone(),
                    platform: page.platform.clone(),
                    reason: error.to_string(),
                    kind,
                    attempts: attempt,
                });
            }

            if !self.retry.delay.is_zero() {
                debug!("Waiting {:?} before retrying {}", self.retry.delay, page.url);
                tokio::time::sleep(self.retry.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Navigation;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBrowser {
        status: Option<u16>,
        calls: AtomicUsize,
    }

    impl FakeBrowser {
        fn new(status: Option<u16>) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl BrowserDriver for FakeBrowser {
        fn navigate<'a>(
            &'a self,
            _url: &'a str,
            _nav_timeout: Duration,
            _settle: Duration,
        ) -> BoxFuture<'a, Result<Navigation, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.status;
            Box::pin(async move {
                Ok(Navigation {
                    status,
                    html: "<html><body><p>Rendered.</p></body></html>".to_string(),
                })
            })
        }
    }

    fn engine(browser: Arc<FakeBrowser>) -> FetchEngine {
        FetchEngine::new(&WatchConfig::new(), browser)
            .unwrap()
            .with_retry(RetryPolicy::new(2, Duration::ZERO))
    }

    fn page(url: &str) -> TrackedPage {
        TrackedPage::new(url, "example", "Example", Renderer::Browser)
    }

    #[tokio::test]
    async fn test_rendered_success_returns_dom() {
        let browser = FakeBrowser::new(Some(200));
        let html = engine(browser.clone())
            .fetch("https://example.com/policy", Renderer::Browser)
            .await
            .unwrap();
        assert!(html.contains("Rendered."));
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rendered_error_page_is_failure() {
        let browser = FakeBrowser::new(Some(404));
        let failure = engine(browser.clone())
            .fetch_with_retry(&page("https://example.com/gone"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::BrokenLink);
        assert_eq!(failure.attempts, 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rendered_server_error_is_retried() {
        let browser = FakeBrowser::new(Some(502));
        let failure = engine(browser.clone())
            .fetch_with_retry(&page("https://example.com/flaky"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::ServerError);
        assert_eq!(failure.attempts, 2);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_delay_separates_attempts() {
        let browser = FakeBrowser::new(Some(503));
        let engine = FetchEngine::new(&WatchConfig::new(), browser.clone()).unwrap();
        assert_eq!(engine.retry_policy().delay, Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        let failure = engine
            .fetch_with_retry(&page("https://example.com/flaky"))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(failure.attempts, 2);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_secs(5), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "waited {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_does_not_wait() {
        let browser = FakeBrowser::new(Some(403));
        let engine = FetchEngine::new(&WatchConfig::new(), browser.clone()).unwrap();

        let start = tokio::time::Instant::now();
        let failure = engine
            .fetch_with_retry(&page("https://example.com/private"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::AccessDenied);
        assert_eq!(failure.attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_navigation_status_uses_every_attempt() {
        let browser = FakeBrowser::new(None);
        let failure = engine(browser.clone())
            .fetch_with_retry(&page("https://example.com/articles/404/blank"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Unknown);
        assert_eq!(failure.attempts, 2);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_navigation_status_is_failure() {
        let browser = FakeBrowser::new(None);
        let result = engine(browser)
            .fetch("https://example.com/blank", Renderer::Browser)
            .await;
        assert!(matches!(result, Err(FetchError::NoResponse(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_io() {
        let browser = FakeBrowser::new(Some(200));
        let result = engine(browser.clone())
            .fetch("not a url", Renderer::Browser)
            .await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retry_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
        let config = WatchConfig::new();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_failure_converts_to_watch_error() {
        let failure = FetchFailure {
            url: "https://example.com".to_string(),
            slug: "example".to_string(),
            platform: "Example".to_string(),
            reason: "HTTP status 403".to_string(),
            kind: ErrorKind::AccessDenied,
            attempts: 1,
        };
        match WatchError::from(&failure) {
            WatchError::Fetch { kind, retryable, .. } => {
                assert_eq!(kind, ErrorKind::AccessDenied);
                assert!(!retryable);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
