// File: probe.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use log::{debug, error, info, warn};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use std::error::Error as StdError;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::browser::BrowserDriver;
use crate::config::{Renderer, TrackedPage, WatchConfig};
use crate::errors::{WatchError, WatchResult};
use crate::health::{detect_alerts, Alert, CheckResult, HealthDatabase, SystemHealth, UrlCheck};

pub struct HealthProber {
    client: Client,
    browser: Arc<dyn BrowserDriver>,
    config: WatchConfig,
}

impl HealthProber {
    pub fn new(config: &WatchConfig, browser: Arc<dyn BrowserDriver>) -> WatchResult<Self> {
        let client = Client::builder()
            .user_agent(config.health_user_agent())
            .timeout(config.probe_timeout())
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| {
                WatchError::Configuration(format!("Failed to build probe client: {}", e))
            })?;
        Ok(Self {
            client,
            browser,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub async fn probe(&self, page: &TrackedPage) -> CheckResult {
        debug!("Checking {} ({})", page.slug, page.renderer);
        match page.renderer {
            Renderer::Static => self.probe_static(&page.url).await,
            Renderer::Browser => self.probe_browser(&page.url).await,
        }
    }

    fn wants_get_fallback(&self, url: &str) -> bool {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            Some(host) => host,
            None => return false,
        };
        self.config
            .get_fallback_hosts()
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&host))
    }

    async fn probe_static(&self, url: &str) -> CheckResult {
        let https = url.starts_with("https://");
        let slow = self.config.slow_threshold_ms();

        let mut start = Instant::now();
        let mut outcome = self.client.head(url).send().await;

        // Some hosts reject HEAD with a 4xx while serving GET fine. Only the
        // GET is timed then.
        let head_rejected = matches!(&outcome, Ok(r) if r.status().is_client_error());
        if head_rejected && self.wants_get_fallback(url) {
            debug!("HEAD {} returned a client error, retrying with GET", url);
            start = Instant::now();
            outcome = self.client.get(url).send().await;
        }
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => {
                let status: StatusCode = response.status();
                let up = status.is_success() || status.is_redirection();
                CheckResult::from_response(
                    status.as_u16(),
                    elapsed,
                    slow,
                    (https && up).then_some(true),
                )
            }
            Err(e) if e.is_timeout() => {
                warn!("Health probe of {} timed out", url);
                CheckResult::failure("Request timeout", None)
            }
            Err(e) => {
                let message = error_chain(&e);
                warn!("Health probe of {} failed: {}", url, message);
                CheckResult::failure(&message, ssl_verdict(https, &message))
            }
        }
    }

    async fn probe_browser(&self, url: &str) -> CheckResult {
        if !self.config.browser_probes() {
            let mut result =
                CheckResult::from_response(200, 0, self.config.slow_threshold_ms(), None);
            result.http_status = None;
            result.response_time_ms = None;
            result.error_message =
                Some("Browser health checks disabled - assumed healthy".to_string());
            return result;
        }

        let https = url.starts_with("https://");
        let start = Instant::now();
        let navigation = self
            .browser
            .navigate(url, self.config.browser_probe_timeout(), Duration::ZERO)
            .await;
        let elapsed = start.elapsed().as_millis() as u64;

        match navigation {
            Ok(nav) => match nav.status {
                Some(status) => {
                    let mut result = CheckResult::from_response(
                        status,
                        elapsed,
                        self.config.slow_threshold_ms(),
                        None,
                    );
                    if https && result.is_success() {
                        result.ssl_valid = Some(true);
                    }
                    result
                }
                None => CheckResult::failure("No navigation response received", None),
            },
            Err(e) => {
                let message = e.to_string();
                CheckResult::failure(&message, ssl_verdict(https, &message))
            }
        }
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn ssl_verdict(https: bool, message: &str) -> Option<bool> {
    if https && message.to_lowercase().contains("certificate") {
        Some(false)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct HealthRunSummary {
    pub checked: usize,
    pub system: SystemHealth,
    pub alerts: Vec<Alert>,
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(
            style
                .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
                    let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
                })
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
    }
    pb
}

/// Probes every page with bounded concurrency. Results are funnelled through
/// a channel so that `db` has exactly one writer.
pub async fn run_health_checks(
    prober: Arc<HealthProber>,
    pages: &[TrackedPage],
    db: &mut HealthDatabase,
    show_progress: bool,
) -> HealthRunSummary {
    let baseline = db.statuses();
    let workers = prober.config().workers();
    let threshold = prober.config().failure_threshold();
    let max_history = prober.config().max_history_entries();

    info!(
        "Running health checks for {} URLs with {} workers",
        pages.len(),
        workers
    );

    let (tx, mut rx) = mpsc::channel::<UrlCheck>(workers.max(1) * 2);
    let owned: Vec<TrackedPage> = pages.to_vec();
    let producer_prober = Arc::clone(&prober);

    let producer = tokio::spawn(async move {
        stream::iter(owned)
            .map(|page| {
                let prober = Arc::clone(&producer_prober);
                async move {
                    let task_page = page.clone();
                    let joined =
                        tokio::spawn(async move { prober.probe(&task_page).await }).await;
                    let result = joined.unwrap_or_else(|e| {
                        error!("Health probe task for {} failed: {}", page.url, e);
                        CheckResult::failure(&format!("Probe task failed: {}", e), None)
                    });
                    UrlCheck {
                        url: page.url,
                        slug: page.slug,
                        platform: page.platform,
                        result,
                    }
                }
            })
            .buffer_unordered(workers.max(1))
            .for_each(|check| {
                let tx = tx.clone();
                async move {
                    if tx.send(check).await.is_err() {
                        warn!("Health result channel closed early");
                    }
                }
            })
            .await;
    });

    let pb = progress_bar(pages.len() as u64, show_progress);
    let mut checked = 0;
    while let Some(check) = rx.recv().await {
        info!(
            "{}: {}{}",
            check.slug,
            check.result.status,
            check
                .result
                .http_status
                .map(|s| format!(" ({})", s))
                .unwrap_or_default()
        );
        db.update(check, threshold, max_history);
        checked += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let Err(e) = producer.await {
        error!("Health check producer failed: {}", e);
    }

    let system = db.refresh_system_health().clone();
    let alerts = detect_alerts(&baseline, db);
    info!(
        "Health summary: {}/{} up, {} failed, uptime {:.2}%",
        system.healthy_urls + system.degraded_urls,
        system.total_urls,
        system.failed_urls,
        system.system_uptime
    );

    HealthRunSummary {
        checked,
        system,
        alerts,
    }
}
