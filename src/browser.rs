// File: browser.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use futures::future::BoxFuture;
use log::{debug, error, info};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::FetchError;

const CHROMIUM_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome"];
const RESPONSE_HEADERS_EVENT: &str = "HTTP_TRANSACTION_READ_RESPONSE_HEADERS";
const START_JOB_EVENT: &str = "URL_REQUEST_START_JOB";

/// Result of one browser navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// Status of the main document response, if one was observed.
    pub status: Option<u16>,
    pub html: String,
}

impl Navigation {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(status) if (200..300).contains(&status))
    }
}

pub trait BrowserDriver: Send + Sync {
    /// Loads `url` in a fresh, isolated browser instance and returns the
    /// rendered DOM after `settle` has elapsed. The instance is gone when
    /// the future resolves or is dropped.
    fn navigate<'a>(
        &'a self,
        url: &'a str,
        nav_timeout: Duration,
        settle: Duration,
    ) -> BoxFuture<'a, Result<Navigation, FetchError>>;
}

#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    candidates: Vec<PathBuf>,
}

impl Default for ChromiumDriver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ChromiumDriver {
    pub fn new(binary: Option<&Path>) -> Self {
        let candidates = match binary {
            Some(path) => vec![path.to_path_buf()],
            None => CHROMIUM_CANDIDATES.iter().map(PathBuf::from).collect(),
        };
        Self { candidates }
    }

    async fn run(
        &self,
        url: &str,
        nav_timeout: Duration,
        settle: Duration,
    ) -> Result<Navigation, FetchError> {
        let profile = TempDir::new()
            .map_err(|e| FetchError::Browser(format!("Failed to create profile dir: {}", e)))?;
        let netlog = profile.path().join("netlog.json");

        for binary in &self.candidates {
            debug!("Attempting to render {} with {}...", url, binary.display());

            let mut command = Command::new(binary);
            command
                .args(["--headless", "--disable-gpu", "--no-sandbox", "--hide-scrollbars"])
                .arg(format!("--user-data-dir={}", profile.path().display()))
                .arg(format!("--log-net-log={}", netlog.display()))
                .arg(format!("--virtual-time-budget={}", settle.as_millis()))
                .arg("--dump-dom")
                .arg(url)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let child = match command.spawn() {
                Ok(child) => child,
                Err(e) if e.kind() == IoErrorKind::NotFound => {
                    debug!("{} not found, trying next candidate", binary.display());
                    continue;
                }
                Err(e) => {
                    error!("Failed to execute {}: {}", binary.display(), e);
                    return Err(FetchError::Browser(e.to_string()));
                }
            };

            // Dropping the wait future on timeout drops the child, which kills it.
            let output = match timeout(nav_timeout + settle, child.wait_with_output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(FetchError::Browser(e.to_string())),
                Err(_) => {
                    error!("Timeout while rendering {} with {}", url, binary.display());
                    return Err(FetchError::Timeout(nav_timeout));
                }
            };

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(FetchError::Browser(
                    stderr.lines().last().unwrap_or("browser exited with an error").to_string(),
                ));
            }

            let status = match tokio::fs::read_to_string(&netlog).await {
                Ok(raw) => parse_netlog_status(&raw, url),
                Err(e) => {
                    debug!("No network log for {}: {}", url, e);
                    None
                }
            };
            info!(
                "Rendered {} with {} (status {:?})",
                url,
                binary.display(),
                status
            );

            return Ok(Navigation {
                status,
                html: String::from_utf8_lossy(&output.stdout).into_owned(),
            });
        }

        Err(FetchError::Browser(format!(
            "No Chromium binary found (tried {})",
            self.candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

impl BrowserDriver for ChromiumDriver {
    fn navigate<'a>(
        &'a self,
        url: &'a str,
        nav_timeout: Duration,
        settle: Duration,
    ) -> BoxFuture<'a, Result<Navigation, FetchError>> {
        Box::pin(self.run(url, nav_timeout, settle))
    }
}

#[derive(Deserialize)]
struct NetLog {
    constants: NetLogConstants,
    #[serde(default)]
    events: Vec<NetLogEvent>,
}

#[derive(Deserialize)]
struct NetLogConstants {
    #[serde(rename = "logEventTypes")]
    log_event_types: HashMap<String, u32>,
}

#[derive(Deserialize)]
struct NetLogEvent {
    #[serde(rename = "type")]
    event_type: u32,
    #[serde(default)]
    source: Option<NetLogSource>,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct NetLogSource {
    id: u64,
}

impl NetLogEvent {
    fn source_id(&self) -> Option<u64> {
        self.source.as_ref().map(|s| s.id)
    }

    fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a == b
        }
        _ => a == b,
    }
}

/// Extracts the status of the navigation to `url` from a Chromium net log.
/// Only the request that started the job for `url` is considered, so
/// background requests of the browser itself are ignored. Redirect hops
/// share the request's source and are skipped in favour of the final
/// response.
pub fn parse_netlog_status(raw: &str, url: &str) -> Option<u16> {
    let log = serde_json::from_str::<NetLog>(raw).or_else(|_| {
        // A log cut short by process exit lacks its closing brackets.
        let repaired = format!("{}]}}", raw.trim_end().trim_end_matches(','));
        serde_json::from_str(&repaired)
    })
    .ok()?;

    let start_job = *log.constants.log_event_types.get(START_JOB_EVENT)?;
    let headers = *log.constants.log_event_types.get(RESPONSE_HEADERS_EVENT)?;

    let source = log
        .events
        .iter()
        .filter(|event| event.event_type == start_job)
        .find(|event| event.param_str("url").is_some_and(|u| same_url(u, url)))
        .and_then(NetLogEvent::source_id)?;

    log.events
        .iter()
        .filter(|event| event.event_type == headers && event.source_id() == Some(source))
        .filter_map(|event| {
            let line = event.params.as_ref()?.get("headers")?.get(0)?.as_str()?;
            line.split_whitespace().nth(1)?.parse::<u16>().ok()
        })
        .find(|status| !(300..400).contains(status))
}
