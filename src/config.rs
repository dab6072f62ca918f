// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{WatchError, WatchResult};

pub const DEFAULT_USER_AGENT: &str =
    "TrustAndSafety-Policy-Watcher/1.0 (https://github.com/policywatch/policywatch)";
pub const DEFAULT_HEALTH_USER_AGENT: &str = "TrustAndSafety-Policy-Watcher/1.0 Health Check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    #[default]
    #[serde(alias = "httpx")]
    Static,
    #[serde(alias = "playwright")]
    Browser,
}

impl std::fmt::Display for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Renderer::Static => write!(f, "static"),
            Renderer::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPage {
    pub url: String,
    pub slug: String,
    pub platform: String,
    #[serde(default)]
    pub renderer: Renderer,
}

impl TrackedPage {
    pub fn new(url: &str, slug: &str, platform: &str, renderer: Renderer) -> Self {
        Self {
            url: url.to_string(),
            slug: slug.to_string(),
            platform: platform.to_string(),
            renderer,
        }
    }
}

/// Loads and validates the tracked page list. Any problem here aborts the run.
pub fn load_tracked_pages(path: &Path) -> WatchResult<Vec<TrackedPage>> {
    if !path.is_file() {
        return Err(WatchError::Configuration(format!(
            "Configuration file not found at '{}'",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(path).map_err(|e| {
        WatchError::Configuration(format!("Could not read {}: {}", path.display(), e))
    })?;
    let pages: Vec<TrackedPage> = serde_json::from_str(&raw).map_err(|e| {
        WatchError::Configuration(format!(
            "Could not parse {}. Invalid JSON: {}",
            path.display(),
            e
        ))
    })?;

    validate_pages(&pages)?;
    if pages.is_empty() {
        warn!("The configuration file is empty. No pages to track.");
    }
    debug!("Loaded {} tracked pages from {}", pages.len(), path.display());
    Ok(pages)
}

pub fn validate_pages(pages: &[TrackedPage]) -> WatchResult<()> {
    let mut urls = HashSet::new();
    let mut slugs = HashSet::new();

    for (index, page) in pages.iter().enumerate() {
        if page.url.trim().is_empty() || page.slug.trim().is_empty() {
            return Err(WatchError::Configuration(format!(
                "Entry {} is missing a url or slug",
                index
            )));
        }
        if Url::parse(&page.url).is_err() {
            return Err(WatchError::Configuration(format!(
                "Entry '{}' has an invalid url: {}",
                page.slug, page.url
            )));
        }
        if page.slug.contains('/') || page.slug.contains("..") {
            return Err(WatchError::Configuration(format!(
                "Slug '{}' must not contain path separators",
                page.slug
            )));
        }
        if !urls.insert(page.url.as_str()) {
            return Err(WatchError::Configuration(format!(
                "Duplicate url: {}",
                page.url
            )));
        }
        if !slugs.insert(page.slug.as_str()) {
            return Err(WatchError::Configuration(format!(
                "Duplicate slug: {}",
                page.slug
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    user_agent: String,
    health_user_agent: String,
    fetch_timeout: Duration,
    browser_timeout: Duration,
    settle_delay: Duration,
    probe_timeout: Duration,
    browser_probe_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    workers: usize,
    slow_threshold_ms: u64,
    failure_threshold: u32,
    max_history_entries: usize,
    snapshot_history_depth: usize,
    get_fallback_hosts: Vec<String>,
    browser_probes: bool,
    chromium_binary: Option<PathBuf>,
    rules_file: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            health_user_agent: DEFAULT_HEALTH_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(30),
            browser_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(10),
            browser_probe_timeout: Duration::from_secs(15),
            retry_attempts: 2,
            retry_delay: Duration::from_secs(5),
            workers: 5,
            slow_threshold_ms: 2000,
            failure_threshold: 3,
            max_history_entries: 30,
            snapshot_history_depth: 10,
            get_fallback_hosts: vec![
                "www.tiktok.com".to_string(),
                "transparency.fb.com".to_string(),
                "www.whatnot.com".to_string(),
            ],
            browser_probes: true,
            chromium_binary: None,
            rules_file: None,
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, user_agent: &str) {
        self.user_agent = user_agent.to_string();
    }

    pub fn health_user_agent(&self) -> &str {
        &self.health_user_agent
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn set_fetch_timeout(&mut self, timeout: Duration) {
        self.fetch_timeout = timeout;
    }

    pub fn browser_timeout(&self) -> Duration {
        self.browser_timeout
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn set_probe_timeout(&mut self, timeout: Duration) {
        self.probe_timeout = timeout;
    }

    pub fn browser_probe_timeout(&self) -> Duration {
        self.browser_probe_timeout
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn set_retry_attempts(&mut self, attempts: u32) {
        self.retry_attempts = attempts.max(1);
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.retry_delay = delay;
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers.max(1);
    }

    pub fn slow_threshold_ms(&self) -> u64 {
        self.slow_threshold_ms
    }

    pub fn set_slow_threshold_ms(&mut self, threshold: u64) {
        self.slow_threshold_ms = threshold;
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn set_failure_threshold(&mut self, threshold: u32) {
        self.failure_threshold = threshold.max(1);
    }

    pub fn max_history_entries(&self) -> usize {
        self.max_history_entries
    }

    pub fn set_max_history_entries(&mut self, entries: usize) {
        self.max_history_entries = entries;
    }

    pub fn snapshot_history_depth(&self) -> usize {
        self.snapshot_history_depth
    }

    pub fn set_snapshot_history_depth(&mut self, depth: usize) {
        self.snapshot_history_depth = depth;
    }

    pub fn get_fallback_hosts(&self) -> &[String] {
        &self.get_fallback_hosts
    }

    pub fn set_get_fallback_hosts(&mut self, hosts: Vec<String>) {
        self.get_fallback_hosts = hosts;
    }

    pub fn browser_probes(&self) -> bool {
        self.browser_probes
    }

    pub fn set_browser_probes(&mut self, enabled: bool) {
        self.browser_probes = enabled;
    }

    pub fn chromium_binary(&self) -> Option<&Path> {
        self.chromium_binary.as_deref()
    }

    pub fn set_chromium_binary(&mut self, binary: Option<PathBuf>) {
        self.chromium_binary = binary;
    }

    pub fn rules_file(&self) -> Option<&Path> {
        self.rules_file.as_deref()
    }

    pub fn set_rules_file(&mut self, path: Option<PathBuf>) {
        self.rules_file = path;
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
