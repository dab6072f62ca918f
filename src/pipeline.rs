// File: pipeline.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::classifier::ErrorKind;
use crate::config::TrackedPage;
use crate::detector::{ChangeDetector, Significance};
use crate::fetcher::{FetchEngine, FetchFailure};
use crate::normalizer::Normalizer;
use crate::runstats::RunStats;
use crate::snapshot::{write_atomic, SnapshotStore};

pub const CHANGES_FILE: &str = "changes.json";
pub const FAILURE_LOG_FILE: &str = "failures.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub slug: String,
    pub url: String,
    pub platform: String,
    pub is_new_page: bool,
    pub significance: Significance,
    pub reason: String,
    pub old_canonical: String,
    pub new_canonical: String,
    pub content_hash: String,
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        page: &TrackedPage,
        is_new_page: bool,
        (significance, reason): (Significance, String),
        old_canonical: String,
        new_canonical: String,
    ) -> Self {
        Self {
            slug: page.slug.clone(),
            url: page.url.clone(),
            platform: page.platform.clone(),
            is_new_page,
            significance,
            reason,
            content_hash: content_hash(&new_canonical),
            old_canonical,
            new_canonical,
            detected_at: Utc::now(),
        }
    }

    pub fn is_reportable(&self) -> bool {
        self.significance == Significance::Substantive
    }
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub changes: Vec<ChangeEvent>,
    pub failures: Vec<FetchFailure>,
}

impl RunReport {
    /// Writes the change feed and the failure log into `dir`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        write_change_feed(&dir.join(CHANGES_FILE), &self.changes)?;
        write_failure_log(&dir.join(FAILURE_LOG_FILE), &self.failures)
    }
}

pub struct Pipeline {
    engine: FetchEngine,
    normalizer: Arc<Normalizer>,
    detector: ChangeDetector,
    store: SnapshotStore,
}

impl Pipeline {
    pub fn new(
        engine: FetchEngine,
        normalizer: Arc<Normalizer>,
        detector: ChangeDetector,
        store: SnapshotStore,
    ) -> Self {
        Self {
            engine,
            normalizer,
            detector,
            store,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Fetches, normalizes and compares one page. The snapshot is only
    /// replaced when the detector sees any change at all.
    pub async fn process_page(&self, page: &TrackedPage) -> Result<ChangeEvent, FetchFailure> {
        let fetched = self.engine.fetch_with_retry(page).await?;
        let attempts_used = fetched.attempts;
        let raw = fetched.content;

        let previous = self.store.get(&page.slug).map_err(|e| {
            storage_failure(page, attempts_used, format!("Snapshot read error: {:#}", e))
        })?;
        let is_new_page = previous.is_none();
        let old_canonical = previous.map(|s| s.canonical_text).unwrap_or_default();
        let new_canonical = self.normalizer.normalize(&raw, &page.slug);

        let verdict = self
            .detector
            .evaluate(&old_canonical, &new_canonical, is_new_page);
        debug!("{}: {} ({})", page.slug, verdict.0, verdict.1);

        if verdict.0 != Significance::None {
            self.store
                .put(&page.slug, &raw, &new_canonical)
                .map_err(|e| {
                    storage_failure(page, attempts_used, format!("File write error: {:#}", e))
                })?;
        }

        Ok(ChangeEvent::new(
            page,
            is_new_page,
            verdict,
            old_canonical,
            new_canonical,
        ))
    }

    /// Processes every page in order. A failing page never stops the run.
    pub async fn run(&self, pages: &[TrackedPage]) -> RunReport {
        let mut stats = RunStats::new();
        let mut changes = Vec::new();
        let mut failures = Vec::new();

        for page in pages {
            info!("Processing '{}' ({}, {})", page.slug, page.url, page.renderer);
            stats.add_checked();

            match self.process_page(page).await {
                Ok(event) => match event.significance {
                    Significance::Substantive => {
                        if event.is_new_page {
                            stats.add_new_page();
                            info!("NEW: saved initial snapshot for {}", page.slug);
                        } else {
                            info!("CHANGED: {} ({})", page.slug, event.reason);
                        }
                        stats.add_change();
                        changes.push(event);
                    }
                    Significance::Cosmetic => {
                        stats.add_cosmetic();
                        info!("COSMETIC: {} updated silently ({})", page.slug, event.reason);
                    }
                    Significance::None => {
                        info!("NO CHANGE: content for '{}' is unchanged", page.slug);
                    }
                },
                Err(failure) => {
                    error!(
                        "FAILED: {} after {} attempt(s) [{}]: {}",
                        page.slug, failure.attempts, failure.kind, failure.reason
                    );
                    stats.add_failure();
                    failures.push(failure);
                }
            }
        }

        stats.finish();
        info!("{}", stats.summary());
        RunReport {
            stats,
            changes,
            failures,
        }
    }
}

fn storage_failure(page: &TrackedPage, attempts: u32, reason: String) -> FetchFailure {
    FetchFailure {
        url: page.url.clone(),
        slug: page.slug.clone(),
        platform: page.platform.clone(),
        reason,
        kind: ErrorKind::Unknown,
        attempts,
    }
}

/// Replaces the change feed with this run's reportable events.
pub fn write_change_feed(path: &Path, changes: &[ChangeEvent]) -> Result<()> {
    let reportable = changes
        .iter()
        .filter(|event| event.is_reportable())
        .collect::<Vec<_>>();
    let json =
        serde_json::to_string_pretty(&reportable).context("Failed to serialize change feed")?;
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("Failed to write change feed {}", path.display()))?;
    debug!("Wrote {} change events to {}", reportable.len(), path.display());
    Ok(())
}

/// One JSON object per line. A clean run removes any stale log.
pub fn write_failure_log(path: &Path, failures: &[FetchFailure]) -> Result<()> {
    if failures.is_empty() {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale {}", path.display()))?;
            debug!("Removed stale failure log {}", path.display());
        }
        return Ok(());
    }

    let mut lines = String::new();
    for failure in failures {
        lines.push_str(&serde_json::to_string(failure).context("Failed to serialize failure")?);
        lines.push('\n');
    }
    write_atomic(path, lines.as_bytes())
        .with_context(|| format!("Failed to write failure log {}", path.display()))?;
    warn!(
        "Fetch completed with {} failures, details in {}",
        failures.len(),
        path.display()
    );
    Ok(())
}

pub fn read_failure_log(path: &Path) -> Result<Vec<FetchFailure>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("Invalid failure log entry"))
        .collect()
}
