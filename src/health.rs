// File: health.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::snapshot::write_atomic;

pub const HEALTH_DB_FILE: &str = "url_health.json";
pub const ALERTS_FILE: &str = "health_alerts.json";
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;
pub const URL_FAILURE_ALERT: &str = "url_failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Failed => write!(f, "failed"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub http_status: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub ssl_valid: Option<bool>,
}

impl CheckResult {
    /// Classifies a response that arrived. 2xx and 3xx are up; anything
    /// slower than `slow_threshold_ms` is degraded.
    pub fn from_response(
        http_status: u16,
        response_time_ms: u64,
        slow_threshold_ms: u64,
        ssl_valid: Option<bool>,
    ) -> Self {
        let status = if (200..400).contains(&http_status) {
            if response_time_ms <= slow_threshold_ms {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            }
        } else {
            HealthStatus::Failed
        };

        Self {
            timestamp: Utc::now(),
            status,
            http_status: Some(http_status),
            response_time_ms: Some(response_time_ms),
            error_message: if status == HealthStatus::Failed {
                Some(format!("HTTP {}", http_status))
            } else {
                None
            },
            ssl_valid,
        }
    }

    pub fn failure(message: &str, ssl_valid: Option<bool>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: HealthStatus::Failed,
            http_status: None,
            response_time_ms: None,
            error_message: Some(truncate_message(message)),
            ssl_valid,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_up()
    }
}

pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

/// A probe result together with the page it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlCheck {
    pub url: String,
    pub slug: String,
    pub platform: String,
    pub result: CheckResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub slug: String,
    pub platform: String,
    pub url: String,
    pub current_status: HealthStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub success_count: u64,
    #[serde(default, alias = "health_history")]
    pub history: Vec<CheckResult>,
}

impl HealthRecord {
    pub fn new(slug: &str, platform: &str, url: &str) -> Self {
        Self {
            slug: slug.to_string(),
            platform: platform.to_string(),
            url: url.to_string(),
            current_status: HealthStatus::Unknown,
            last_success: None,
            last_failure: None,
            consecutive_failures: 0,
            total_checks: 0,
            success_count: 0,
            history: Vec::new(),
        }
    }

    /// Folds one check into the record. A failing check only flips the
    /// record to `failed` once `failure_threshold` failures are consecutive;
    /// below that the record is `degraded`.
    pub fn apply(&mut self, result: CheckResult, failure_threshold: u32, max_history: usize) {
        self.total_checks += 1;

        if result.is_success() {
            self.success_count += 1;
            self.last_success = Some(result.timestamp);
            self.consecutive_failures = 0;
            self.current_status = result.status;
        } else {
            self.last_failure = Some(result.timestamp);
            self.consecutive_failures += 1;
            self.current_status = if self.consecutive_failures >= failure_threshold.max(1) {
                HealthStatus::Failed
            } else {
                HealthStatus::Degraded
            };
        }

        self.history.insert(0, result);
        self.history.truncate(max_history);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_checks as f64 * 100.0
    }

    pub fn latest(&self) -> Option<&CheckResult> {
        self.history.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub total_urls: usize,
    pub healthy_urls: usize,
    pub degraded_urls: usize,
    pub failed_urls: usize,
    pub unknown_urls: usize,
    pub system_uptime: f64,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDatabase {
    #[serde(default)]
    pub urls: BTreeMap<String, HealthRecord>,
    #[serde(default)]
    pub system_health: Option<SystemHealth>,
}

impl HealthDatabase {
    /// Reads the database without touching the file. A missing file is an
    /// empty database; a corrupt one is an error.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No health database at {}, starting fresh", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let db: HealthDatabase = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupted health database {}", path.display()))?;
        debug!("Loaded {} health records from {}", db.urls.len(), path.display());
        Ok(db)
    }

    /// Loads the database for a health run. A corrupt file is removed and
    /// the database is rebuilt from scratch.
    pub fn load(path: &Path) -> Self {
        match Self::read(path) {
            Ok(db) => db,
            Err(e) => {
                warn!("{:#}, recreating", e);
                if let Err(e) = fs::remove_file(path) {
                    warn!("Could not remove corrupted database: {}", e);
                }
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize health database")?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write health database {}", path.display()))
    }

    pub fn update(&mut self, check: UrlCheck, failure_threshold: u32, max_history: usize) {
        let record = self
            .urls
            .entry(check.url.clone())
            .or_insert_with(|| HealthRecord::new(&check.slug, &check.platform, &check.url));
        record.slug = check.slug;
        record.platform = check.platform;
        record.apply(check.result, failure_threshold, max_history);
        debug!(
            "{} is now {} ({} consecutive failures)",
            record.url, record.current_status, record.consecutive_failures
        );
    }

    /// Status of every record, used as the baseline for alert detection.
    pub fn statuses(&self) -> HashMap<String, HealthStatus> {
        self.urls
            .iter()
            .map(|(url, record)| (url.clone(), record.current_status))
            .collect()
    }

    pub fn calculate_system_health(&self) -> SystemHealth {
        let count = |status: HealthStatus| {
            self.urls
                .values()
                .filter(|record| record.current_status == status)
                .count()
        };
        let total_urls = self.urls.len();
        let healthy_urls = count(HealthStatus::Healthy);
        let degraded_urls = count(HealthStatus::Degraded);
        let failed_urls = count(HealthStatus::Failed);

        let uptime = if total_urls > 0 {
            (healthy_urls + degraded_urls) as f64 / total_urls as f64 * 100.0
        } else {
            0.0
        };

        SystemHealth {
            total_urls,
            healthy_urls,
            degraded_urls,
            failed_urls,
            unknown_urls: total_urls - healthy_urls - degraded_urls - failed_urls,
            system_uptime: (uptime * 100.0).round() / 100.0,
            last_check: Utc::now(),
        }
    }

    pub fn refresh_system_health(&mut self) -> &SystemHealth {
        self.system_health.insert(self.calculate_system_health())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub url: String,
    pub slug: String,
    pub platform: String,
    pub previous_status: HealthStatus,
    pub current_status: HealthStatus,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One alert per URL that is `failed` now and was not `failed` at the start
/// of the run (including URLs with no prior record).
pub fn detect_alerts(
    previous: &HashMap<String, HealthStatus>,
    current: &HealthDatabase,
) -> Vec<Alert> {
    current
        .urls
        .iter()
        .filter(|(_, record)| record.current_status == HealthStatus::Failed)
        .filter_map(|(url, record)| {
            let previous_status = previous.get(url).copied().unwrap_or(HealthStatus::Unknown);
            if previous_status == HealthStatus::Failed {
                return None;
            }
            Some(Alert {
                alert_type: URL_FAILURE_ALERT.to_string(),
                url: url.clone(),
                slug: record.slug.clone(),
                platform: record.platform.clone(),
                previous_status,
                current_status: record.current_status,
                error_message: record.latest().and_then(|r| r.error_message.clone()),
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// Replaces the alert file. An empty list clears previous alerts.
pub fn save_alerts(path: &Path, alerts: &[Alert]) -> Result<()> {
    let json = serde_json::to_string_pretty(alerts).context("Failed to serialize alerts")?;
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("Failed to write alerts {}", path.display()))?;
    if alerts.is_empty() {
        info!("Cleared health alerts file (no active alerts)");
    } else {
        info!("Saved {} active health alerts to {}", alerts.len(), path.display());
    }
    Ok(())
}

pub fn load_alerts(path: &Path) -> Result<Vec<Alert>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid alerts file {}", path.display()))
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
