// File: status.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;

use super::fetch::SNAPSHOTS_DIR;
use super::{build_normalizer, print_error, print_info, print_warning};
use crate::cli::{Cli, StatusArgs};
use crate::health::{load_alerts, Alert, HealthDatabase, HealthStatus, ALERTS_FILE, HEALTH_DB_FILE};
use crate::pipeline::{read_failure_log, FAILURE_LOG_FILE};
use crate::snapshot::SnapshotStore;

#[derive(Debug, Serialize)]
struct UrlStatus {
    slug: String,
    url: String,
    status: HealthStatus,
    consecutive_failures: u32,
    success_rate: f64,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    environment: String,
    snapshots: Vec<String>,
    urls: Vec<UrlStatus>,
    alerts: Vec<Alert>,
    failed_fetches: usize,
    system_uptime: Option<f64>,
    health_database_error: Option<String>,
}

pub async fn execute(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let config = cli.watch_config();
    let store = SnapshotStore::new(
        &cli.data_dir.join(SNAPSHOTS_DIR),
        cli.environment(),
        config.snapshot_history_depth(),
        build_normalizer(&config)?,
    );
    let db_path = cli.data_dir.join(HEALTH_DB_FILE);
    let (db, health_database_error) = match HealthDatabase::read(&db_path) {
        Ok(db) => (db, None),
        Err(e) => (HealthDatabase::default(), Some(format!("{:#}", e))),
    };
    let alerts = load_alerts(&cli.data_dir.join(ALERTS_FILE))?;
    let failures = read_failure_log(&cli.data_dir.join(FAILURE_LOG_FILE))?;

    let urls = url_statuses(&db, args.failed_only);

    let report = StatusReport {
        environment: store.environment().to_string(),
        snapshots: store.slugs()?,
        urls,
        alerts,
        failed_fetches: failures.len(),
        system_uptime: db.system_health.as_ref().map(|s| s.system_uptime),
        health_database_error,
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?
        );
        return Ok(());
    }

    display_status(&report, &store);
    Ok(())
}

fn url_statuses(db: &HealthDatabase, failed_only: bool) -> Vec<UrlStatus> {
    db.urls
        .values()
        .filter(|record| !failed_only || record.current_status == HealthStatus::Failed)
        .map(|record| UrlStatus {
            slug: record.slug.clone(),
            url: record.url.clone(),
            status: record.current_status,
            consecutive_failures: record.consecutive_failures,
            success_rate: (record.success_rate() * 100.0).round() / 100.0,
        })
        .collect()
}

fn display_status(report: &StatusReport, store: &SnapshotStore) {
    if let Some(error) = &report.health_database_error {
        print_error(&format!("{} (run `health` to rebuild it)", error));
    }
    print_info(&format!(
        "{} snapshots in {} ({})",
        report.snapshots.len(),
        store.root().display(),
        report.environment
    ));
    if let Some(uptime) = report.system_uptime {
        print_info(&format!("System uptime: {:.2}%", uptime));
    }
    if report.failed_fetches > 0 {
        print_warning(&format!(
            "{} pages failed in the last fetch run",
            report.failed_fetches
        ));
    }

    if !report.urls.is_empty() {
        println!();
        println!(
            "{:<32} {:<10} {:>6} {:>9}",
            "SLUG".bold(),
            "STATUS".bold(),
            "FAILS".bold(),
            "SUCCESS".bold()
        );
        for url in &report.urls {
            let status = match url.status {
                HealthStatus::Healthy => url.status.to_string().green(),
                HealthStatus::Degraded => url.status.to_string().yellow(),
                HealthStatus::Failed => url.status.to_string().red().bold(),
                HealthStatus::Unknown => url.status.to_string().dimmed(),
            };
            println!(
                "{:<32} {:<10} {:>6} {:>8.1}%",
                url.slug, status, url.consecutive_failures, url.success_rate
            );
        }
    }

    for alert in &report.alerts {
        print_warning(&format!(
            "ALERT {}: {} -> {}",
            alert.slug, alert.previous_status, alert.current_status
        ));
    }
}
