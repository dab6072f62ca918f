// File: health.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use log::error;
use std::sync::Arc;
use std::time::Duration;

use super::{load_pages, print_error, print_info, print_success, print_warning};
use crate::browser::{BrowserDriver, ChromiumDriver};
use crate::cli::{Cli, HealthArgs};
use crate::health::{save_alerts, HealthDatabase, ALERTS_FILE, HEALTH_DB_FILE};
use crate::probe::{run_health_checks, HealthProber, HealthRunSummary};

pub async fn execute(cli: &Cli, args: &HealthArgs) -> Result<()> {
    let pages = load_pages(cli)?;
    if pages.is_empty() {
        print_warning("The configuration file is empty. No URLs to check.");
        return Ok(());
    }

    let mut config = cli.watch_config();
    config.set_workers(args.workers);
    config.set_browser_probes(!args.no_browser);
    if let Some(timeout) = args.timeout {
        config.set_probe_timeout(Duration::from_secs(timeout));
    }

    let browser: Arc<dyn BrowserDriver> = Arc::new(ChromiumDriver::new(config.chromium_binary()));
    let prober = Arc::new(HealthProber::new(&config, browser)?);

    let db_path = cli.data_dir.join(HEALTH_DB_FILE);
    let mut db = HealthDatabase::load(&db_path);
    if !cli.quiet {
        print_info(&format!(
            "Checking {} URLs ({} known records)",
            pages.len(),
            db.urls.len()
        ));
    }

    let summary = run_health_checks(prober, &pages, &mut db, !cli.quiet && !args.json).await;

    if let Err(e) = db.save(&db_path) {
        error!("Could not save health database: {:#}", e);
        print_error(&format!("Could not save health database: {:#}", e));
    }
    if let Err(e) = save_alerts(&cli.data_dir.join(ALERTS_FILE), &summary.alerts) {
        error!("Could not save health alerts: {:#}", e);
        print_error(&format!("Could not save health alerts: {:#}", e));
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary.system)
                .context("Failed to serialize system health")?
        );
    } else if !cli.quiet {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &HealthRunSummary) {
    let system = &summary.system;
    println!();
    println!("{}", "System health".bold().underline());
    println!("  {:<16} {}", "Total URLs:", system.total_urls);
    println!(
        "  {:<16} {}",
        "Healthy:",
        system.healthy_urls.to_string().green()
    );
    println!(
        "  {:<16} {}",
        "Degraded:",
        system.degraded_urls.to_string().yellow()
    );
    println!("  {:<16} {}", "Failed:", system.failed_urls.to_string().red());
    println!("  {:<16} {:.2}%", "Uptime:", system.system_uptime);

    if summary.alerts.is_empty() {
        print_success("No new failures.");
        return;
    }
    for alert in &summary.alerts {
        print_error(&format!(
            "{} ({}) is now failing: {}",
            alert.slug,
            alert.platform,
            alert.error_message.as_deref().unwrap_or("no error message")
        ));
    }
}
