// File: fetch.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use log::error;
use std::sync::Arc;
use std::time::Duration;

use super::{build_normalizer, format_duration, load_pages, print_error, print_success, print_warning};
use crate::browser::{BrowserDriver, ChromiumDriver};
use crate::cli::{Cli, FetchArgs};
use crate::detector::ChangeDetector;
use crate::fetcher::FetchEngine;
use crate::pipeline::{Pipeline, RunReport};
use crate::snapshot::SnapshotStore;

pub const SNAPSHOTS_DIR: &str = "snapshots";

pub async fn execute(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let pages = load_pages(cli)?;
    if pages.is_empty() {
        print_warning("The configuration file is empty. No pages to track.");
        return Ok(());
    }

    let mut config = cli.watch_config();
    if let Some(attempts) = args.attempts {
        config.set_retry_attempts(attempts);
    }
    if let Some(delay) = args.retry_delay {
        config.set_retry_delay(Duration::from_secs(delay));
    }
    if let Some(depth) = args.history_depth {
        config.set_snapshot_history_depth(depth);
    }

    let normalizer = build_normalizer(&config)?;
    let browser: Arc<dyn BrowserDriver> = Arc::new(ChromiumDriver::new(config.chromium_binary()));
    let engine = FetchEngine::new(&config, browser)?;
    let store = SnapshotStore::new(
        &cli.data_dir.join(SNAPSHOTS_DIR),
        cli.environment(),
        config.snapshot_history_depth(),
        Arc::clone(&normalizer),
    );

    let pipeline = Pipeline::new(engine, normalizer, ChangeDetector::default(), store);
    let report = pipeline.run(&pages).await;

    if let Err(e) = report.persist(&cli.data_dir) {
        error!("Could not write run artifacts: {:#}", e);
        print_error(&format!("Could not write run artifacts: {:#}", e));
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.stats).context("Failed to serialize run stats")?
        );
    } else if !cli.quiet {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;
    println!();
    println!("{}", "Fetch summary".bold().underline());
    println!("  {:<18} {}", "Pages checked:", stats.pages_checked());
    println!(
        "  {:<18} {}",
        "Changes:",
        stats.changes_found().to_string().green().bold()
    );
    println!("  {:<18} {}", "New pages:", stats.new_pages());
    println!("  {:<18} {}", "Cosmetic:", stats.cosmetic_changes());
    println!(
        "  {:<18} {}",
        "Failures:",
        if stats.failures() > 0 {
            stats.failures().to_string().red().bold()
        } else {
            stats.failures().to_string().normal()
        }
    );
    println!("  {:<18} {}", "Duration:", format_duration(stats.duration_ms()));

    for event in &report.changes {
        println!(
            "  {} {} ({})",
            "•".cyan(),
            event.slug.bold(),
            event.reason
        );
    }
    for failure in &report.failures {
        println!(
            "  {} {} [{}] {}",
            "✗".red(),
            failure.slug.bold(),
            failure.kind,
            failure.reason
        );
    }

    if report.failures.is_empty() {
        print_success("Fetch completed with 0 failures.");
    } else {
        print_warning(&format!(
            "Fetch completed with {} failures.",
            report.failures.len()
        ));
    }
}
