// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;
use colored::*;
use std::sync::Arc;

use crate::cli::{Cli, FetchArgs, HealthArgs, StatusArgs};
use crate::config::{load_tracked_pages, TrackedPage, WatchConfig};
use crate::normalizer::{Normalizer, NormalizerRules};

pub mod fetch;
pub mod health;
pub mod status;

pub async fn handle_fetch_command(cli: &Cli, args: &FetchArgs) -> Result<()> {
    fetch::execute(cli, args).await
}

pub async fn handle_health_command(cli: &Cli, args: &HealthArgs) -> Result<()> {
    health::execute(cli, args).await
}

pub async fn handle_status_command(cli: &Cli, args: &StatusArgs) -> Result<()> {
    status::execute(cli, args).await
}

/// Loads the tracked pages. Configuration errors propagate unchanged so the
/// binary can map them to a failing exit code.
fn load_pages(cli: &Cli) -> Result<Vec<TrackedPage>> {
    let pages = load_tracked_pages(&cli.config)?;
    if !cli.quiet && !pages.is_empty() {
        print_info(&format!(
            "Loaded {} pages from {}",
            pages.len(),
            cli.config.display()
        ));
    }
    Ok(pages)
}

fn build_normalizer(config: &WatchConfig) -> Result<Arc<Normalizer>> {
    let rules = match config.rules_file() {
        Some(path) => NormalizerRules::load(path)?,
        None => NormalizerRules::default(),
    };
    Ok(Arc::new(Normalizer::new(rules)?))
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_duration(ms: u64) -> String {
    if ms >= 60000 {
        format!("{}m {:.1}s", ms / 60000, (ms % 60000) as f64 / 1000.0)
    } else if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}
