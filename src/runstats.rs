// File: runstats.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2022-2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pages_checked: usize,
    changes_found: usize,
    cosmetic_changes: usize,
    new_pages: usize,
    failures: usize,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration_ms: u64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> RunStats {
        RunStats {
            pages_checked: 0,
            changes_found: 0,
            cosmetic_changes: 0,
            new_pages: 0,
            failures: 0,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
        }
    }

    pub fn add_checked(&mut self) {
        self.pages_checked += 1;
    }

    /// A reportable change. New pages count here too.
    pub fn add_change(&mut self) {
        self.changes_found += 1;
    }

    pub fn add_cosmetic(&mut self) {
        self.cosmetic_changes += 1;
    }

    pub fn add_new_page(&mut self) {
        self.new_pages += 1;
    }

    pub fn add_failure(&mut self) {
        self.failures += 1;
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    pub fn pages_checked(&self) -> usize {
        self.pages_checked
    }

    pub fn changes_found(&self) -> usize {
        self.changes_found
    }

    pub fn cosmetic_changes(&self) -> usize {
        self.cosmetic_changes
    }

    pub fn new_pages(&self) -> usize {
        self.new_pages
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pages checked. {} changes ({} new pages), {} cosmetic, {} failures. {} ms.",
            self.pages_checked,
            self.changes_found,
            self.new_pages,
            self.cosmetic_changes,
            self.failures,
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = RunStats::new();
        stats.add_checked();
        stats.add_checked();
        stats.add_change();
        stats.add_new_page();
        stats.add_cosmetic();
        stats.add_failure();

        assert_eq!(stats.pages_checked(), 2);
        assert_eq!(stats.changes_found(), 1);
        assert_eq!(stats.new_pages(), 1);
        assert_eq!(stats.cosmetic_changes(), 1);
        assert_eq!(stats.failures(), 1);
        assert!(stats.finished_at().is_none());
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut stats = RunStats::new();
        stats.finish();
        let finished = stats.finished_at().unwrap();
        assert!(finished >= stats.started_at());
    }

    #[test]
    fn test_serializes_counter_names() {
        let mut stats = RunStats::new();
        stats.finish();
        let json = serde_json::to_value(&stats).unwrap();
        for key in [
            "pages_checked",
            "changes_found",
            "cosmetic_changes",
            "new_pages",
            "failures",
            "started_at",
            "finished_at",
            "duration_ms",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_summary_line() {
        let stats = RunStats::new();
        assert!(stats.summary().starts_with("0 pages checked."));
    }
}
