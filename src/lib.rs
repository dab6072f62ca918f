// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_inception)]
#![allow(clippy::bool_assert_comparison)]
#![allow(clippy::new_without_default)]

pub mod browser;
pub mod classifier;
pub mod cli;
pub mod commands;
pub mod config;
pub mod detector;
pub mod errors;
pub mod fetcher;
pub mod health;
pub mod normalizer;
pub mod pipeline;
pub mod probe;
pub mod runstats;
pub mod snapshot;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_imports() {
        let _ = config::WatchConfig::new();
        let _ = detector::ChangeDetector::default();
        let _ = health::HealthDatabase::default();
        let _ = runstats::RunStats::new();
        let _ = normalizer::NormalizerRules::default();
    }
}
