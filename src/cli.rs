// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::WatchConfig;
use crate::snapshot::Environment;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'c',
        long = "config",
        default_value = "platform_urls.json",
        help = "JSON list of tracked pages",
        global = true
    )]
    pub config: PathBuf,

    #[arg(
        long = "data-dir",
        default_value = ".",
        help = "Directory for snapshots, feeds and the health database",
        global = true
    )]
    pub data_dir: PathBuf,

    #[arg(long = "log-level", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Reduce output verbosity",
        global = true
    )]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output", global = true)]
    pub no_color: bool,

    #[arg(
        long = "env",
        value_enum,
        help = "Snapshot environment (defaults to detection from CI variables)",
        global = true
    )]
    pub environment: Option<Environment>,

    #[arg(long = "rules", help = "Normalizer rules file", global = true)]
    pub rules: Option<PathBuf>,

    #[arg(long = "chromium", help = "Path to a Chromium binary", global = true)]
    pub chromium: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every tracked page and record meaningful changes
    Fetch(FetchArgs),
    /// Probe every tracked URL and update the health database
    Health(HealthArgs),
    /// Show stored snapshots, health summary and active alerts
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[arg(long = "json", help = "Print run statistics as JSON")]
    pub json: bool,

    #[arg(long = "attempts", help = "Attempts per page (default 2)")]
    pub attempts: Option<u32>,

    #[arg(long = "retry-delay", help = "Seconds between attempts (default 5)")]
    pub retry_delay: Option<u64>,

    #[arg(long = "history-depth", help = "Replaced snapshots kept per page")]
    pub history_depth: Option<usize>,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    #[arg(short = 'w', long = "workers", default_value_t = 5)]
    pub workers: usize,

    #[arg(short = 't', long = "timeout", help = "Probe timeout in seconds (default 10)")]
    pub timeout: Option<u64>,

    #[arg(long = "no-browser", help = "Skip browser probes and assume healthy")]
    pub no_browser: bool,

    #[arg(long = "json", help = "Print the system summary as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long = "json", help = "Print status as JSON")]
    pub json: bool,

    #[arg(long = "failed-only", help = "Only list URLs whose status is failed")]
    pub failed_only: bool,
}

impl Cli {
    pub fn environment(&self) -> Environment {
        self.environment.unwrap_or_else(Environment::from_env)
    }

    /// Builds the run configuration from defaults plus global flags.
    pub fn watch_config(&self) -> WatchConfig {
        let mut config = WatchConfig::new();
        config.set_chromium_binary(self.chromium.clone());
        config.set_rules_file(self.rules.clone());
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::parse_from(["policywatch", "fetch"]);
        assert_eq!(cli.config, PathBuf::from("platform_urls.json"));
        assert_eq!(cli.log_level, "info");
        assert!(matches!(cli.command, Commands::Fetch(FetchArgs { json: false, .. })));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "policywatch",
            "health",
            "--workers",
            "3",
            "--data-dir",
            "/tmp/watch",
            "--env",
            "testing",
            "--quiet",
        ]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/watch"));
        assert_eq!(cli.environment(), Environment::Testing);
        assert!(cli.quiet);
        match cli.command {
            Commands::Health(args) => assert_eq!(args.workers, 3),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_watch_config_from_flags() {
        let cli = Cli::parse_from(["policywatch", "--chromium", "/opt/chrome", "status"]);
        let config = cli.watch_config();
        assert_eq!(
            config.chromium_binary(),
            Some(std::path::Path::new("/opt/chrome"))
        );
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }
}
