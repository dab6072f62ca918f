// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;
use std::process;
use std::str::FromStr;

use policywatch::cli::{Cli, Commands};
use policywatch::commands::{
    handle_fetch_command, handle_health_command, handle_status_command, print_error,
};
use policywatch::errors::WatchError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::from_str(&cli.log_level).unwrap_or(LevelFilter::Info)
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match &cli.command {
        Commands::Fetch(args) => handle_fetch_command(&cli, args).await,
        Commands::Health(args) => handle_health_command(&cli, args).await,
        Commands::Status(args) => handle_status_command(&cli, args).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<WatchError>() {
            Some(WatchError::Configuration(message)) => {
                error!("Configuration error: {}", message);
                print_error(&format!("Configuration error: {}", message));
            }
            _ => {
                error!("{:#}", e);
                print_error(&format!("{:#}", e));
            }
        }
        process::exit(1);
    }
}
