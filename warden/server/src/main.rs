// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! # wardend
//!
//! The WARDEN authorization service daemon. Loads the configuration,
//! wires the pipeline, and serves the authorization and admin channels
//! until a signal or an admin shutdown arrives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden_core::config::ServiceConfig;

mod runtime;
mod tls;

/// WARDEN grid authorization service
#[derive(Parser)]
#[command(name = "wardend")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long, env = "WARDEN_CONFIG", value_name = "FILE")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WARDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    tracing::info!(
        entity_id = %config.entity_id,
        port = config.port,
        admin_port = config.admin.port,
        "Starting wardend"
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(runtime::run(config))
}
