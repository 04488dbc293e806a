// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! # wardenctl
//!
//! Control utility for a running wardend: queries the status page or
//! triggers a graceful shutdown over the admin channel.
//!
//! ```text
//! wardenctl <hostname> <port> <command> [<password>]
//! ```
//!
//! Exit codes: 0 success, 1 bad arguments, 2 connection failure,
//! 3 invalid command, 4 unauthorized, 100 unknown error.

use std::process::exit;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;

const EXIT_OK: i32 = 0;
const EXIT_BAD_ARGUMENTS: i32 = 1;
const EXIT_CONNECTION_FAILURE: i32 = 2;
const EXIT_INVALID_COMMAND: i32 = 3;
const EXIT_UNAUTHORIZED: i32 = 4;
const EXIT_UNKNOWN: i32 = 100;

/// WARDEN admin control utility
#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Admin channel hostname
    hostname: String,

    /// Admin channel port
    port: u16,

    /// Command: status | shutdown
    command: String,

    /// Admin password, when the service requires one
    password: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        eprintln!("{e}");
        exit(EXIT_BAD_ARGUMENTS);
    });

    if !matches!(cli.command.as_str(), "status" | "shutdown") {
        eprintln!(
            "{} unknown command {:?}, expected status or shutdown",
            "error:".red().bold(),
            cli.command
        );
        exit(EXIT_INVALID_COMMAND);
    }

    let mut url = format!("http://{}:{}/{}", cli.hostname, cli.port, cli.command);
    if let Some(password) = &cli.password {
        url.push_str("?password=");
        url.push_str(password);
    }

    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            exit(EXIT_UNKNOWN);
        }
    };

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!(
                "{} cannot reach {}:{} - {e}",
                "error:".red().bold(),
                cli.hostname,
                cli.port
            );
            exit(EXIT_CONNECTION_FAILURE);
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        eprintln!("{} unauthorized", "error:".red().bold());
        exit(EXIT_UNAUTHORIZED);
    }
    if status.is_success() {
        print!("{body}");
        exit(EXIT_OK);
    }

    eprintln!("{} service answered {status}", "error:".red().bold());
    exit(EXIT_UNKNOWN);
}
