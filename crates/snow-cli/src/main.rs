//! # snow
//!
//! Daemon-less launcher that runs one program inside a read-only squashfs
//! image, in fresh namespaces, by replacing itself with the target.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use snow_common::constants::{DEFAULT_LOG_LEVEL, LOG_ENV_VAR};
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Maps the conventional level names onto filter directives.
fn log_directive(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_LOG_LEVEL.to_string(),
        Some(level) if level.eq_ignore_ascii_case("warning") => "warn".to_string(),
        Some(level) if LEVELS.iter().any(|l| level.eq_ignore_ascii_case(l)) => {
            level.to_ascii_lowercase()
        }
        Some(directive) => directive.to_string(),
    }
}

fn init_tracing() {
    let raw = std::env::var(LOG_ENV_VAR).ok();
    let filter = EnvFilter::try_new(log_directive(raw.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    commands::execute(&cli)
}
