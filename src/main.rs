//! route-surface - command-line tool for discovering the HTTP API surface of a Rust web service.
//!
//! # Usage
//!
//! ```bash
//! route-surface [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! List the routes of a project as YAML:
//! ```bash
//! route-surface ./my-service
//! ```
//!
//! Write an OpenAPI document as JSON:
//! ```bash
//! route-surface ./my-service -s openapi -f json -o openapi.json
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! route-surface ./my-service -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use route_surface::cli;

fn main() -> Result<()> {
    // the verbose flag decides the log level, so parse before the logger exists
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("route-surface starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    Ok(())
}
