//! `ip-rotator` sends HTTP requests through AWS API Gateway endpoints in
//! several regions, so that the target sees them coming from a rotating set
//! of addresses.
//!
//! The binary is a thin wrapper around `ip-rotator-lib`.
//!
//! Fetch a page three times, each time through another gateway:
//! ```sh
//! ip-rotator fetch https://ipinfo.io json -n 3
//! ```
//!
//! Remove gateways left behind by an interrupted run:
//! ```sh
//! ip-rotator sweep https://ipinfo.io --preset all
//! ```
//!
//! Try a command without touching AWS:
//! ```sh
//! ip-rotator fetch https://ipinfo.io --dry-run
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, ErrorKind};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use clap::Parser;
use formatters::log::init_logging;
use log::error;

mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::options::{Command, Config, IP_ROTATOR_CONFIG_FILE, IpRotatorOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, e.g. gateways that could not be deployed.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't run destructors, so everything owning
    // resources lives inside `run_main`.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge the config file, command-line flags and environment into one
fn load_config() -> Result<IpRotatorOptions> {
    let mut opts = IpRotatorOptions::parse();

    // The config file can set the verbosity, so logging starts after the
    // merge. A broken file still gets logged with the CLI settings.
    let merged = merge_config_file(&mut opts);
    init_logging(&opts.config.verbose, &opts.config.mode);
    merged?;

    // Reject half-configured credentials before anything is deployed
    opts.config.credentials()?;

    Ok(opts)
}

/// Merge an explicit config file, or the default one if it exists, into
/// the CLI options
fn merge_config_file(opts: &mut IpRotatorOptions) -> Result<()> {
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // A default config file is optional, but must be valid if present
        let default_config = PathBuf::from(IP_ROTATOR_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }
    Ok(())
}

/// Set up runtime and call the entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Run the selected command
async fn run(opts: &IpRotatorOptions) -> Result<i32> {
    let cfg = &opts.config;
    let mut stdout = io::stdout().lock();

    let exit_code = match &opts.command {
        Command::Regions { preset } => commands::regions(*preset, &mut stdout)?,
        Command::List { target } => {
            let rotator = commands::rotator(cfg, target).await?;
            commands::list(&rotator, &mut stdout).await?
        }
        Command::Sweep { target } => {
            let rotator = commands::rotator(cfg, target).await?;
            commands::sweep(&rotator, &mut stdout).await?
        }
        Command::Fetch(args) => {
            let rotator = commands::rotator(cfg, &args.target).await?;
            commands::fetch(&rotator, args, &cfg.mode, &mut stdout).await?
        }
    };

    Ok(exit_code as i32)
}
