//! `fanout` sends many HTTP requests with a bounded number of them in
//! flight, retrying requests which fail with a recoverable error.
//!
//! The fanout binary is a wrapper around fanout-lib, which provides
//! convenience functions for calling fanout from the command-line.
//!
//! Fetch a few URLs, at most two at a time:
//!
//! ```sh
//! fanout fetch --max-concurrency 2 https://example.com https://example.org
//! ```
//!
//! Send ten requests to the Weather Source API, configured in the `[api]`
//! section of `fanout.toml`:
//!
//! ```sh
//! fanout api account --param fields=key,username --repeat 10
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

use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use clap::Parser;
use formatters::{get_formatter, log::init_logging};
use log::{error, info};

mod commands;
mod formatters;
mod options;
mod stats;
mod verbosity;

use crate::{
    commands::Batch,
    options::{Command, Config, FANOUT_CONFIG_FILE, FanoutOptions},
    stats::Summary,
};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, including a transport that failed mid-batch.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line arguments.
fn load_config() -> Result<FanoutOptions> {
    let mut opts = FanoutOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
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
        // If no config file was explicitly provided, we try to load the default
        // config file from the current directory if the file exists. An invalid
        // default file is an error, just like an invalid explicit one.
        let default_config = PathBuf::from(FANOUT_CONFIG_FILE);
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

    Ok(opts)
}

/// Set up runtime and call fanout entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!(
                "Error while loading config: {e}\n\
                See `fanout --help` (fanout {})",
                env!("CARGO_PKG_VERSION")
            );
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
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Run the selected command and print its results
async fn run(opts: &FanoutOptions) -> Result<i32> {
    let batch = match &opts.command {
        Command::Fetch(args) => commands::fetch(args, &opts.config).await?,
        Command::Api(args) => commands::api(args, &opts.config).await?,
    };
    let Batch {
        records,
        submitted,
        outcome,
    } = batch;

    let summary = Summary::new(submitted, &records);
    let formatter = get_formatter(&opts.config.format);
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", formatter.format(&records, &summary)?)?;
    info!("{summary}");

    outcome?;
    let exit_code = if summary.is_success() {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok(exit_code as i32)
}
