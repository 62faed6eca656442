//! Feed Builder - Main entry point
//!
//! Builds an update feed from the settings file given on the command line.

use clap::error::ErrorKind;
use clap::Parser;
use feed_builder::{utils, BuildOptions, ExitCode, FeedBuilder, FeedError, Settings};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the feed settings file
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Build the feed (otherwise only list the files that would be included)
    #[arg(short, long)]
    build: bool,

    /// Open the feed folder after a successful build
    #[arg(short, long)]
    open_output: bool,

    /// Read the written feed back and check it
    #[arg(long)]
    verify: bool,

    /// Log level (trace, debug, info, warn, error; overrides settings)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<process::ExitCode> {
    if std::env::args_os().len() <= 1 {
        utils::logger::init("info")?;
        tracing::warn!("No arguments provided. Exiting.");
        return Ok(process::ExitCode::SUCCESS);
    }

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Ok(process::ExitCode::from(usage_exit_code(&e).bits()));
        }
    };

    // Load settings
    let settings = match &args.file {
        Some(path) => Settings::from_file(path),
        None => Ok(Settings::default()),
    };

    // Initialize logging
    let log_level = args
        .log_level
        .clone()
        .or_else(|| settings.as_ref().ok().map(|s| s.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    utils::logger::init(&log_level)?;

    let status = match settings.and_then(|settings| run(&args, settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ FeedError::FileNotFound(_)) => {
            tracing::warn!("{}", e);
            e.exit_code()
        }
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    };

    Ok(process::ExitCode::from(status.bits()))
}

fn run(args: &Args, settings: Settings) -> feed_builder::Result<()> {
    let builder = FeedBuilder::new(settings).with_options(BuildOptions {
        open_output: args.open_output,
        verify: args.verify,
    });

    if args.build {
        builder.build()?;
    } else if args.file.is_some() {
        let catalog = builder.scan()?;
        tracing::info!("{} files would be included in the feed", catalog.len());
    }

    Ok(())
}

/// Exit status for a command line clap refused. Help and version requests
/// succeed; anything else is a plain failure.
fn usage_exit_code(err: &clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
