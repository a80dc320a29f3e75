use std::path::PathBuf;

use clap::Parser;
use provis_core::error::{ApiError, ConfigError, ProvisError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "provis",
    version,
    about = "Explore provenance lineage and watch asynchronous registry jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Path to a config file (default: .provis/config.toml, else built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0  — success
///   1  — general/unknown error
///   2  — configuration error
///   3  — record or job not found
///   5  — API or network error
///   6  — watched job finished with status FAILED
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return if api.is_not_found() { 3 } else { 5 };
        }
        if let Some(e) = cause.downcast_ref::<ProvisError>() {
            return match e {
                ProvisError::Config(_) => 2,
                ProvisError::Api(api) if api.is_not_found() => 3,
                ProvisError::Api(_) => 5,
                ProvisError::Lineage(_) | ProvisError::Job(_) => 1,
            };
        }
    }

    // Poll and explorer failures reach the CLI as messages only.
    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("finished with status failed") {
        6
    } else if lower.contains("http 404") {
        3
    } else if lower.contains("api error") || lower.contains("network error") {
        5
    } else if lower.contains("config") {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let global = commands::GlobalArgs {
        config: cli.config,
        quiet: cli.quiet,
    };
    match runtime.block_on(commands::run(cli.command, global)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
