#[macro_use]
extern crate prettytable;
use clap::Parser;
use commands::{handle_clean, handle_download, handle_status, Commands, EXIT_FATAL};
use dotenv::dotenv;
use std::process;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

pub mod commands;
pub mod progress;

/// Segmented, resumable downloader.
#[derive(Parser)]
#[clap(author, version, about, subcommand_required = true)]
struct Yank {
    /// Show debug logs
    #[clap(long, short, global = true)]
    verbose: bool,
    /// Only show errors and hide progress bars
    #[clap(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[clap(subcommand)]
    commands: Commands,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let yank = Yank::parse();
    init_logging(yank.verbose, yank.quiet);

    let result = match yank.commands {
        Commands::Download {
            url,
            concurrency,
            output_dir,
            marker_dir,
        } => handle_download(url, concurrency, output_dir, marker_dir, yank.quiet).await,
        Commands::Status {
            file_name,
            concurrency,
            output_dir,
            marker_dir,
        } => handle_status(file_name, concurrency, output_dir, marker_dir).await,
        Commands::Clean {
            file_name,
            output_dir,
            marker_dir,
        } => handle_clean(file_name, output_dir, marker_dir).await,
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(EXIT_FATAL);
        }
    }
}

/// `--quiet` and `--verbose` win over `RUST_LOG`, which falls back to info.
fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    tracing_subscriber::registry()
        .with(log_filter(verbose, quiet))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_honours_rust_log() {
        std::env::set_var("RUST_LOG", "warn");
        assert_eq!(log_filter(false, false).to_string(), "warn");
        assert_eq!(log_filter(true, false).to_string(), "debug");
        assert_eq!(log_filter(false, true).to_string(), "error");

        std::env::remove_var("RUST_LOG");
        assert_eq!(log_filter(false, false).to_string(), "info");
    }
}
