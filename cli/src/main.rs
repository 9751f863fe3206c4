use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod claims;
mod error;
mod transcode;
mod utils;

#[derive(Parser)]
#[command(name = "transclaim")]
#[command(about = "Transcode claim sets between binary and JSON formats", long_about = None)]
struct Cli {
    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    config: transcode::Config,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match transcode::execute(cli.config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
