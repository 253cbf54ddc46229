//! Stackwright CLI: declarative infrastructure synthesis.

use clap::Parser;
use stackwright::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = stackwright::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
