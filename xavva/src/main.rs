mod browser;
mod build;
mod cli;
mod commands;
mod config;
mod health;
mod java;
mod orchestrator;
mod output;
mod paths;
mod process;
mod server;
mod watch;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    crate::output::set_verbose(cli.verbose);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("info")
            } else {
                EnvFilter::new("warn")
            }
        }))
        .with_target(false)
        .init();

    if let Err(e) = cli.run() {
        crate::output::error_stderr(&e.to_string());
        if crate::output::is_verbose() {
            crate::output::muted(&format!("{e:?}"));
        }
        std::process::exit(1);
    }
}
