use clap::{CommandFactory, Parser};
use greenwave::cli::Cli;
use std::process::ExitCode;
use tracing::error;

mod main_dispatch;
mod main_runtime;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.command.is_none() {
        // Help output is best effort; the exit code is what matters.
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    }

    match main_dispatch::run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Failures before logging is installed still need to reach the user.
            error!("Fatal: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
