use std::{io, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use storage_files::{
    cli::{Cli, Command},
    commands,
    config::{AppConfig, ServeConfig},
    logging,
    state::AppState,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep one-shot commands quiet so stdout/stderr carry only their result.
    let default_directive = match cli.command {
        Command::Serve(_) => "info",
        _ => "warn",
    };
    if let Err(err) = logging::init_tracing(default_directive) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("command failed: {:?}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = AppConfig::resolve(&cli.global)?;
    tracing::debug!("resolved config: {:?}", cfg);

    let state = AppState::from_config(&cfg).await?;

    match cli.command {
        Command::Serve(args) => {
            let serve_cfg = ServeConfig::resolve(&args)?;
            commands::serve::run(state, &serve_cfg).await
        }
        command => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            commands::execute(command, &state, &mut out).await
        }
    }
}
