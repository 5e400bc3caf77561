mod cli;
mod commands;
mod completers;
mod credentials;
mod error;
mod locate;
mod manager;
mod paths;
mod process;
mod settings;
mod steam;
mod switch;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, CommandKind};

fn init_logging(verbose: bool) {
    let default = if verbose {
        "steamswitch=info"
    } else {
        "steamswitch=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        CommandKind::Accounts { steam_dir, cached } => commands::accounts(steam_dir, cached).await,
        CommandKind::Path { steam_dir } => commands::path(steam_dir).await,
        CommandKind::Games {
            steam_dir,
            installed,
            steam_id,
        } => commands::games(steam_dir, installed, &steam_id).await,
        CommandKind::Switch {
            dry_run,
            steam_dir,
            account,
        } => commands::switch(dry_run, steam_dir, &account).await,
        CommandKind::Status { steam_dir } => commands::status(steam_dir).await,
        CommandKind::Start { steam_dir } => commands::start(steam_dir).await,
        CommandKind::Stop => commands::stop().await,
        CommandKind::Completions { shell } => {
            commands::completions(shell);
            Ok(())
        }
    }
}
