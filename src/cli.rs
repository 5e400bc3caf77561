use clap::{Parser, Subcommand};
use clap_complete::Shell;
use clap_complete::engine::ArgValueCompleter;

use crate::completers::{complete_account_name, complete_steam_id};

#[derive(Parser)]
#[command(name = "steamswitch")]
#[command(about = "List local Steam accounts and switch the active login")]
#[command(disable_help_subcommand = true, disable_help_flag = true)]
pub struct Cli {
    #[arg(
        long,
        action = clap::ArgAction::Help,
        help = "Print help",
        hide = true
    )]
    help: Option<bool>,
    #[arg(short = 'v', long, global = true, help = "Log progress to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: CommandKind,
}

#[derive(Subcommand)]
pub enum CommandKind {
    #[command(about = "List Steam accounts signed in on this machine")]
    Accounts {
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
        #[arg(long, help = "Show the roster saved by the last listing instead of reading Steam")]
        cached: bool,
    },
    #[command(about = "Print the Steam installation path")]
    Path {
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
    },
    #[command(about = "List games an account has played")]
    Games {
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
        #[arg(long, help = "Only list installed games")]
        installed: bool,
        #[arg(
            help = "Steam ID of the account (e.g. 76561198000000000)",
            add = ArgValueCompleter::new(complete_steam_id)
        )]
        steam_id: String,
    },
    #[command(about = "Set the auto-login account and restart Steam with it")]
    Switch {
        #[arg(short = 'n', long, help = "Print the launch command without switching")]
        dry_run: bool,
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
        #[arg(
            help = "Account name to log in with",
            add = ArgValueCompleter::new(complete_account_name)
        )]
        account: String,
    },
    #[command(about = "Show whether Steam is running and which account logs in automatically")]
    Status {
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
    },
    #[command(about = "Start Steam")]
    Start {
        #[arg(short = 's', long, help = "Path to Steam installation")]
        steam_dir: Option<String>,
    },
    #[command(about = "Stop Steam")]
    Stop,
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(help = "Shell to generate completions for (bash, zsh, fish, elvish, powershell)")]
        shell: Shell,
    },
}
