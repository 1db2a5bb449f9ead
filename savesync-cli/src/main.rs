use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod host;
mod signin;

use commands::{
    AuthCommand, ConfigCommand, ContinueCommand, DaemonCommand, DeleteCommand, ListCommand,
    LoadCommand, RenameCommand, SaveCommand, SyncCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "saves")]
#[command(version)]
#[command(about = "Manage save slots and sync them with a cloud-save server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saves
    List(ListCommand),

    /// Save the game state
    Save(SaveCommand),

    /// Load a save
    Load(LoadCommand),

    /// Delete a save
    Delete(DeleteCommand),

    /// Rename a save
    Rename(RenameCommand),

    /// Load the most recent save
    Continue(ContinueCommand),

    /// Upload and download saves once
    Sync(SyncCommand),

    /// Keep saves in sync in the background
    Daemon(DaemonCommand),

    /// Log in to or out of the sync server
    Auth(AuthCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "savesync_core=info,savesync_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(Commands::List(cmd)) => cmd.run(&config)?,
        Some(Commands::Save(cmd)) => cmd.run(&config)?,
        Some(Commands::Load(cmd)) => cmd.run(&config)?,
        Some(Commands::Delete(cmd)) => cmd.run(&config)?,
        Some(Commands::Rename(cmd)) => cmd.run(&config)?,
        Some(Commands::Continue(cmd)) => cmd.run(&config)?,
        Some(Commands::Sync(cmd)) => cmd.run(&config)?,
        Some(Commands::Daemon(cmd)) => cmd.run(&config)?,
        Some(Commands::Auth(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
