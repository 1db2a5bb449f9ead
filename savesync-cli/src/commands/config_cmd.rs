use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_text(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = &config.config_path;

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'saves config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# saves configuration

# Directory holding .save files (default: platform data dir/savesync/saves)
# save_dir: ~/.local/share/savesync/saves

# Language used when reading text variables
language: en

# YAML file with integer and text variables
# variables_file: variables.yaml

# Save-list elements used by --menu/--element
# menus:
#   - menu: Load
#     element: SavesList
#     offset: 0

# sync:
#   server_url: "http://localhost:8080"
#   interval_secs: 40
#   sign_in_poll_secs: 10
"#;

fn print_text(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: {} (not found)", config.config_path.display()),
    }
    println!();

    println!("save_dir: {}", config.save_dir.value.display());
    println!("  source: {}", config.save_dir.source);
    println!();

    println!("language: {}", config.language.value);
    println!("  source: {}", config.language.source);
    println!();

    match &config.variables_file.value {
        Some(path) => println!("variables_file: {}", path.display()),
        None => println!("variables_file: (none)"),
    }
    println!("  source: {}", config.variables_file.source);
    println!();

    println!("poll_interval_ms: {}", config.poll_interval_ms.value);
    println!("  source: {}", config.poll_interval_ms.source);
    println!();

    if config.menus.is_empty() {
        println!("menus: (none)");
    } else {
        println!("menus:");
        for menu in &config.menus {
            println!("  {}/{} (offset {})", menu.menu, menu.element, menu.offset);
        }
    }
    println!();

    println!("sync:");
    println!(
        "  server_url: {}",
        config.sync.server_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  api_key: {}",
        if config.sync.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    println!(
        "  player_id: {}",
        config.sync.player_id.as_deref().unwrap_or("(any)")
    );
    println!("  interval: {}s", config.sync.interval().as_secs());
    println!("  sign_in_poll: {}s", config.sync.sign_in_poll().as_secs());
}
