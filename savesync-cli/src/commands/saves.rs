//! Save slot commands: list, save, load, delete, rename, continue.

use clap::{Args, ValueEnum};
use std::path::PathBuf;

use savesync_core::{Completion, Operation, SaveError};

use super::args::{ArgsError, LabelArgs, LoadFilterArgs, SlotArgs};
use crate::config::Config;
use crate::host::{read_state, write_state, SaveHost};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// List saves in slot order
#[derive(Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let host = SaveHost::from_config(config)?;
        let records = host.store().list()?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
            OutputFormat::Text => {
                if records.is_empty() {
                    println!("No saves in {}", config.save_dir.value.display());
                    return Ok(());
                }
                println!("{:<6} {:<6} {:<32} SAVED", "SLOT", "ID", "LABEL");
                for record in records {
                    let label = if record.is_autosave {
                        format!("{} (autosave)", record.label)
                    } else {
                        record.label
                    };
                    println!(
                        "{:<6} {:<6} {:<32} {}",
                        record.slot_index,
                        record.save_id,
                        label,
                        record
                            .modified_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Ok(())
    }
}

/// Save the game state to a slot
#[derive(Args)]
pub struct SaveCommand {
    #[command(flatten)]
    slot: SlotArgs,

    #[command(flatten)]
    label: LabelArgs,

    /// Save to a new slot instead of overwriting one
    #[arg(long)]
    new: bool,

    /// Replace the label of an existing save
    #[arg(long)]
    update_label: bool,

    /// Game state file (JSON) to save
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,
}

impl SaveCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let operation = if self.new || (self.slot.is_empty() && !self.update_label) {
            Operation::save_new(self.label.source())
        } else {
            Operation::save(self.slot.addressing()?)
                .with_label(self.label.source())
                .with_update_label(self.update_label)
        };

        let host = SaveHost::from_config(config)?;
        if let Some(path) = &self.state {
            host.store().set_state(read_state(path)?);
        }

        report("Saved", host.run(operation))
    }
}

/// Load a save into the game state
#[derive(Args)]
pub struct LoadCommand {
    #[command(flatten)]
    slot: SlotArgs,

    #[command(flatten)]
    filter: LoadFilterArgs,
}

impl LoadCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let mut operation = Operation::load(self.slot.addressing()?);
        if let Some(selective) = self.filter.selective_load() {
            operation = operation.with_selective_load(selective);
        }
        load(config, operation, &self.filter)
    }
}

/// Load the most recent save
#[derive(Args)]
pub struct ContinueCommand {
    #[command(flatten)]
    filter: LoadFilterArgs,
}

impl ContinueCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let mut operation = Operation::continue_last_save();
        if let Some(selective) = self.filter.selective_load() {
            operation = operation.with_selective_load(selective);
        }
        load(config, operation, &self.filter)
    }
}

/// Delete a save
#[derive(Args)]
pub struct DeleteCommand {
    #[command(flatten)]
    slot: SlotArgs,
}

impl DeleteCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let host = SaveHost::from_config(config)?;
        report("Deleted", host.run(Operation::delete(self.slot.addressing()?)))
    }
}

/// Rename a save
#[derive(Args)]
pub struct RenameCommand {
    #[command(flatten)]
    slot: SlotArgs,

    #[command(flatten)]
    label: LabelArgs,
}

impl RenameCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let label = self.label.source();
        if label == savesync_core::LabelSource::None {
            return Err(ArgsError::MissingLabel.into());
        }

        let host = SaveHost::from_config(config)?;
        report("Renamed", host.run(Operation::rename(self.slot.addressing()?, label)))
    }
}

/// Runs a load and hands the restored state back.
///
/// With `--state`, the file is the live state: it is read first, so sections
/// the load skips keep their values, and written back afterwards. Without
/// it, the restored state is printed.
fn load(
    config: &Config,
    operation: Operation,
    filter: &LoadFilterArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = SaveHost::from_config(config)?;
    if let Some(path) = &filter.state {
        host.store().set_state(read_state(path)?);
    }

    let completion = host.run(operation)?;
    let state = host.store().state();
    match &filter.state {
        Some(path) => {
            write_state(path, &state)?;
            print_completion("Loaded", &completion);
            println!("Game state written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

fn report(
    verb: &str,
    result: Result<Completion, SaveError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let completion = result?;
    print_completion(verb, &completion);
    Ok(())
}

fn print_completion(verb: &str, completion: &Completion) {
    match completion {
        Completion::Finished {
            save_id: Some(save_id),
        } => println!("{} save {}", verb, save_id),
        Completion::Finished { save_id: None } => println!("{}", verb),
        Completion::SkippedLocked => println!("Saving is locked; nothing was written"),
    }
}
