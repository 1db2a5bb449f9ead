mod args;
mod auth;
mod config_cmd;
mod daemon;
mod saves;
mod sync_cmd;

pub use auth::AuthCommand;
pub use config_cmd::ConfigCommand;
pub use daemon::DaemonCommand;
pub use saves::{
    ContinueCommand, DeleteCommand, ListCommand, LoadCommand, RenameCommand, SaveCommand,
};
pub use sync_cmd::SyncCommand;
