//! Reference cloud-save server for savesync.

pub mod server;
