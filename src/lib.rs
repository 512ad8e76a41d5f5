pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{AlbatrossClient, LocalStorage, MysqlAdmin, ScpFetcher};
pub use config::{CliConfig, Settings};
pub use core::{deploy::DeployLogs, engine::SnapshotEngine, snapshot::Snapshot};
pub use utils::error::{CapatrossError, Result};
