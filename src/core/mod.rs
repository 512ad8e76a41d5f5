pub mod deploy;
pub mod engine;
pub mod snapshot;

pub use crate::domain::model::{ApiResponse, DeployLog, DumpInfo, PostOutcome};
pub use crate::domain::ports::{DatabaseAdmin, DeployServer, DumpService, SnapshotFetcher, Storage};
pub use crate::utils::error::Result;
