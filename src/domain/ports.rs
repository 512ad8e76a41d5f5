use crate::domain::model::{ApiResponse, DeployLog, DumpInfo, PostOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// File names with the given extension, sorted.
    fn list_files(
        &self,
        extension: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
    fn exists(&self) -> bool;
}

/// The albatross dump endpoints.
#[async_trait]
pub trait DumpService: Send + Sync {
    async fn dumpinfo(&self, appname: &str, dbtype: &str) -> Result<DumpInfo>;
    async fn request_dump(&self, appname: &str, dbtype: &str) -> Result<ApiResponse>;
    async fn request_copy(&self, appname: &str) -> Result<ApiResponse>;
}

/// The albatross deploy tracking endpoint.
#[async_trait]
pub trait DeployServer: Send + Sync {
    fn deploy_url(&self) -> String;
    async fn post_deploy_log(&self, log: &DeployLog) -> Result<PostOutcome>;
}

pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    fn remote_host(&self) -> &str;
    /// Copies `remote` to `local`, reporting `(sent, total)` as it goes.
    async fn fetch(&self, remote: &str, local: &Path, progress: ProgressFn<'_>) -> Result<u64>;
}

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn table_count(&self, database: &str) -> Result<usize>;
    async fn drop_tables(&self, database: &str) -> Result<Vec<String>>;
    async fn import_file(&self, database: &str, file: &Path) -> Result<()>;
}
