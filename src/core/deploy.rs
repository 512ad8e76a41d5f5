use crate::domain::model::{DeployLog, PostOutcome};
use crate::domain::ports::{DeployServer, Storage};
use crate::utils::error::{CapatrossError, Result};

pub const LOGS_DIR: &str = "./capatross_logs";
const LOG_EXTENSION: &str = "json";

/// Result of posting one deploy log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    pub capatross_id: String,
    pub url: String,
    pub outcome: PostOutcome,
}

impl PostReport {
    pub fn posted(&self) -> bool {
        self.outcome.success
    }
}

/// Counts from one `sync` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub posted: usize,
    pub rejected: usize,
    /// Logs that could not be sent at all.
    pub errors: usize,
}

impl SyncSummary {
    pub fn attempted(&self) -> usize {
        self.posted + self.rejected + self.errors
    }
}

/// Deploy logs on disk and the server they get posted to.
pub struct DeployLogs<S: Storage, P: DeployServer> {
    storage: S,
    server: P,
}

impl<S: Storage, P: DeployServer> DeployLogs<S, P> {
    pub fn new(storage: S, server: P) -> Self {
        Self { storage, server }
    }

    pub fn logs_present(&self) -> bool {
        self.storage.exists()
    }

    pub fn deploy_url(&self) -> String {
        self.server.deploy_url()
    }

    /// Every log in file name order, optionally without the captured output.
    pub async fn deploy_logs(&self, strip_output: bool) -> Result<Vec<DeployLog>> {
        let mut logs = Vec::new();
        for name in self.storage.list_files(LOG_EXTENSION).await? {
            let mut log = self.parse(&name).await?;
            if strip_output {
                log.strip_output();
            }
            logs.push(log);
        }
        Ok(logs)
    }

    /// Logs for `capatross list`, oldest deploy first.
    pub async fn list(&self) -> Result<Vec<DeployLog>> {
        let mut logs = self.deploy_logs(true).await?;
        logs.sort_by_key(|log| log.start());
        Ok(logs)
    }

    pub async fn read(&self, capatross_id: &str) -> Result<DeployLog> {
        let name = Self::file_name(capatross_id);
        let data = self.storage.read_file(&name).await.map_err(|e| {
            tracing::debug!("reading {} failed: {}", name, e);
            CapatrossError::ValidationError {
                message: format!(
                    "The specified capatross log ({}) was not found",
                    capatross_id
                ),
            }
        })?;
        Self::decode(&name, &data)
    }

    pub async fn write(&self, file_name: &str, log: &DeployLog) -> Result<()> {
        let data = serde_json::to_vec(log)?;
        self.storage.write_file(file_name, &data).await
    }

    /// Posts (or reposts) one log and records success in its file.
    pub async fn post(&self, capatross_id: &str) -> Result<PostReport> {
        let log = self.read(capatross_id).await?;
        self.post_log(&Self::file_name(capatross_id), log).await
    }

    /// Posts every log not yet marked `finish_posted`, handing each result
    /// to `on_result` as soon as it is known. A failed log does not stop the
    /// ones after it.
    pub async fn sync<F>(&self, mut on_result: F) -> Result<SyncSummary>
    where
        F: FnMut(&str, &Result<PostReport>),
    {
        let mut summary = SyncSummary::default();
        for log in self.deploy_logs(false).await? {
            if log.finish_posted() {
                continue;
            }
            let capatross_id = log.capatross_id();
            let result = self.post_log(&Self::file_name(&capatross_id), log).await;
            match &result {
                Ok(report) if report.posted() => summary.posted += 1,
                Ok(_) => summary.rejected += 1,
                Err(e) => {
                    tracing::warn!("Posting {} failed: {}", capatross_id, e);
                    summary.errors += 1;
                }
            }
            on_result(&capatross_id, &result);
        }
        Ok(summary)
    }

    async fn post_log(&self, file_name: &str, mut log: DeployLog) -> Result<PostReport> {
        log.mark_from_cli();
        let outcome = self.server.post_deploy_log(&log).await?;

        if outcome.success {
            log.mark_posted();
            self.write(file_name, &log).await?;
        } else {
            tracing::warn!(
                "Posting {} returned status {}",
                log.capatross_id(),
                outcome.status
            );
        }

        Ok(PostReport {
            capatross_id: log.capatross_id(),
            url: self.server.deploy_url(),
            outcome,
        })
    }

    async fn parse(&self, name: &str) -> Result<DeployLog> {
        let data = self.storage.read_file(name).await?;
        Self::decode(name, &data)
    }

    fn decode(name: &str, data: &[u8]) -> Result<DeployLog> {
        serde_json::from_slice(data).map_err(|e| CapatrossError::ValidationError {
            message: format!("{} is not a valid deploy log: {}", name, e),
        })
    }

    fn file_name(capatross_id: &str) -> String {
        format!("{}.{}", capatross_id, LOG_EXTENSION)
    }
}
