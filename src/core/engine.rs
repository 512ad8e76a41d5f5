use crate::adapters::gzip;
use crate::core::snapshot::Snapshot;
use crate::domain::ports::{DatabaseAdmin, DumpService, SnapshotFetcher};
use crate::utils::error::{CapatrossError, Result};
use crate::utils::progress::{with_wait_spinner, DownloadProgress};
use std::io::Write;
use std::path::PathBuf;

/// Drives a snapshot through describe, download, decompress, drop and import.
pub struct SnapshotEngine<S: DumpService, F: SnapshotFetcher, D: DatabaseAdmin> {
    service: S,
    fetcher: F,
    database: D,
    show_progress: bool,
}

impl<S: DumpService, F: SnapshotFetcher, D: DatabaseAdmin> SnapshotEngine<S, F, D> {
    pub fn new(service: S, fetcher: F, database: D) -> Self {
        Self {
            service,
            fetcher,
            database,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Fetches dumpinfo and prints its summary. Fails when the server has no
    /// usable snapshot.
    pub async fn describe(&self, snapshot: &mut Snapshot) -> Result<()> {
        let appname = snapshot.appname().to_string();
        let info = snapshot.load_dumpinfo(&self.service).await?;

        if !info.success {
            return Err(CapatrossError::remote(format!(
                "Unable to get database dump information for {}. Reason {}",
                appname,
                info.reason()
            )));
        }
        if info.file.is_none() {
            return Err(CapatrossError::remote(format!(
                "Missing file in dump information for {}.",
                appname
            )));
        }

        println!(
            "Data dump for {} Size: {} Last dumped at: {}",
            appname,
            snapshot.humanize_size(),
            snapshot.last_dumped()
        );
        Ok(())
    }

    pub async fn download(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let remotefile = snapshot.remotefile().ok_or_else(|| {
            CapatrossError::remote(format!(
                "Missing file in dump information for {}.",
                snapshot.appname()
            ))
        })?;
        let target = snapshot.localfile_downloaded()?;

        println!(
            "Starting download of {} from {} and saving to {}...",
            remotefile,
            self.fetcher.remote_host(),
            target.display()
        );

        let progress = DownloadProgress::new(self.show_progress);
        let report = |sent: u64, total: u64| progress.update(sent, total);
        match self.fetcher.fetch(remotefile, &target, &report).await {
            Ok(bytes) => {
                progress.finish();
                tracing::info!("Downloaded {} bytes to {}", bytes, target.display());
                Ok(target)
            }
            Err(e) => {
                progress.abandon();
                Err(e)
            }
        }
    }

    pub async fn decompress(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let source = snapshot.localfile_downloaded()?;
        let target = snapshot.localfile()?;
        println!("Decompressing {}...", source.display());
        gzip::gunzip(&source, &target).await?;
        Ok(target)
    }

    pub async fn drop_tables(&self, snapshot: &Snapshot) -> Result<usize> {
        println!(
            "Dropping the database tables for {}",
            snapshot.database_name()
        );
        let dropped = self.database.drop_tables(snapshot.database_name()).await?;
        tracing::info!(
            "Dropped {} tables from {}",
            dropped.len(),
            snapshot.database_name()
        );
        Ok(dropped.len())
    }

    pub async fn import(&self, snapshot: &Snapshot) -> Result<()> {
        let localfile = snapshot.localfile()?;
        print!(
            "Importing data into {} (this might take a while)... ",
            snapshot.database_name()
        );
        std::io::stdout().flush()?;

        with_wait_spinner(
            self.show_progress,
            self.database
                .import_file(snapshot.database_name(), &localfile),
        )
        .await?;

        println!(" done!");
        Ok(())
    }

    /// Confirms the local database is reachable before anything destructive.
    pub async fn check_database(&self, snapshot: &Snapshot) -> Result<usize> {
        let count = self.database.table_count(snapshot.database_name()).await?;
        tracing::debug!("{} has {} tables", snapshot.database_name(), count);
        Ok(count)
    }

    /// `downloaddata`: describe, then download.
    pub async fn download_data(&self, snapshot: &mut Snapshot) -> Result<PathBuf> {
        self.describe(snapshot).await?;
        self.download(snapshot).await
    }

    /// `getdata`: describe, download, decompress, drop tables, import.
    pub async fn get_data(&self, snapshot: &mut Snapshot) -> Result<()> {
        self.describe(snapshot).await?;
        self.check_database(snapshot).await?;
        self.download(snapshot).await?;
        self.decompress(snapshot).await?;
        self.drop_tables(snapshot).await?;
        self.import(snapshot).await
    }

    /// `importdata`: decompress a pending download if present, then drop
    /// tables and import.
    pub async fn import_data(&self, snapshot: &mut Snapshot) -> Result<()> {
        if !snapshot.has_localfile_override() {
            let appname = snapshot.appname().to_string();
            let info = snapshot.load_dumpinfo(&self.service).await?;
            if !info.success || info.file.is_none() {
                return Err(CapatrossError::ValidationError {
                    message: format!(
                        "The data import file for {} does not exist. Run capatross getdata or capatross downloaddata to download the file (Reason {})",
                        appname,
                        info.reason()
                    ),
                });
            }
        }

        if snapshot.localfile_downloaded()?.exists() {
            self.decompress(snapshot).await?;
        }

        let localfile = snapshot.localfile()?;
        if !localfile.exists() {
            return Err(CapatrossError::ValidationError {
                message: format!(
                    "The specified data import file: {} does not exist. Run capatross getdata or capatross downloaddata to download the file",
                    localfile.display()
                ),
            });
        }

        self.check_database(snapshot).await?;
        self.drop_tables(snapshot).await?;
        self.import(snapshot).await
    }
}
