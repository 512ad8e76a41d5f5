use crate::config::Settings;
use crate::domain::model::DumpInfo;
use crate::domain::ports::DumpService;
use crate::utils::error::{CapatrossError, Result};
use crate::utils::format::{humanize_bytes, local_timestamp};
use std::path::{Path, PathBuf};

const LOCAL_DIR: &str = "/tmp";
const LAST_DUMPED_FORMAT: &str = "%Y/%m/%d %H:%M %Z";

/// A database snapshot of one application, and where it lands locally.
#[derive(Debug, Clone)]
pub struct Snapshot {
    appname: String,
    dbtype: String,
    database: String,
    localfile_override: Option<PathBuf>,
    dumpinfo: Option<DumpInfo>,
}

impl Snapshot {
    pub fn new(
        settings: &Settings,
        appname: &str,
        dbtype: &str,
        localfile: Option<&str>,
    ) -> Result<Self> {
        if !settings.known_applications().iter().any(|a| a == appname) {
            return Err(CapatrossError::ValidationError {
                message: format!("invalid application name {}", appname),
            });
        }
        let database = settings.database_name_for(appname).ok_or_else(|| {
            CapatrossError::MissingConfigError {
                field: format!("getdata.applications.{}", appname),
            }
        })?;

        Ok(Self {
            appname: appname.to_string(),
            dbtype: dbtype.to_string(),
            database: database.to_string(),
            localfile_override: localfile.map(PathBuf::from),
            dumpinfo: None,
        })
    }

    pub fn appname(&self) -> &str {
        &self.appname
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn has_localfile_override(&self) -> bool {
        self.localfile_override.is_some()
    }

    /// Asks the server about the snapshot once; later calls reuse the answer.
    pub async fn load_dumpinfo<D: DumpService + ?Sized>(&mut self, service: &D) -> Result<&DumpInfo> {
        if self.dumpinfo.is_none() {
            let info = service.dumpinfo(&self.appname, &self.dbtype).await?;
            tracing::debug!("dumpinfo for {}: {:?}", self.appname, info);
            self.dumpinfo = Some(info);
        }
        self.dumpinfo
            .as_ref()
            .ok_or_else(|| CapatrossError::remote("dumpinfo unavailable"))
    }

    /// Remote path of the gzip-compressed dump.
    pub fn remotefile(&self) -> Option<&str> {
        self.dumpinfo.as_ref().and_then(|info| info.file.as_deref())
    }

    /// `/tmp/<remote name without .gz>_<dbtype>` unless given explicitly.
    pub fn localfile(&self) -> Result<PathBuf> {
        if let Some(path) = &self.localfile_override {
            return Ok(path.clone());
        }
        let remotefile = self.remotefile().ok_or_else(|| {
            CapatrossError::remote(format!(
                "Missing file in dump information for {}.",
                self.appname
            ))
        })?;
        Ok(default_localfile(remotefile, &self.dbtype))
    }

    pub fn localfile_downloaded(&self) -> Result<PathBuf> {
        let mut name = self.localfile()?.into_os_string();
        name.push(".gz");
        Ok(PathBuf::from(name))
    }

    pub fn last_dumped(&self) -> String {
        local_timestamp(
            self.dumpinfo
                .as_ref()
                .and_then(|info| info.last_dumped_at.as_deref()),
            LAST_DUMPED_FORMAT,
        )
    }

    pub fn humanize_size(&self) -> String {
        self.dumpinfo
            .as_ref()
            .and_then(|info| info.size)
            .map(humanize_bytes)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

pub fn default_localfile(remotefile: &str, dbtype: &str) -> PathBuf {
    let basename = Path::new(remotefile)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| remotefile.to_string());
    let stem = basename.strip_suffix(".gz").unwrap_or(&basename);
    Path::new(LOCAL_DIR).join(format!("{}_{}", stem, dbtype))
}
