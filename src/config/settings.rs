use crate::utils::error::{CapatrossError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "capatross.toml";
pub const LEGACY_SETTINGS_FILE: &str = ".capatross.yml";

const DEFAULT_SETTINGS: &str = r#"
albatross_uri = "https://engineering.extension.org"
albatross_deploy_path = "/deploys"

[getdata]
host = "engineering.extension.org"
user = "getdata"
port = 24
mysqlbin = "mysql"
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub capatross_key: Option<String>,
    pub albatross_uri: String,
    pub albatross_deploy_path: String,
    pub getdata: GetDataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDataSettings {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub mysqlbin: String,
    pub ssh_key: Option<PathBuf>,
    pub dbsettings: Option<DbSettings>,
    pub applications: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Home directory paths for the user level settings files.
pub fn home_settings_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(SETTINGS_FILE))
}

pub fn legacy_settings_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(LEGACY_SETTINGS_FILE))
}

pub fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| CapatrossError::config("Unable to determine your home directory"))
}

impl Settings {
    /// Defaults, then `~/capatross.toml`, then `./capatross.toml`.
    pub fn load() -> Result<Self> {
        let layers = [home_settings_path()?, PathBuf::from(SETTINGS_FILE)];
        Self::load_from(&layers)
    }

    /// Merges each existing file in `paths` over the defaults.
    pub fn load_from<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_SETTINGS)?;

        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                tracing::debug!("Settings file {} not present, skipping", path.display());
                continue;
            }
            tracing::debug!("Loading settings from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let layer = Self::parse_table(&content).map_err(|e| {
                CapatrossError::config(format!("{}: {}", path.display(), e))
            })?;
            deep_merge(&mut merged, layer);
        }

        Self::from_table(merged)
    }

    /// Parses a single settings document layered over the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_SETTINGS)?;
        deep_merge(&mut merged, Self::parse_table(content)?);
        Self::from_table(merged)
    }

    fn parse_table(content: &str) -> Result<toml::Table> {
        let processed_content = substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        Ok(toml::Value::Table(table).try_into()?)
    }

    pub fn has_capatross_key(&self) -> bool {
        self.capatross_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn capatross_key(&self) -> &str {
        self.capatross_key.as_deref().unwrap_or_default()
    }

    pub fn known_applications(&self) -> Vec<String> {
        self.getdata
            .applications
            .as_ref()
            .map(|apps| apps.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn database_name_for(&self, appname: &str) -> Option<&str> {
        self.getdata
            .applications
            .as_ref()
            .and_then(|apps| apps.get(appname))
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("albatross_uri", &self.albatross_uri)?;
        validate_positive_number("getdata.port", self.getdata.port as usize, 1)?;
        validate_non_empty_string("getdata.host", &self.getdata.host)?;
        validate_non_empty_string("getdata.user", &self.getdata.user)?;
        validate_non_empty_string("getdata.mysqlbin", &self.getdata.mysqlbin)?;
        if !self.albatross_deploy_path.starts_with('/') {
            return Err(CapatrossError::InvalidConfigValueError {
                field: "albatross_deploy_path".to_string(),
                value: self.albatross_deploy_path.clone(),
                reason: "Path must start with '/'".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// Replaces `${VAR}` with the environment value, leaving unset variables untouched.
pub fn substitute_env_vars(content: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        Regex::new(r"\$\{([^}]+)\}").unwrap_or_else(|e| panic!("invalid env var pattern: {e}"))
    });

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}

/// Tables merge key by key; everything else in `overlay` replaces `base`.
pub fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                deep_merge(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
