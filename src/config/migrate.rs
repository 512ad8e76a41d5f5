//! Conversion of the legacy `~/.capatross.yml` into `~/capatross.toml`.

use crate::utils::error::{CapatrossError, Result};
use std::path::Path;

/// Reads legacy YAML settings and renders the equivalent TOML document.
pub fn migrate_yaml_str(yaml: &str) -> Result<String> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let mut table = match yaml_to_toml(parsed) {
        Some(toml::Value::Table(table)) => table,
        Some(_) => {
            return Err(CapatrossError::ValidationError {
                message: "Legacy settings must be a mapping at the top level".to_string(),
            })
        }
        None => toml::Table::new(),
    };

    // getdata.data_key became the top-level capatross_key
    let data_key = table
        .get_mut("getdata")
        .and_then(toml::Value::as_table_mut)
        .and_then(|getdata| getdata.remove("data_key"));
    if let Some(key) = data_key {
        table.insert("capatross_key".to_string(), key);
    }

    Ok(toml::to_string_pretty(&table)?)
}

pub fn migrate_file(yaml_path: &Path, toml_path: &Path) -> Result<()> {
    let yaml = std::fs::read_to_string(yaml_path)?;
    let rendered = migrate_yaml_str(&yaml)?;
    std::fs::write(toml_path, rendered)?;
    tracing::info!(
        "Migrated {} to {}",
        yaml_path.display(),
        toml_path.display()
    );
    Ok(())
}

fn yaml_to_toml(value: serde_yaml::Value) -> Option<toml::Value> {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => None,
        Yaml::Bool(b) => Some(toml::Value::Boolean(b)),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(toml::Value::Integer(i))
            } else {
                n.as_f64().map(toml::Value::Float)
            }
        }
        Yaml::String(s) => Some(toml::Value::String(s)),
        Yaml::Sequence(items) => Some(toml::Value::Array(
            items.into_iter().filter_map(yaml_to_toml).collect(),
        )),
        Yaml::Mapping(mapping) => {
            let mut table = toml::Table::new();
            for (key, value) in mapping {
                let Some(key) = yaml_key(key) else {
                    continue;
                };
                if let Some(value) = yaml_to_toml(value) {
                    table.insert(key, value);
                }
            }
            Some(toml::Value::Table(table))
        }
        Yaml::Tagged(tagged) => yaml_to_toml(tagged.value),
    }
}

// Ruby-style symbol keys (":getdata") lose their colon.
fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    let key = match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(key.trim_start_matches(':').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::Settings;
    use tempfile::TempDir;

    const LEGACY: &str = r#"
albatross_uri: https://deploys.example.org
getdata:
  data_key: legacykey
  host: data.example.org
  port: 2200
  dbsettings:
    username: root
    password: ~
  applications:
    darmok: darmok_development
    aae: aae_development
"#;

    #[test]
    fn test_data_key_moves_to_capatross_key() {
        let rendered = migrate_yaml_str(LEGACY).unwrap();
        let settings = Settings::from_toml_str(&rendered).unwrap();

        assert_eq!(settings.capatross_key(), "legacykey");
        assert_eq!(settings.albatross_uri, "https://deploys.example.org");
        assert_eq!(settings.getdata.port, 2200);
        assert_eq!(settings.known_applications(), vec!["aae", "darmok"]);
        assert!(!rendered.contains("data_key"));
    }

    #[test]
    fn test_nulls_are_dropped() {
        let rendered = migrate_yaml_str(LEGACY).unwrap();
        let settings = Settings::from_toml_str(&rendered).unwrap();
        let dbsettings = settings.getdata.dbsettings.unwrap();
        assert_eq!(dbsettings.username.as_deref(), Some("root"));
        assert!(dbsettings.password.is_none());
    }

    #[test]
    fn test_symbol_keys() {
        let rendered = migrate_yaml_str(":getdata:\n  :data_key: symbolkey\n").unwrap();
        assert!(rendered.contains("capatross_key = \"symbolkey\""));
    }

    #[test]
    fn test_empty_and_scalar_documents() {
        assert_eq!(migrate_yaml_str("").unwrap().trim(), "");
        assert!(migrate_yaml_str("just a string").is_err());
    }

    #[test]
    fn test_migrate_file_writes_toml() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join(".capatross.yml");
        let toml_path = dir.path().join("capatross.toml");
        std::fs::write(&yaml, LEGACY).unwrap();

        migrate_file(&yaml, &toml_path).unwrap();

        let settings = Settings::load_from(&[toml_path]).unwrap();
        assert_eq!(settings.getdata.host, "data.example.org");
    }
}
