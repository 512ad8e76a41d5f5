use crate::adapters::{AlbatrossClient, LocalStorage, MysqlAdmin, ScpFetcher};
use crate::app::prompt;
use crate::config::settings::{home_settings_path, legacy_settings_path};
use crate::config::{
    migrate, AppArgs, CliConfig, Command, DumpArgs, Settings, SnapshotArgs, PROMPT,
};
use crate::core::deploy::{DeployLogs, PostReport, LOGS_DIR};
use crate::core::engine::SnapshotEngine;
use crate::core::snapshot::Snapshot;
use crate::domain::ports::DumpService;
use crate::utils::error::{CapatrossError, Result};
use crate::utils::format::local_timestamp;
use crate::utils::validation::{validate_non_empty_string, Validate};
use colored::Colorize;
use std::path::Path;

const KEY_URL: &str = "https://engineering.extension.org";
const DUMPINFO_DATE_FORMAT: &str = "%A, %B %e, %Y, %l:%M %p %Z";

pub async fn run(config: CliConfig) -> Result<()> {
    match config.command {
        Command::Setup { force } => setup(force),
        Command::About => {
            about();
            Ok(())
        }
        command => {
            let settings = Settings::load()?;
            settings.validate()?;
            run_with_settings(&settings, command).await
        }
    }
}

pub async fn run_with_settings(settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Setup { force } => setup(force),
        Command::About => {
            about();
            Ok(())
        }
        Command::List => list(settings).await,
        Command::Post { log } => post(settings, &log).await,
        Command::Sync => sync(settings).await,
        Command::Showsettings => {
            println!("{}", settings.to_toml_string()?);
            Ok(())
        }
        Command::Dumpinfo(args) => dumpinfo(settings, &args).await,
        Command::Dodump(args) => dodump(settings, &args).await,
        Command::Docopy(args) => docopy(settings, &args).await,
        Command::Downloaddata(args) => downloaddata(settings, &args).await,
        Command::Getdata(args) => getdata(settings, &args).await,
        Command::Importdata(args) => importdata(settings, &args).await,
    }
}

fn about() {
    println!(
        "Capatross Version {}: Post logs from a capistrano deploy to the deployment server, as well as a custom deploy-tracking application.",
        env!("CARGO_PKG_VERSION")
    );
}

fn setup(force: bool) -> Result<()> {
    setup_at(
        &legacy_settings_path()?,
        &home_settings_path()?,
        force,
        || prompt::ask_password("Registration key: "),
    )
}

/// Migrates `legacy` into `target`, or registers a key read by `ask_key`.
pub fn setup_at<F>(legacy: &Path, target: &Path, force: bool, ask_key: F) -> Result<()>
where
    F: FnOnce() -> Result<String>,
{
    if legacy.exists() && !target.exists() {
        println!(
            "Found {} - converting to {}",
            legacy.display(),
            target.display()
        );
        migrate::migrate_file(legacy, target)?;
        println!(
            "Converted old configuration settings. You can now remove {}",
            legacy.display()
        );
        return Ok(());
    }

    if target.exists() && !force {
        return Err(CapatrossError::config(format!(
            "Your capatross configuration file ({}) already exists, use --force to overwrite",
            target.display()
        )));
    }

    let key = ask_key()?;
    validate_non_empty_string("capatross_key", &key)?;
    let mut table = toml::Table::new();
    table.insert("capatross_key".to_string(), toml::Value::String(key.trim().to_string()));
    std::fs::write(target, toml::to_string_pretty(&table)?)?;
    println!("Wrote configuration key to {}", target.display());
    Ok(())
}

fn deploy_logs(settings: &Settings) -> Result<DeployLogs<LocalStorage, AlbatrossClient>> {
    Ok(DeployLogs::new(
        LocalStorage::new(LOGS_DIR),
        AlbatrossClient::from_settings(settings)?,
    ))
}

fn missing_logs_dir() {
    println!(
        "{}",
        format!("Error: Capatross log directory ({}) not present", LOGS_DIR).red()
    );
}

async fn list(settings: &Settings) -> Result<()> {
    let logs = deploy_logs(settings)?;
    if !logs.logs_present() {
        missing_logs_dir();
    }

    for log in logs.list().await? {
        if log.finish_posted() {
            println!("{} (posted)", log.summary());
        } else {
            println!("{}", format!("{} (not posted)", log.summary()).yellow());
        }
    }
    Ok(())
}

fn print_post_report(report: &PostReport, label: &str) {
    if report.posted() {
        println!("{} posted to {}", label, report.url);
    } else {
        let subject = if label == "Log data" {
            "log data".to_string()
        } else {
            label.to_string()
        };
        println!(
            "{}",
            format!(
                "Unable to post {} to {} (Code: {})",
                subject, report.url, report.outcome.status
            )
            .red()
        );
    }
}

async fn post(settings: &Settings, capatross_id: &str) -> Result<()> {
    let logs = deploy_logs(settings)?;
    let report = logs.post(capatross_id).await?;
    print_post_report(&report, "Log data");
    Ok(())
}

async fn sync(settings: &Settings) -> Result<()> {
    let logs = deploy_logs(settings)?;
    if !logs.logs_present() {
        missing_logs_dir();
    }

    let deploy_url = logs.deploy_url();
    let summary = logs
        .sync(|capatross_id, result| match result {
            Ok(report) => print_post_report(report, &format!("{} data", capatross_id)),
            Err(e) => println!(
                "{}",
                format!(
                    "Unable to post {} data to {}: {}",
                    capatross_id,
                    deploy_url,
                    e.user_friendly_message()
                )
                .red()
            ),
        })
        .await?;

    tracing::info!(
        "sync: {} posted, {} rejected, {} failed",
        summary.posted,
        summary.rejected,
        summary.errors
    );
    if summary.errors > 0 {
        return Err(CapatrossError::remote(format!(
            "{} of {} deploy logs could not be sent to {}",
            summary.errors,
            summary.attempted(),
            deploy_url
        )));
    }
    Ok(())
}

fn require_capatross_key(settings: &Settings) -> Result<()> {
    if settings.has_capatross_key() {
        Ok(())
    } else {
        Err(CapatrossError::config(format!(
            "Please go to {} to obtain your capatross key and run 'capatross setup'",
            KEY_URL
        )))
    }
}

/// Turns the `--appname` value into a configured application, asking when
/// it is `prompt` or unknown.
fn resolve_appname(settings: &Settings, args: &AppArgs) -> Result<String> {
    let application_list = settings.known_applications();
    if application_list.is_empty() {
        return Err(CapatrossError::MissingConfigError {
            field: "getdata.applications".to_string(),
        });
    }

    let appname = args.appname.to_lowercase();
    if appname == PROMPT {
        return prompt::ask_application(&application_list);
    }
    if !application_list.contains(&appname) {
        println!(
            "{} is not a configured application. Configured applications are: {}",
            appname,
            application_list.join(", ")
        );
        return prompt::ask_application(&application_list);
    }
    Ok(appname)
}

/// Local database settings needed before a snapshot can be imported.
pub fn check_database_name_for<'a>(settings: &'a Settings, appname: &str) -> Result<&'a str> {
    if settings.getdata.dbsettings.is_none() {
        return Err(CapatrossError::MissingConfigError {
            field: "getdata.dbsettings".to_string(),
        });
    }
    if settings.getdata.applications.is_none() {
        return Err(CapatrossError::MissingConfigError {
            field: format!("getdata.applications['{}']", appname),
        });
    }
    settings.database_name_for(appname).ok_or_else(|| {
        CapatrossError::config(format!(
            "No database specified in your capatross settings for {}",
            appname
        ))
    })
}

async fn dumpinfo(settings: &Settings, args: &DumpArgs) -> Result<()> {
    require_capatross_key(settings)?;
    let appname = resolve_appname(settings, &args.app)?;
    let client = AlbatrossClient::from_settings(settings)?;

    let result = client.dumpinfo(&appname, &args.dbtype).await?;
    if !result.success {
        return Err(CapatrossError::remote(format!(
            "Unable to get database dump information for {}.\nReason: {}",
            appname,
            result.reason()
        )));
    }
    if result.file.is_none() {
        return Err(CapatrossError::remote(format!(
            "Missing file in dump information for {}.",
            appname
        )));
    }

    println!(
        "Last dumped: {}",
        local_timestamp(result.last_dumped_at.as_deref(), DUMPINFO_DATE_FORMAT)
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn dodump(settings: &Settings, args: &DumpArgs) -> Result<()> {
    require_capatross_key(settings)?;
    let appname = resolve_appname(settings, &args.app)?;
    let client = AlbatrossClient::from_settings(settings)?;

    let result = client.request_dump(&appname, &args.dbtype).await?;
    if !result.success {
        return Err(CapatrossError::remote(format!(
            "Unable to request a {} database dump for {}. Reason {}",
            args.dbtype,
            appname,
            result.reason()
        )));
    }
    println!("{}", result.message.as_deref().unwrap_or("Unknown result"));
    Ok(())
}

async fn docopy(settings: &Settings, args: &AppArgs) -> Result<()> {
    require_capatross_key(settings)?;
    let appname = resolve_appname(settings, args)?;
    let client = AlbatrossClient::from_settings(settings)?;

    let result = client.request_copy(&appname).await?;
    if !result.success {
        return Err(CapatrossError::remote(format!(
            "Unable to request a database copy for {}. Reason {}",
            appname,
            result.reason()
        )));
    }
    println!("{}", result.message.as_deref().unwrap_or("Unknown result"));
    Ok(())
}

fn snapshot_for(settings: &Settings, args: &SnapshotArgs) -> Result<Snapshot> {
    require_capatross_key(settings)?;
    let appname = resolve_appname(settings, &args.dump.app)?;
    check_database_name_for(settings, &appname)?;
    Snapshot::new(
        settings,
        &appname,
        &args.dump.dbtype,
        args.localfile_override(),
    )
}

fn engine_for(settings: &Settings) -> Result<SnapshotEngine<AlbatrossClient, ScpFetcher, MysqlAdmin>> {
    let dbsettings = settings.getdata.dbsettings.clone().unwrap_or_default();
    Ok(SnapshotEngine::new(
        AlbatrossClient::from_settings(settings)?,
        ScpFetcher::from_settings(settings)?,
        MysqlAdmin::new(dbsettings, settings.getdata.mysqlbin.clone()),
    ))
}

async fn downloaddata(settings: &Settings, args: &SnapshotArgs) -> Result<()> {
    let mut snapshot = snapshot_for(settings, args)?;
    engine_for(settings)?.download_data(&mut snapshot).await?;
    Ok(())
}

async fn getdata(settings: &Settings, args: &SnapshotArgs) -> Result<()> {
    let mut snapshot = snapshot_for(settings, args)?;
    engine_for(settings)?.get_data(&mut snapshot).await
}

async fn importdata(settings: &Settings, args: &SnapshotArgs) -> Result<()> {
    let mut snapshot = snapshot_for(settings, args)?;
    engine_for(settings)?.import_data(&mut snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(extra: &str) -> Settings {
        Settings::from_toml_str(extra).unwrap()
    }

    #[test]
    fn test_key_is_required() {
        let err = require_capatross_key(&settings("")).unwrap_err();
        assert!(err.user_friendly_message().contains("capatross setup"));
        assert!(require_capatross_key(&settings("capatross_key = \"k\"")).is_ok());
    }

    #[test]
    fn test_check_database_name_for() {
        let err = check_database_name_for(&settings(""), "darmok").unwrap_err();
        assert_eq!(
            err.user_friendly_message(),
            "Please set getdata.dbsettings in your capatross settings"
        );

        let only_db = settings("[getdata.dbsettings]\nusername = \"root\"\n");
        let err = check_database_name_for(&only_db, "darmok").unwrap_err();
        assert_eq!(
            err.user_friendly_message(),
            "Please set getdata.applications['darmok'] in your capatross settings"
        );

        let full = settings(
            "[getdata.dbsettings]\nusername = \"root\"\n[getdata.applications]\ndarmok = \"darmok_dev\"\n",
        );
        assert_eq!(check_database_name_for(&full, "darmok").unwrap(), "darmok_dev");
        assert!(check_database_name_for(&full, "aae").is_err());
    }

    #[test]
    fn test_known_appname_is_lowercased_without_prompting() {
        let settings = settings("[getdata.applications]\ndarmok = \"darmok_dev\"\n");
        let args = AppArgs {
            appname: "DARMOK".to_string(),
        };
        assert_eq!(resolve_appname(&settings, &args).unwrap(), "darmok");
    }

    #[test]
    fn test_no_applications_configured() {
        let args = AppArgs {
            appname: "darmok".to_string(),
        };
        assert!(matches!(
            resolve_appname(&settings(""), &args),
            Err(CapatrossError::MissingConfigError { .. })
        ));
    }

    fn no_key() -> Result<String> {
        panic!("should not ask for a key")
    }

    #[test]
    fn test_setup_migrates_legacy_yaml() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".capatross.yml");
        let target = dir.path().join("capatross.toml");
        std::fs::write(
            &legacy,
            "albatross_uri: https://albatross.test\ngetdata:\n  data_key: abc123\n",
        )
        .unwrap();

        setup_at(&legacy, &target, false, no_key).unwrap();

        let settings = Settings::load_from(&[&target]).unwrap();
        assert_eq!(settings.capatross_key(), "abc123");
        assert_eq!(settings.albatross_uri, "https://albatross.test");
        assert!(legacy.exists());
    }

    #[test]
    fn test_setup_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".capatross.yml");
        let target = dir.path().join("capatross.toml");
        std::fs::write(&target, "capatross_key = \"old\"\n").unwrap();

        let err = setup_at(&legacy, &target, false, no_key).unwrap_err();

        assert!(err
            .user_friendly_message()
            .ends_with("already exists, use --force to overwrite"));
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "capatross_key = \"old\"\n"
        );
    }

    #[test]
    fn test_setup_writes_key() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".capatross.yml");
        let target = dir.path().join("capatross.toml");

        setup_at(&legacy, &target, false, || Ok("  fresh-key\n".to_string())).unwrap();

        let settings = Settings::load_from(&[&target]).unwrap();
        assert_eq!(settings.capatross_key(), "fresh-key");
    }

    #[test]
    fn test_setup_rejects_blank_key() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".capatross.yml");
        let target = dir.path().join("capatross.toml");

        assert!(setup_at(&legacy, &target, false, || Ok("   ".to_string())).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_setup_force_overwrites_existing_key() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".capatross.yml");
        let target = dir.path().join("capatross.toml");
        std::fs::write(&legacy, ":getdata:\n  :data_key: from-yaml\n").unwrap();
        std::fs::write(&target, "capatross_key = \"old\"\n").unwrap();

        setup_at(&legacy, &target, true, || Ok("new".to_string())).unwrap();

        let settings = Settings::load_from(&[&target]).unwrap();
        assert_eq!(settings.capatross_key(), "new");
    }
}
