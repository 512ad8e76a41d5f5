use crate::config::settings::DbSettings;
use crate::domain::ports::DatabaseAdmin;
use crate::utils::error::{CapatrossError, Result};
use crate::utils::validation::validate_identifier;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use std::process::Stdio;

/// Local MySQL server that snapshots are imported into.
#[derive(Debug, Clone)]
pub struct MysqlAdmin {
    dbsettings: DbSettings,
    mysqlbin: String,
}

impl MysqlAdmin {
    pub fn new(dbsettings: DbSettings, mysqlbin: impl Into<String>) -> Self {
        Self {
            dbsettings,
            mysqlbin: mysqlbin.into(),
        }
    }

    /// Connection options without a default schema.
    fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new().charset("utf8mb4");
        if let Some(socket) = &self.dbsettings.socket {
            options = options.socket(socket);
        } else {
            options = options.host(self.dbsettings.host.as_deref().unwrap_or("localhost"));
        }
        if let Some(port) = self.dbsettings.port {
            options = options.port(port);
        }
        if let Some(username) = &self.dbsettings.username {
            options = options.username(username);
        }
        if let Some(password) = &self.dbsettings.password {
            options = options.password(password);
        }
        options
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        Ok(self.connect_options().connect().await?)
    }

    async fn show_tables(conn: &mut MySqlConnection, database: &str) -> Result<Vec<String>> {
        validate_identifier("database", database)?;
        let tables: Vec<String> = sqlx::query_scalar(&format!("SHOW TABLES FROM `{}`", database))
            .fetch_all(&mut *conn)
            .await?;
        Ok(tables)
    }

    /// Arguments for the `mysql` client, database name last.
    pub fn import_args(&self, database: &str) -> Vec<String> {
        let mut args = vec!["--default-character-set=utf8".to_string()];
        if let Some(socket) = &self.dbsettings.socket {
            args.push(format!("--socket={}", socket));
        } else if let Some(host) = &self.dbsettings.host {
            args.push(format!("--host={}", host));
        }
        if let Some(port) = self.dbsettings.port {
            args.push(format!("--port={}", port));
        }
        if let Some(username) = &self.dbsettings.username {
            args.push(format!("--user={}", username));
        }
        if let Some(password) = &self.dbsettings.password {
            args.push(format!("--password={}", password));
        }
        args.push(database.to_string());
        args
    }

    /// The import as a shell line, with the password masked.
    pub fn import_command_display(&self, database: &str, file: &Path) -> String {
        let mut parts = vec![self.mysqlbin.clone()];
        parts.extend(self.import_args(database).into_iter().map(|arg| {
            if arg.starts_with("--password=") {
                "--password=********".to_string()
            } else {
                shell_escape::escape(arg.into()).into_owned()
            }
        }));
        format!(
            "{} < {}",
            parts.join(" "),
            shell_escape::escape(file.to_string_lossy())
        )
    }
}

#[async_trait]
impl DatabaseAdmin for MysqlAdmin {
    async fn table_count(&self, database: &str) -> Result<usize> {
        let tables = async {
            let mut conn = self.connect().await?;
            let tables = Self::show_tables(&mut conn, database).await?;
            conn.close().await?;
            Ok::<_, CapatrossError>(tables)
        }
        .await
        .map_err(|e| {
            tracing::debug!("table count failed: {}", e);
            CapatrossError::database(format!("Unable to connect to the database {}", database))
        })?;
        Ok(tables.len())
    }

    async fn drop_tables(&self, database: &str) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;
        let tables = Self::show_tables(&mut conn, database).await?;

        // dump order is not dependency order
        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut conn)
            .await?;
        for table in &tables {
            tracing::debug!("Dropping {}.{}", database, table);
            let statement = format!(
                "DROP TABLE `{}`.`{}`",
                database,
                table.replace('`', "``")
            );
            sqlx::query(&statement).execute(&mut conn).await?;
        }
        sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
            .execute(&mut conn)
            .await?;
        conn.close().await?;

        Ok(tables)
    }

    async fn import_file(&self, database: &str, file: &Path) -> Result<()> {
        validate_identifier("database", database)?;
        tracing::info!("Running {}", self.import_command_display(database, file));

        let input = std::fs::File::open(file)?;
        let output = tokio::process::Command::new(&self.mysqlbin)
            .args(self.import_args(database))
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CapatrossError::CommandError {
                command: self.mysqlbin.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapatrossError::CommandError {
                command: self.mysqlbin.clone(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn admin() -> MysqlAdmin {
        MysqlAdmin::new(
            DbSettings {
                host: Some("localhost".to_string()),
                username: Some("root".to_string()),
                password: Some("p@ss word".to_string()),
                ..Default::default()
            },
            "mysql",
        )
    }

    #[test]
    fn test_import_args() {
        assert_eq!(
            admin().import_args("darmok_development"),
            vec![
                "--default-character-set=utf8",
                "--host=localhost",
                "--user=root",
                "--password=p@ss word",
                "darmok_development",
            ]
        );
    }

    #[test]
    fn test_socket_wins_over_host() {
        let admin = MysqlAdmin::new(
            DbSettings {
                host: Some("db.local".to_string()),
                socket: Some("/tmp/mysql.sock".to_string()),
                ..Default::default()
            },
            "/usr/local/bin/mysql",
        );
        let args = admin.import_args("aae");
        assert!(args.contains(&"--socket=/tmp/mysql.sock".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--host")));
    }

    #[test]
    fn test_import_command_display_masks_password() {
        let display = admin().import_command_display(
            "darmok_development",
            &PathBuf::from("/tmp/darmok_production"),
        );
        assert_eq!(
            display,
            "mysql --default-character-set=utf8 --host=localhost --user=root --password=******** darmok_development < /tmp/darmok_production"
        );
    }

    #[tokio::test]
    async fn test_import_rejects_unsafe_database_name() {
        let err = admin()
            .import_file("x; rm -rf /", Path::new("/tmp/nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CapatrossError::InvalidConfigValueError { .. }));
    }

    #[tokio::test]
    async fn test_missing_mysql_binary_is_a_command_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("dump.sql");
        std::fs::write(&file, "SELECT 1;").unwrap();

        let admin = MysqlAdmin::new(DbSettings::default(), "/nonexistent/capatross-mysql");
        let err = admin.import_file("darmok", &file).await.unwrap_err();
        assert!(matches!(err, CapatrossError::CommandError { .. }));
    }
}
