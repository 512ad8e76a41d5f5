use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapatrossError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Settings parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Settings serialization error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    #[error("Legacy settings parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    SshKeyError(#[from] russh::keys::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Server error: {message}")]
    RemoteError { message: String },

    #[error("Command `{command}` failed: {message}")]
    CommandError { command: String, message: String },

    #[error("Transfer error: {message}")]
    TransferError { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Storage,
    Database,
    External,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CapatrossError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteError {
            message: message.into(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::TransferError {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError(_) => ErrorCategory::Network,
            Self::SshError(_) | Self::SshKeyError(_) | Self::TransferError { .. } => {
                ErrorCategory::Network
            }
            Self::TomlError(_)
            | Self::TomlWriteError(_)
            | Self::YamlError(_)
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::Storage,
            Self::SqlError(_) | Self::DatabaseError { .. } => ErrorCategory::Database,
            Self::RemoteError { .. } | Self::CommandError { .. } => ErrorCategory::External,
            Self::SerializationError(_) | Self::ValidationError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Database | ErrorCategory::External => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::MissingConfigError { .. } | Self::ConfigError { .. } => {
                "Check ~/capatross.toml, or run 'capatross setup'"
            }
            Self::InvalidConfigValueError { .. }
            | Self::TomlError(_)
            | Self::TomlWriteError(_)
            | Self::YamlError(_) => "Fix the reported value in your capatross settings",
            Self::ApiError(_) => {
                "Check your network connection and the albatross_uri setting, then retry"
            }
            Self::RemoteError { .. } => {
                "The server declined the request; check the application name and your capatross key"
            }
            Self::SshError(_) | Self::SshKeyError(_) | Self::TransferError { .. } => {
                "Make sure your SSH key is authorized on the data host (getdata.host)"
            }
            Self::SqlError(_) | Self::DatabaseError { .. } => {
                "Make sure MySQL is running and getdata.dbsettings is correct"
            }
            Self::CommandError { .. } => "Make sure the command is installed and on your PATH",
            Self::IoError(_) => "Check file permissions and available disk space",
            Self::SerializationError(_) | Self::ValidationError { .. } => {
                "The data was not in the expected format"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::RemoteError { message }
            | Self::ConfigError { message }
            | Self::TransferError { message }
            | Self::DatabaseError { message }
            | Self::ValidationError { message } => message.clone(),
            Self::MissingConfigError { field } => {
                format!("Please set {} in your capatross settings", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CapatrossError>;
