use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Root directory for uploaded blog images and documents
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum request body size for multipart routes in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// First administrator account, created at startup when missing
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database type (postgres or sqlite)
    #[serde(default = "default_db_type", rename = "type")]
    pub db_type: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name, or the file path for sqlite
    #[serde(default = "default_db_name", rename = "database")]
    pub name: String,
    #[serde(default = "default_db_user", rename = "username")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// When false, every outgoing mail is dropped
    #[serde(default = "default_mail_enabled")]
    pub enabled: bool,
    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Capacity of the delivery queue
    #[serde(default = "default_mail_queue")]
    pub queue_size: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: default_mail_enabled(),
            from: default_mail_from(),
            queue_size: default_mail_queue(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_username: String,
    #[serde(default)]
    pub admin_password: String,
    #[serde(default)]
    pub admin_name: String,
    #[serde(default)]
    pub admin_code: String,
}

impl BootstrapConfig {
    pub fn is_configured(&self) -> bool {
        !self.admin_username.is_empty() && !self.admin_password.is_empty()
    }
}

// Default value functions
fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_max_upload_size() -> usize {
    12 * 1024 * 1024 // documents are capped at 10MB, leave room for the form
}

fn default_db_type() -> String {
    "postgres".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "schoolhub".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    100
}

fn default_min_connections() -> u32 {
    5
}

fn default_mail_enabled() -> bool {
    true
}

fn default_mail_from() -> String {
    "noreply@schoolhub.local".to_string()
}

fn default_mail_queue() -> usize {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            upload_dir: default_upload_dir(),
            max_upload_size: default_max_upload_size(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            mail: MailConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: default_db_type(),
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_sqlite(&self) -> bool {
        self.db_type.eq_ignore_ascii_case("sqlite")
    }

    /// Generate database connection URL
    pub fn connection_url(&self) -> String {
        if self.is_sqlite() {
            if self.name == ":memory:" {
                return "sqlite::memory:".to_string();
            }
            return format!("sqlite://{}?mode=rwc", self.name);
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
