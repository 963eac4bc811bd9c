// ABOUTME: Configuration management for SQL Utility
// ABOUTME: Connection profiles, table limits and ADO connection string building

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::db::{SqlServerError, TableLimits};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
}

/// Connection profile for a database server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub trust_certificate: bool,
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub limits: TableLimits,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    15
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            host: default_host(),
            port: default_port(),
            database: "master".to_string(),
            username: "sa".to_string(),
            password: String::new(),
            trust_certificate: true,
            connect_timeout_secs: default_timeout(),
            limits: TableLimits::default(),
        }
    }
}

impl ConnectionProfile {
    /// ADO connection string for this profile
    pub fn connection_string(&self) -> Result<String, SqlServerError> {
        let address = if self.port == default_port() || self.host.contains(',') {
            self.host.clone()
        } else {
            format!("{},{}", self.host, self.port)
        };
        build_connection_string(
            &address,
            &self.database,
            &self.username,
            &self.password,
            self.trust_certificate,
            Duration::from_secs(self.connect_timeout_secs),
        )
    }
}

/// Build an ADO connection string.
///
/// `address` is a host, optionally followed by `,port`; `.` means the local
/// server. An empty address is rejected.
pub fn build_connection_string(
    address: &str,
    database: &str,
    user: &str,
    password: &str,
    trust_certificate: bool,
    timeout: Duration,
) -> Result<String, SqlServerError> {
    if database.is_empty() {
        return Err(SqlServerError::InvalidArgument {
            name: "database".to_string(),
            reason: "Parameter cannot be null or empty.".to_string(),
        });
    }

    let host = match address.trim() {
        "" => {
            return Err(SqlServerError::InvalidArgument {
                name: "address".to_string(),
                reason: "Parameter cannot be null or empty.".to_string(),
            })
        }
        "." | "(local)" => "localhost",
        other => other,
    };
    let server = if host.contains(',') {
        format!("tcp:{}", host)
    } else {
        format!("tcp:{},{}", host, default_port())
    };

    Ok(format!(
        "server={};database={};user id={};password={};TrustServerCertificate={};Connect Timeout={}",
        ado_quote(&server),
        ado_quote(database),
        ado_quote(user),
        ado_quote(password),
        trust_certificate,
        timeout.as_secs()
    ))
}

/// Quote a connection string value when it would otherwise break the key/value syntax
fn ado_quote(value: &str) -> String {
    let needs_quoting = value.contains([';', '"', '\''])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quoting {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Read the connect timeout out of an ADO connection string, if it carries one
pub fn connect_timeout_from(connection_string: &str) -> Option<Duration> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| {
            matches!(
                key.trim().to_ascii_lowercase().as_str(),
                "connect timeout" | "connection timeout" | "timeout"
            )
        })
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_active_profile")]
    pub active_profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, ConnectionProfile>,
}

fn default_version() -> u32 {
    1
}

fn default_active_profile() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), ConnectionProfile::default());

        Self {
            version: 1,
            active_profile: "default".to_string(),
            profiles,
        }
    }
}

impl AppConfig {
    /// Get the config file path based on OS
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoDirFound)?;
        let app_dir = config_dir.join("sql-utility");
        Ok(app_dir.join("config.json"))
    }

    /// Load config from `path`, or create a default one there if not exists
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the active connection profile
    pub fn active_profile(&self) -> Result<&ConnectionProfile, ConfigError> {
        self.profile(&self.active_profile)
    }

    pub fn profile(&self, key: &str) -> Result<&ConnectionProfile, ConfigError> {
        self.profiles
            .get(key)
            .ok_or_else(|| ConfigError::ProfileNotFound(key.to_string()))
    }

    /// Add or update a profile
    pub fn set_profile(&mut self, key: String, profile: ConnectionProfile) {
        self.profiles.insert(key, profile);
    }
}
