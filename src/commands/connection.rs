// ABOUTME: Connection-related commands
// ABOUTME: Handles SQL Server connection testing and saving/showing connection profiles

use std::path::Path;

use crate::config::{AppConfig, ConnectionProfile};
use crate::db::TableLimits;
use crate::ApiResponse;

/// Test connection to SQL Server using a profile
pub async fn test_connection(profile: &ConnectionProfile) -> ApiResponse<String> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.test_connection().await {
        Ok(version) => ApiResponse::success(version),
        Err(e) => ApiResponse::error(format!("Connection test failed: {}", e)),
    };
    utility.close().await;
    response
}

/// Save a connection profile under `key` and make it the active one
pub fn save_connection(
    config_path: &Path,
    key: &str,
    profile: ConnectionProfile,
) -> ApiResponse<()> {
    if let Err(e) = profile.connection_string() {
        return ApiResponse::error(format!("Invalid connection profile: {}", e));
    }

    let mut config = match AppConfig::load_from(config_path) {
        Ok(config) => config,
        Err(e) => return ApiResponse::error(format!("Failed to load config: {}", e)),
    };

    config.set_profile(key.to_string(), profile);
    config.active_profile = key.to_string();

    match config.save_to(config_path) {
        Ok(_) => ApiResponse::success(()).with_info(format!("Profile '{}' saved", key)),
        Err(e) => ApiResponse::error(format!("Failed to save connection: {}", e)),
    }
}

/// Get a connection profile (without password)
pub fn get_connection(profile: &ConnectionProfile) -> ApiResponse<ConnectionProfilePublic> {
    ApiResponse::success(ConnectionProfilePublic::from(profile))
}

/// Public connection profile (without password)
#[derive(Debug, serde::Serialize)]
pub struct ConnectionProfilePublic {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub trust_certificate: bool,
    pub connect_timeout_secs: u64,
    pub limits: TableLimits,
}

impl From<&ConnectionProfile> for ConnectionProfilePublic {
    fn from(p: &ConnectionProfile) -> Self {
        Self {
            name: p.name.clone(),
            host: p.host.clone(),
            port: p.port,
            database: p.database.clone(),
            username: p.username.clone(),
            trust_certificate: p.trust_certificate,
            connect_timeout_secs: p.connect_timeout_secs,
            limits: p.limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_connection_activates_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let profile = ConnectionProfile {
            name: "Lab".to_string(),
            database: "Sensors".to_string(),
            password: "secret".to_string(),
            ..ConnectionProfile::default()
        };
        let resp = save_connection(&path, "lab", profile);
        assert!(resp.success);

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.active_profile, "lab");
        assert_eq!(config.active_profile().unwrap().database, "Sensors");
    }

    #[test]
    fn test_save_connection_rejects_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let profile = ConnectionProfile {
            database: String::new(),
            ..ConnectionProfile::default()
        };
        let resp = save_connection(&path, "bad", profile);
        assert!(!resp.success);
    }

    #[test]
    fn test_save_connection_keeps_unparsable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let original = r#"{"version": "1", "active_profile": "keep", "profiles": {"keep": {"name": "Keep", "database": "db", "username": "sa"}}}"#;
        std::fs::write(&path, original).unwrap();

        let profile = ConnectionProfile {
            database: "Sensors".to_string(),
            ..ConnectionProfile::default()
        };
        let resp = save_connection(&path, "new", profile);
        assert!(!resp.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_public_profile_hides_password() {
        let profile = ConnectionProfile {
            password: "secret".to_string(),
            ..ConnectionProfile::default()
        };
        let json = serde_json::to_string(&get_connection(&profile)).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"database\":\"master\""));
    }
}
