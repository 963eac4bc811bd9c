// ABOUTME: Main library for SQL Utility
// ABOUTME: Module declarations, the JSON response envelope and the CLI entry point

use serde::{Deserialize, Serialize};

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod models;

pub use db::{DbUtility, NumericCriteria, Predicate, SqlServerError, TableLimits, TextCriteria};
pub use models::{ColumnDef, ColumnType, Value};

/// Standard response envelope printed by every command
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub messages: Messages,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Messages {
    pub error: Vec<String>,
    pub warning: Vec<String>,
    pub info: Vec<String>,
    pub success: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            messages: Messages::default(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            messages: Messages {
                error: vec![message],
                ..Default::default()
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach an informational message
    pub fn with_info(mut self, message: impl Into<String>) -> Self {
        self.messages.info.push(message.into());
        self
    }
}

/// Parse the command line, run one command and print its response.
///
/// Returns whether the command succeeded.
pub async fn run() -> anyhow::Result<bool> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = <cli::Cli as clap::Parser>::parse();
    cli::dispatch(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let resp = ApiResponse::success(vec!["a".to_string()]).with_info("1 table");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0], "a");
        assert_eq!(json["messages"]["info"][0], "1 table");
    }

    #[test]
    fn test_error_envelope() {
        let resp: ApiResponse<()> = ApiResponse::error("boom".to_string());
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.messages.error, vec!["boom".to_string()]);
    }
}
