// ABOUTME: Command line definition for SQL Utility
// ABOUTME: Parses arguments with clap, resolves the connection profile and prints JSON responses

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::commands;
use crate::config::{AppConfig, ConnectionProfile};
use crate::db::TableLimits;
use crate::ApiResponse;

#[derive(Debug, Parser)]
#[command(name = "sql-utility", version, about = "SQL Server table helper")]
pub struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, env = "SQL_UTILITY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Profile to use instead of the active one
    #[arg(long, short, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Test, show or save the connection profile
    Connection {
        #[command(subcommand)]
        action: ConnectionAction,
    },
    /// List tables in the database
    Tables,
    /// List column names of a table
    Columns { table: String },
    /// List columns with their SQL and primitive types
    ColumnTypes { table: String },
    /// Count rows in a table
    Count { table: String },
    /// Earliest and latest value of the first datetime column
    TimeSpan { table: String },
    /// Create a table from name:type column specs (types: integer, text, float, datetime)
    Create {
        table: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Insert one row from column=value assignments
    Insert {
        table: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Fill one column with values, one row per value
    InsertColumn {
        table: String,
        column: String,
        #[arg(required = true)]
        values: Vec<String>,
        /// Insert what fits when the row limit would be exceeded
        #[arg(long)]
        insert_as_can: bool,
    },
    /// Delete rows matching filters (column:op:value), or all rows
    Delete {
        table: String,
        #[arg(long = "where", required_unless_present = "all")]
        filters: Vec<String>,
        #[arg(long, conflicts_with = "filters")]
        all: bool,
    },
    /// Read one column, filtered by up to two column:op:value filters.
    /// Ops: lt gt le ge between (low..high) contains not-contains starts-with ends-with
    Select {
        table: String,
        column: String,
        #[arg(long = "where")]
        filters: Vec<String>,
    },
    /// Run a SQL statement and print its first result set
    Query { sql: String },
}

#[derive(Debug, Subcommand)]
pub enum ConnectionAction {
    /// Connect and print the server version
    Test,
    /// Print the profile without its password
    Show,
    /// Save a profile and make it active
    Save {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 1433)]
        port: u16,
        #[arg(long)]
        database: String,
        #[arg(long, default_value = "sa")]
        username: String,
        #[arg(long, env = "SQL_UTILITY_PASSWORD", default_value = "")]
        password: String,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        trust_certificate: bool,
        #[arg(long, default_value_t = 15)]
        timeout: u64,
        /// Maximum rows per table, 0 for unlimited
        #[arg(long, default_value_t = 0)]
        max_rows: u64,
        /// Maximum columns per table, 0 for unlimited
        #[arg(long, default_value_t = 0)]
        max_columns: u32,
    },
}

fn print<T: Serialize>(response: ApiResponse<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.success)
}

/// Run a parsed command line
pub async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::config_path()?,
    };

    if let Command::Connection {
        action:
            ConnectionAction::Save {
                host,
                port,
                database,
                username,
                password,
                trust_certificate,
                timeout,
                max_rows,
                max_columns,
            },
    } = cli.command
    {
        let key = cli.profile.unwrap_or_else(|| "default".to_string());
        let profile = ConnectionProfile {
            name: key.clone(),
            host,
            port,
            database,
            username,
            password,
            trust_certificate,
            connect_timeout_secs: timeout,
            limits: TableLimits::new(max_rows, max_columns),
        };
        return print(commands::save_connection(&config_path, &key, profile));
    }

    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let profile = match &cli.profile {
        Some(key) => config.profile(key)?,
        None => config.active_profile()?,
    };
    log::debug!("Using profile {} ({})", profile.name, profile.host);

    match cli.command {
        Command::Connection { action } => match action {
            ConnectionAction::Test => print(commands::test_connection(profile).await),
            ConnectionAction::Show => print(commands::get_connection(profile)),
            ConnectionAction::Save { .. } => unreachable!("handled before loading the profile"),
        },
        Command::Tables => print(commands::get_tables(profile).await),
        Command::Columns { table } => print(commands::get_columns(profile, &table).await),
        Command::ColumnTypes { table } => print(commands::get_column_types(profile, &table).await),
        Command::Count { table } => print(commands::get_row_count(profile, &table).await),
        Command::TimeSpan { table } => print(commands::get_time_span(profile, &table).await),
        Command::Create { table, columns } => {
            print(commands::create_table(profile, &table, &columns).await)
        }
        Command::Insert { table, values } => {
            print(commands::insert_row(profile, &table, &values).await)
        }
        Command::InsertColumn {
            table,
            column,
            values,
            insert_as_can,
        } => print(commands::insert_column(profile, &table, &column, &values, insert_as_can).await),
        Command::Delete {
            table,
            filters,
            all,
        } => print(commands::delete_rows(profile, &table, &filters, all).await),
        Command::Select {
            table,
            column,
            filters,
        } => print(commands::select_column(profile, &table, &column, &filters).await),
        Command::Query { sql } => print(commands::run_query(profile, &sql).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_select_with_filters() {
        let cli = Cli::try_parse_from([
            "sql-utility",
            "--profile",
            "lab",
            "select",
            "readings",
            "value",
            "--where",
            "value:between:1..5",
            "--where",
            "sensor:starts-with:t",
        ])
        .unwrap();
        assert_eq!(cli.profile.as_deref(), Some("lab"));
        match cli.command {
            Command::Select { filters, .. } => assert_eq!(filters.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_delete_needs_filter_or_all() {
        assert!(Cli::try_parse_from(["sql-utility", "delete", "t"]).is_err());
        assert!(Cli::try_parse_from(["sql-utility", "delete", "t", "--all"]).is_ok());
        assert!(
            Cli::try_parse_from(["sql-utility", "delete", "t", "--all", "--where", "a:lt:1"]).is_err()
        );
    }

    #[tokio::test]
    async fn test_save_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path_arg = path.to_string_lossy().to_string();

        let save = Cli::try_parse_from([
            "sql-utility",
            "--config",
            &path_arg,
            "connection",
            "save",
            "--database",
            "Sensors",
            "--max-rows",
            "100",
        ])
        .unwrap();
        assert!(dispatch(save).await.unwrap());

        let config = AppConfig::load_from(&path).unwrap();
        let profile = config.active_profile().unwrap();
        assert_eq!(profile.database, "Sensors");
        assert_eq!(profile.limits.max_rows, 100);

        let show = Cli::try_parse_from(["sql-utility", "--config", &path_arg, "connection", "show"])
            .unwrap();
        assert!(dispatch(show).await.unwrap());
    }
}
