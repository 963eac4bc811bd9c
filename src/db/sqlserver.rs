// ABOUTME: SQL Server table helper built on tiberius
// ABOUTME: Owns one connection and exposes schema introspection, CRUD and filtered reads

use std::time::Duration;

use thiserror::Error;
use tiberius::{Client, Config, ToSql};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::limits::TableLimits;
use super::statements::{self, quote_checked, Predicate, Statement};
use crate::config::{build_connection_string, connect_timeout_from, ConnectionProfile};
use crate::models::{
    ColumnDef, ColumnInfo, ColumnType, EventKind, QueryResult, TimeSpan, UtilityEvent, Value,
};

const EVENT_CAPACITY: usize = 64;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum SqlServerError {
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("Table does not exist: {0}")]
    TableNotFound(String),
    #[error("Table already exists: {0}")]
    TableExists(String),
    #[error("Column {column} does not exist in {table}")]
    ColumnNotFound { table: String, column: String },
    #[error("Insert failed, current rows in {table} is {count}, exceed the limit {limit}.")]
    RowLimitExceeded { table: String, count: u64, limit: u64 },
    #[error("Table {table} would have {columns} columns, exceed the limit {limit}.")]
    ColumnLimitExceeded {
        table: String,
        columns: usize,
        limit: u32,
    },
    #[error("At most {max} predicates are supported, got {0}", max = statements::MAX_PREDICATES)]
    TooManyPredicates(usize),
    #[error("Column {column} in {table} is not a DateTime column")]
    NotDateTimeColumn { table: String, column: String },
    #[error("There is no DateTime column in {0}")]
    NoDateTimeColumn(String),
    #[error("Table {0} has no values to span")]
    EmptyTable(String),
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    #[error("Conversion failed: {0}")]
    Conversion(String),
    #[error("Connection string is not initialized yet")]
    NotConfigured,
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type SqlClient = Client<Compat<TcpStream>>;

/// Table helper around a single SQL Server connection.
///
/// The connection is opened lazily by the first operation that needs it and
/// re-opened whenever a different connection string is set.
pub struct DbUtility {
    connection_string: Option<String>,
    connect_timeout: Duration,
    limits: TableLimits,
    client: Option<SqlClient>,
    events: broadcast::Sender<UtilityEvent>,
}

impl Default for DbUtility {
    fn default() -> Self {
        Self::new()
    }
}

impl DbUtility {
    /// Create a utility with no connection configured
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connection_string: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            limits: TableLimits::default(),
            client: None,
            events,
        }
    }

    /// Create a utility and connect with a complete connection string
    pub async fn open(connection_string: &str) -> Result<Self, SqlServerError> {
        let mut utility = Self::new();
        utility.set_connection_string(connection_string).await?;
        Ok(utility)
    }

    /// Create a utility from a saved profile, applying its table limits
    pub async fn from_profile(profile: &ConnectionProfile) -> Result<Self, SqlServerError> {
        let connection_string = profile.connection_string()?;
        let mut utility = Self::new().with_limits(profile.limits);
        utility.set_connection_string(&connection_string).await?;
        Ok(utility)
    }

    pub fn with_limits(mut self, limits: TableLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    /// `0` removes the cap
    pub fn set_max_rows(&mut self, max_rows: u64) {
        self.limits.max_rows = max_rows;
    }

    /// `0` removes the cap
    pub fn set_max_columns(&mut self, max_columns: u32) {
        self.limits.max_columns = max_columns;
    }

    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Receive events for tables created, rows inserted or deleted and connection changes
    pub fn subscribe(&self) -> broadcast::Receiver<UtilityEvent> {
        self.events.subscribe()
    }

    /// Replace the connection string. A different string closes the current
    /// connection and opens a new one; the same string is a no-op.
    pub async fn set_connection_string(&mut self, value: &str) -> Result<(), SqlServerError> {
        if value.is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "connection_string".to_string(),
                reason: "Parameter is invalid.".to_string(),
            });
        }

        if self.connection_string.as_deref() == Some(value) && self.client.is_some() {
            return Ok(());
        }

        self.close().await;
        self.connection_string = Some(value.to_string());
        self.connect_timeout = connect_timeout_from(value).unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        self.ensure_connected().await?;
        Ok(())
    }

    /// Build a connection string from its parts and connect with it.
    /// An `address` of `.` or empty means the local server.
    pub async fn build_connection_string(
        &mut self,
        database: &str,
        user: &str,
        password: &str,
        address: &str,
    ) -> Result<(), SqlServerError> {
        let connection_string = build_connection_string(
            address,
            database,
            user,
            password,
            true,
            DEFAULT_CONNECT_TIMEOUT,
        )?;
        self.set_connection_string(&connection_string).await
    }

    /// Close the connection if it is open
    pub async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                log::warn!("Failed to close SQL Server connection cleanly: {}", e);
            }
            self.emit(EventKind::Disconnected, None, "connection closed");
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut SqlClient, SqlServerError> {
        if self.client.is_none() {
            let connection_string = self
                .connection_string
                .as_deref()
                .ok_or(SqlServerError::NotConfigured)?;
            let client = connect(connection_string, self.connect_timeout).await?;
            self.client = Some(client);
            self.emit(EventKind::Connected, None, "connection opened");
        }

        self.client.as_mut().ok_or(SqlServerError::NotConfigured)
    }

    fn emit(&self, kind: EventKind, table: Option<&str>, message: impl Into<String>) {
        // No receivers is not an error
        let _ = self.events.send(UtilityEvent::new(kind, table, message));
    }

    async fn fetch(&mut self, stmt: &Statement) -> Result<Vec<tiberius::Row>, SqlServerError> {
        log::debug!("sql: {}", stmt.sql);
        let params: Vec<&dyn ToSql> = stmt.params.iter().map(|p| p as &dyn ToSql).collect();
        let client = self.ensure_connected().await?;
        let rows = client
            .query(stmt.sql.as_str(), &params[..])
            .await?
            .into_first_result()
            .await?;
        Ok(rows)
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, SqlServerError> {
        log::debug!("sql: {}", stmt.sql);
        let params: Vec<&dyn ToSql> = stmt.params.iter().map(|p| p as &dyn ToSql).collect();
        let client = self.ensure_connected().await?;
        let result = client.execute(stmt.sql.as_str(), &params[..]).await?;
        Ok(result.rows_affected().iter().sum())
    }

    /// Test connection by querying SQL Server version
    pub async fn test_connection(&mut self) -> Result<String, SqlServerError> {
        let client = self.ensure_connected().await?;
        let row = client
            .simple_query("SELECT @@VERSION")
            .await?
            .into_row()
            .await?
            .ok_or_else(|| SqlServerError::QueryFailed("No version returned".to_string()))?;

        let version: &str = row.get(0).unwrap_or("Unknown");
        Ok(version.to_string())
    }

    /// Get all base tables of the current database
    pub async fn list_tables(&mut self) -> Result<Vec<String>, SqlServerError> {
        let stmt = Statement {
            sql: "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                  WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_CATALOG = DB_NAME() \
                  ORDER BY TABLE_NAME"
                .to_string(),
            params: Vec::new(),
        };
        let rows = self.fetch(&stmt).await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    /// Validate the table argument and make sure it exists
    async fn require_table(&mut self, table: &str) -> Result<(), SqlServerError> {
        quote_checked("table", table)?;
        if !self.list_tables().await?.iter().any(|t| t == table) {
            return Err(SqlServerError::TableNotFound(table.to_string()));
        }
        Ok(())
    }

    /// Get column names of a table in ordinal order
    pub async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, SqlServerError> {
        self.require_table(table).await?;
        let stmt = Statement {
            sql: "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
                  WHERE TABLE_NAME = @P1 AND TABLE_CATALOG = DB_NAME() \
                  ORDER BY ORDINAL_POSITION"
                .to_string(),
            params: vec![Value::Text(table.to_string())],
        };
        let rows = self.fetch(&stmt).await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0).map(str::to_string))
            .collect())
    }

    /// Get every column of a table with its SQL type and mapped primitive type
    pub async fn column_types(&mut self, table: &str) -> Result<Vec<ColumnInfo>, SqlServerError> {
        self.require_table(table).await?;
        let stmt = Statement {
            sql: "SELECT name, TYPE_NAME(system_type_id), max_length, is_nullable \
                  FROM sys.columns WHERE object_id = OBJECT_ID(@P1) ORDER BY column_id"
                .to_string(),
            params: vec![Value::Text(statements::quote_identifier(table))],
        };
        let rows = self.fetch(&stmt).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = row.get(0).unwrap_or("");
            let sql_type: &str = row.get(1).unwrap_or("");
            let max_length: i16 = row.get(2).unwrap_or(0);
            let nullable: bool = row.get(3).unwrap_or(true);

            columns.push(ColumnInfo {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
                column_type: ColumnType::from_sql_name(sql_type),
                max_length,
                nullable,
            });
        }
        Ok(columns)
    }

    /// Get the current number of rows in a table
    pub async fn row_count(&mut self, table: &str) -> Result<u64, SqlServerError> {
        self.require_table(table).await?;
        self.count_rows(table).await
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64, SqlServerError> {
        let stmt = Statement {
            sql: format!("SELECT COUNT_BIG(*) FROM {}", quote_checked("table", table)?),
            params: Vec::new(),
        };
        let rows = self.fetch(&stmt).await?;
        let count: i64 = rows.first().and_then(|row| row.get(0)).unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// Earliest and latest values of the first DateTime column in a table
    pub async fn time_span(&mut self, table: &str) -> Result<TimeSpan, SqlServerError> {
        let column = self
            .column_types(table)
            .await?
            .into_iter()
            .find(|c| c.column_type == Some(ColumnType::DateTime))
            .ok_or_else(|| SqlServerError::NoDateTimeColumn(table.to_string()))?
            .name;

        let quoted = statements::quote_identifier(&column);
        let stmt = Statement {
            sql: format!(
                "SELECT MIN({0}), MAX({0}) FROM {1}",
                quoted,
                statements::quote_identifier(table)
            ),
            params: Vec::new(),
        };
        let row = self
            .fetch(&stmt)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SqlServerError::EmptyTable(table.to_string()))?;

        let mut cells = row.into_iter().map(Value::try_from);
        let start = cells.next().transpose()?.unwrap_or(Value::Null);
        let end = cells.next().transpose()?.unwrap_or(Value::Null);

        match (start, end) {
            (Value::DateTime(start), Value::DateTime(end)) => Ok(TimeSpan { column, start, end }),
            _ => Err(SqlServerError::EmptyTable(table.to_string())),
        }
    }

    /// Create a table. Fails if the name is already taken.
    pub async fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnDef],
    ) -> Result<(), SqlServerError> {
        let stmt = statements::build_create_table(table, columns)?;
        self.limits.check_columns(table, columns.len())?;

        if self.list_tables().await?.iter().any(|t| t == table) {
            return Err(SqlServerError::TableExists(table.to_string()));
        }

        self.execute(&stmt).await?;
        log::info!("Created table {} with {} columns", table, columns.len());
        self.emit(
            EventKind::TableCreated,
            Some(table),
            format!("created with {} columns", columns.len()),
        );
        Ok(())
    }

    /// Insert one row given as column/value pairs
    pub async fn insert_row(
        &mut self,
        table: &str,
        values: &[(&str, Value)],
    ) -> Result<u64, SqlServerError> {
        quote_checked("table", table)?;
        if values.is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "values".to_string(),
                reason: "Parameter can not be null or empty.".to_string(),
            });
        }

        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let row = values.iter().map(|(_, v)| v.clone()).collect();
        self.insert_rows(table, &columns, &[row], false).await
    }

    /// Insert values into a single column, one row per value
    pub async fn insert_values(
        &mut self,
        table: &str,
        column: &str,
        values: &[Value],
        insert_as_can: bool,
    ) -> Result<u64, SqlServerError> {
        if values.is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "values".to_string(),
                reason: "Parameter can not be null or empty.".to_string(),
            });
        }

        let rows: Vec<Vec<Value>> = values.iter().map(|v| vec![v.clone()]).collect();
        self.insert_rows(table, &[column], &rows, insert_as_can).await
    }

    /// Insert many rows, honouring the row cap.
    ///
    /// When the table cannot take every row and `insert_as_can` is set, the
    /// leading rows that fit are inserted and the rest are dropped. Returns
    /// the number of rows inserted.
    pub async fn insert_rows<C: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[C],
        rows: &[Vec<Value>],
        insert_as_can: bool,
    ) -> Result<u64, SqlServerError> {
        quote_checked("table", table)?;
        if rows.is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "rows".to_string(),
                reason: "Parameter can not be null or empty.".to_string(),
            });
        }
        self.limits.check_columns(table, columns.len())?;
        self.require_table(table).await?;

        let current = self.count_rows(table).await?;
        let rows = self.limits.take_rows(table, current, rows, insert_as_can)?;
        let batches = statements::build_inserts(table, columns, rows)?;

        let mut inserted = 0;
        for stmt in &batches {
            inserted += self.execute(stmt).await?;
        }

        log::info!("Inserted {} rows into {}", inserted, table);
        self.emit(
            EventKind::RowsInserted,
            Some(table),
            format!("{} rows inserted", inserted),
        );
        Ok(inserted)
    }

    /// Delete rows matching one or two predicates
    pub async fn delete_where(
        &mut self,
        table: &str,
        predicates: &[Predicate],
    ) -> Result<u64, SqlServerError> {
        if predicates.is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "predicates".to_string(),
                reason: "use delete_all to remove every row".to_string(),
            });
        }
        let stmt = statements::build_delete(table, predicates)?;
        self.require_table(table).await?;
        self.delete(table, &stmt).await
    }

    /// Delete every row of a table
    pub async fn delete_all(&mut self, table: &str) -> Result<u64, SqlServerError> {
        let stmt = statements::build_delete(table, &[])?;
        self.require_table(table).await?;
        self.delete(table, &stmt).await
    }

    async fn delete(&mut self, table: &str, stmt: &Statement) -> Result<u64, SqlServerError> {
        let removed = self.execute(stmt).await?;
        log::info!("Deleted {} rows from {}", removed, table);
        self.emit(
            EventKind::RowsDeleted,
            Some(table),
            format!("{} rows deleted", removed),
        );
        Ok(removed)
    }

    /// Read one column, filtered by up to two predicates
    pub async fn select(
        &mut self,
        table: &str,
        column: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<Value>, SqlServerError> {
        let stmt = statements::build_select(table, column, predicates)?;
        let columns = self.column_types(table).await?;

        let find = |name: &str| {
            columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| SqlServerError::ColumnNotFound {
                    table: table.to_string(),
                    column: name.to_string(),
                })
        };

        find(column)?;
        for predicate in predicates {
            let info = find(predicate.column())?;
            if predicate.is_temporal() && info.column_type != Some(ColumnType::DateTime) {
                return Err(SqlServerError::NotDateTimeColumn {
                    table: table.to_string(),
                    column: info.name.clone(),
                });
            }
        }

        let rows = self.fetch(&stmt).await?;
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .next()
                    .map(Value::try_from)
                    .unwrap_or(Ok(Value::Null))
            })
            .collect()
    }

    /// Typed variant of [`select`](Self::select); NULLs are skipped
    pub async fn select_as<T>(
        &mut self,
        table: &str,
        column: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<T>, SqlServerError>
    where
        T: TryFrom<Value, Error = SqlServerError>,
    {
        non_null_as(self.select(table, column, predicates).await?)
    }

    /// Run an arbitrary statement and collect its first result set
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult, SqlServerError> {
        if sql.trim().is_empty() {
            return Err(SqlServerError::InvalidArgument {
                name: "selection".to_string(),
                reason: "Parameter can not be null or empty.".to_string(),
            });
        }

        let stmt = Statement {
            sql: sql.to_string(),
            params: Vec::new(),
        };
        let rows = self.fetch(&stmt).await?;

        let mut result = QueryResult::default();
        if let Some(first) = rows.first() {
            result.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
        }
        for row in rows {
            let values = row
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            result.rows.push(values);
        }
        Ok(result)
    }

    /// Run an arbitrary statement and pull one typed column out of it; NULLs are skipped
    pub async fn query_column<T>(&mut self, sql: &str, column: &str) -> Result<Vec<T>, SqlServerError>
    where
        T: TryFrom<Value, Error = SqlServerError>,
    {
        quote_checked("column", column)?;
        let result = self.query(sql).await?;
        non_null_as(project_column(result, column)?)
    }
}

/// Convert values to `T`, skipping NULLs; any other mismatch is an error
fn non_null_as<T>(values: Vec<Value>) -> Result<Vec<T>, SqlServerError>
where
    T: TryFrom<Value, Error = SqlServerError>,
{
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .map(T::try_from)
        .collect()
}

/// Take one column out of a result set. An empty result has no columns to check.
fn project_column(result: QueryResult, column: &str) -> Result<Vec<Value>, SqlServerError> {
    if result.rows.is_empty() {
        return Ok(Vec::new());
    }

    let index = result
        .column_index(column)
        .ok_or_else(|| SqlServerError::ColumnNotFound {
            table: "query result".to_string(),
            column: column.to_string(),
        })?;

    Ok(result
        .rows
        .into_iter()
        .map(|mut row| std::mem::replace(&mut row[index], Value::Null))
        .collect())
}

/// Open a TDS connection, bounded by `timeout`
async fn connect(connection_string: &str, timeout: Duration) -> Result<SqlClient, SqlServerError> {
    let config = Config::from_ado_string(connection_string)
        .map_err(|e| SqlServerError::ConnectionFailed(e.to_string()))?;

    let connecting = async {
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| SqlServerError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| SqlServerError::ConnectionFailed(e.to_string()))
    };

    tokio::time::timeout(timeout, connecting)
        .await
        .map_err(|_| SqlServerError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::statements::{NumericCriteria, TextCriteria};

    fn is_invalid(result: Result<impl std::fmt::Debug, SqlServerError>, arg: &str) -> bool {
        matches!(result, Err(SqlServerError::InvalidArgument { ref name, .. }) if name == arg)
    }

    #[tokio::test]
    async fn test_empty_connection_string_rejected() {
        let mut utility = DbUtility::new();
        assert!(is_invalid(utility.set_connection_string("").await, "connection_string"));
        assert!(utility.connection_string().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_utility() {
        let mut utility = DbUtility::new();
        assert!(!utility.is_connected());
        assert!(matches!(
            utility.list_tables().await,
            Err(SqlServerError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_empty_table_name_rejected_before_connecting() {
        let mut utility = DbUtility::new();
        assert!(is_invalid(utility.list_columns("").await, "table"));
        assert!(is_invalid(utility.row_count("").await, "table"));
        assert!(is_invalid(utility.delete_all("").await, "table"));
        assert!(is_invalid(
            utility.insert_values("", "c", &[Value::Int(1)], false).await,
            "table"
        ));
        assert!(is_invalid(
            utility
                .create_table("", &[ColumnDef::new("id", ColumnType::Integer)])
                .await,
            "table"
        ));
    }

    #[tokio::test]
    async fn test_argument_checks_before_connecting() {
        let mut utility = DbUtility::new();
        assert!(is_invalid(utility.create_table("t", &[]).await, "columns"));
        assert!(is_invalid(utility.insert_values("t", "c", &[], true).await, "values"));
        assert!(is_invalid(utility.insert_row("t", &[]).await, "values"));
        assert!(is_invalid(utility.delete_where("t", &[]).await, "predicates"));
        assert!(is_invalid(utility.query("  ").await, "selection"));
        assert!(is_invalid(
            utility
                .select("t", "v", &[Predicate::text("n", TextCriteria::Contains, "")])
                .await,
            "keyword"
        ));

        let p = Predicate::numeric("a", NumericCriteria::LessThan, 1);
        assert!(matches!(
            utility.select("t", "v", &[p.clone(), p.clone(), p]).await,
            Err(SqlServerError::TooManyPredicates(3))
        ));
    }

    #[tokio::test]
    async fn test_column_limit_checked_before_connecting() {
        let mut utility = DbUtility::new().with_limits(TableLimits::new(0, 1));
        let columns = [
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
        ];
        assert!(matches!(
            utility.create_table("t", &columns).await,
            Err(SqlServerError::ColumnLimitExceeded { columns: 2, limit: 1, .. })
        ));

        utility.set_max_columns(0);
        utility.set_max_rows(10);
        assert_eq!(utility.limits(), TableLimits::new(10, 0));
    }

    #[tokio::test]
    async fn test_build_connection_string_validates_database() {
        let mut utility = DbUtility::new();
        assert!(is_invalid(
            utility.build_connection_string("", "sa", "pw", ".").await,
            "database"
        ));
    }

    #[test]
    fn test_non_null_as_skips_nulls() {
        let values = vec![Value::Int(1), Value::Null, Value::Int(3)];
        assert_eq!(non_null_as::<i32>(values).unwrap(), vec![1, 3]);

        let mixed = vec![Value::Int(1), Value::Text("x".to_string())];
        assert!(matches!(
            non_null_as::<i32>(mixed),
            Err(SqlServerError::Conversion(_))
        ));
    }

    #[test]
    fn test_project_column() {
        let result = QueryResult {
            columns: vec!["id".to_string(), "label".to_string()],
            rows: vec![
                vec![Value::Int(1), Value::Text("a".to_string())],
                vec![Value::Int(2), Value::Null],
            ],
        };
        assert_eq!(
            project_column(result.clone(), "LABEL").unwrap(),
            vec![Value::Text("a".to_string()), Value::Null]
        );
        assert!(matches!(
            project_column(result, "missing"),
            Err(SqlServerError::ColumnNotFound { ref column, .. }) if column == "missing"
        ));
        assert!(project_column(QueryResult::default(), "missing").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let utility = DbUtility::new();
        let mut rx = utility.subscribe();
        utility.emit(EventKind::RowsDeleted, Some("t"), "3 rows deleted");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::RowsDeleted);
        assert_eq!(event.table.as_deref(), Some("t"));
        assert_eq!(event.message, "3 rows deleted");
    }
}
