// ABOUTME: Database module exports for SQL Utility
// ABOUTME: Contains the SQL Server table helper, statement builders and table limits

pub mod limits;
pub mod sqlserver;
pub mod statements;

pub use limits::TableLimits;
pub use sqlserver::{DbUtility, SqlServerError};
pub use statements::{NumericCriteria, Predicate, TextCriteria};
