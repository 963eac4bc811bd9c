// ABOUTME: Command module exports
// ABOUTME: Each command opens the profile's connection, runs one operation and wraps the result

pub mod connection;
pub mod data;
pub mod schema;

pub use connection::*;
pub use data::*;
pub use schema::*;

use tokio::sync::broadcast;

use crate::config::ConnectionProfile;
use crate::db::{DbUtility, NumericCriteria, Predicate, SqlServerError, TextCriteria};
use crate::models::{ColumnInfo, ColumnType, UtilityEvent};

/// Connect with a profile, mapping failure to the message shown to the user
pub(crate) async fn open(profile: &ConnectionProfile) -> Result<DbUtility, String> {
    DbUtility::from_profile(profile)
        .await
        .map_err(|e| format!("Failed to connect: {}", e))
}

/// Log and collect every event the utility has broadcast so far
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<UtilityEvent>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        log::info!("{:?} {:?}: {}", event.kind, event.table, event.message);
        let message = match &event.table {
            Some(table) => format!("{}: {}", table, event.message),
            None => event.message.clone(),
        };
        messages.push(message);
    }
    messages
}

/// A filter typed on the command line: `column:op:value`, with
/// `low..high` as the value for `between`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub column: String,
    pub op: String,
    pub value: String,
}

impl std::str::FromStr for FilterSpec {
    type Err = SqlServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(column), Some(op), Some(value)) if !column.is_empty() && !op.is_empty() => {
                Ok(Self {
                    column: column.to_string(),
                    op: op.to_ascii_lowercase(),
                    value: value.to_string(),
                })
            }
            _ => Err(SqlServerError::InvalidArgument {
                name: "filter".to_string(),
                reason: format!("expected column:op:value, got '{}'", s),
            }),
        }
    }
}

impl FilterSpec {
    /// Turn the filter into a predicate, parsing the value as `column_type`
    pub fn to_predicate(&self, column_type: ColumnType) -> Result<Predicate, SqlServerError> {
        if let Ok(criteria) = self.op.parse::<TextCriteria>() {
            return Ok(Predicate::text(&self.column, criteria, &self.value));
        }

        let criteria: NumericCriteria = self.op.parse()?;
        if criteria == NumericCriteria::Between {
            let (low, high) = self.value.split_once("..").ok_or_else(|| {
                SqlServerError::InvalidArgument {
                    name: "filter".to_string(),
                    reason: "between expects low..high".to_string(),
                }
            })?;
            return Ok(Predicate::between(
                &self.column,
                column_type.parse_value(low)?,
                column_type.parse_value(high)?,
            ));
        }

        Ok(Predicate::numeric(
            &self.column,
            criteria,
            column_type.parse_value(&self.value)?,
        ))
    }
}

/// Look up the primitive type of a column, failing for unknown or unmapped columns
pub(crate) fn column_type_of(
    table: &str,
    columns: &[ColumnInfo],
    name: &str,
) -> Result<ColumnType, SqlServerError> {
    let info = columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| SqlServerError::ColumnNotFound {
            table: table.to_string(),
            column: name.to_string(),
        })?;
    info.column_type
        .ok_or_else(|| SqlServerError::UnsupportedType(info.sql_type.clone()))
}

/// Parse every filter against the table's column types
pub(crate) fn parse_filters(
    table: &str,
    columns: &[ColumnInfo],
    filters: &[String],
) -> Result<Vec<Predicate>, SqlServerError> {
    filters
        .iter()
        .map(|raw| {
            let spec: FilterSpec = raw.parse()?;
            let column_type = column_type_of(table, columns, &spec.column)?;
            spec.to_predicate(column_type)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use chrono::NaiveDate;

    fn info(name: &str, sql_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            column_type: ColumnType::from_sql_name(sql_type),
            max_length: 4,
            nullable: true,
        }
    }

    #[test]
    fn test_parse_filter_spec() {
        let spec: FilterSpec = "taken_at:GE:2024-01-01 08:00:00".parse().unwrap();
        assert_eq!(spec.column, "taken_at");
        assert_eq!(spec.op, "ge");
        assert_eq!(spec.value, "2024-01-01 08:00:00");

        assert!("no-op".parse::<FilterSpec>().is_err());
        assert!(":lt:1".parse::<FilterSpec>().is_err());
    }

    #[test]
    fn test_numeric_filter() {
        let spec: FilterSpec = "age:lt:30".parse().unwrap();
        assert_eq!(
            spec.to_predicate(ColumnType::Integer).unwrap(),
            Predicate::numeric("age", NumericCriteria::LessThan, 30)
        );
    }

    #[test]
    fn test_between_filter() {
        let spec: FilterSpec = "day:between:2024-01-01..2024-01-31".parse().unwrap();
        let low = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let high = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let predicate = spec.to_predicate(ColumnType::DateTime).unwrap();
        assert_eq!(predicate, Predicate::between("day", low, high));
        assert!(predicate.is_temporal());

        let bad: FilterSpec = "day:between:2024-01-01".parse().unwrap();
        assert!(bad.to_predicate(ColumnType::DateTime).is_err());
    }

    #[test]
    fn test_text_filter() {
        let spec: FilterSpec = "name:starts-with:ab:c".parse().unwrap();
        assert_eq!(
            spec.to_predicate(ColumnType::Text).unwrap(),
            Predicate::text("name", TextCriteria::StartsWith, "ab:c")
        );
    }

    #[test]
    fn test_parse_filters_against_columns() {
        let columns = vec![info("id", "int"), info("blob", "varbinary")];
        let parsed = parse_filters("t", &columns, &["ID:gt:3".to_string()]).unwrap();
        assert_eq!(
            parsed,
            vec![Predicate::Numeric {
                column: "ID".to_string(),
                criteria: NumericCriteria::GreaterThan,
                low: Value::Int(3),
                high: None,
            }]
        );

        assert!(matches!(
            parse_filters("t", &columns, &["missing:gt:3".to_string()]),
            Err(SqlServerError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            parse_filters("t", &columns, &["blob:gt:3".to_string()]),
            Err(SqlServerError::UnsupportedType(_))
        ));
    }
}
