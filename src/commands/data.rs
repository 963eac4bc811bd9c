// ABOUTME: Data commands
// ABOUTME: Create tables, insert, delete and filtered reads typed from the command line

use crate::config::ConnectionProfile;
use crate::db::SqlServerError;
use crate::models::{ColumnDef, ColumnType, QueryResult, Value};
use crate::ApiResponse;

use super::{column_type_of, drain_events, parse_filters};

/// Parse `name:type` column specs
pub fn parse_column_defs(specs: &[String]) -> Result<Vec<ColumnDef>, SqlServerError> {
    specs
        .iter()
        .map(|spec| {
            let (name, ty) = spec.split_once(':').ok_or_else(|| SqlServerError::InvalidArgument {
                name: "column".to_string(),
                reason: format!("expected name:type, got '{}'", spec),
            })?;
            Ok(ColumnDef::new(name, ty.parse::<ColumnType>()?))
        })
        .collect()
}

/// Parse `column=value` assignments; values stay raw until the column types are known
pub fn parse_assignments(assignments: &[String]) -> Result<Vec<(String, String)>, SqlServerError> {
    assignments
        .iter()
        .map(|a| {
            a.split_once('=')
                .filter(|(column, _)| !column.is_empty())
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .ok_or_else(|| SqlServerError::InvalidArgument {
                    name: "value".to_string(),
                    reason: format!("expected column=value, got '{}'", a),
                })
        })
        .collect()
}

pub async fn create_table(
    profile: &ConnectionProfile,
    table: &str,
    specs: &[String],
) -> ApiResponse<()> {
    let columns = match parse_column_defs(specs) {
        Ok(c) => c,
        Err(e) => return ApiResponse::error(e.to_string()),
    };

    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };
    let mut events = utility.subscribe();

    let response = match utility.create_table(table, &columns).await {
        Ok(()) => {
            let mut resp = ApiResponse::success(());
            resp.messages.success.extend(drain_events(&mut events));
            resp
        }
        Err(e) => ApiResponse::error(format!("Failed to create table: {}", e)),
    };
    utility.close().await;
    response
}

/// Insert one row given as `column=value` assignments
pub async fn insert_row(
    profile: &ConnectionProfile,
    table: &str,
    assignments: &[String],
) -> ApiResponse<u64> {
    let assignments = match parse_assignments(assignments) {
        Ok(a) => a,
        Err(e) => return ApiResponse::error(e.to_string()),
    };

    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };
    let mut events = utility.subscribe();

    let result = async {
        let columns = utility.column_types(table).await?;
        let mut values = Vec::with_capacity(assignments.len());
        for (column, raw) in &assignments {
            let value = column_type_of(table, &columns, column)?.parse_value(raw)?;
            values.push((column.as_str(), value));
        }
        utility.insert_row(table, &values).await
    }
    .await;

    let response = match result {
        Ok(inserted) => {
            let mut resp = ApiResponse::success(inserted);
            resp.messages.success.extend(drain_events(&mut events));
            resp
        }
        Err(e) => ApiResponse::error(format!("Failed to insert: {}", e)),
    };
    utility.close().await;
    response
}

/// Fill one column with a list of values, one row each
pub async fn insert_column(
    profile: &ConnectionProfile,
    table: &str,
    column: &str,
    raw_values: &[String],
    insert_as_can: bool,
) -> ApiResponse<u64> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };
    let mut events = utility.subscribe();

    let requested = raw_values.len();
    let result = async {
        let columns = utility.column_types(table).await?;
        let column_type = column_type_of(table, &columns, column)?;
        let values = raw_values
            .iter()
            .map(|raw| column_type.parse_value(raw))
            .collect::<Result<Vec<Value>, _>>()?;
        utility
            .insert_values(table, column, &values, insert_as_can)
            .await
    }
    .await;

    let response = match result {
        Ok(inserted) => {
            let mut resp = ApiResponse::success(inserted);
            if (inserted as usize) < requested {
                resp.messages.warning.push(format!(
                    "Row limit reached: inserted {} of {} values",
                    inserted, requested
                ));
            }
            resp.messages.success.extend(drain_events(&mut events));
            resp
        }
        Err(e) => ApiResponse::error(format!("Failed to insert: {}", e)),
    };
    utility.close().await;
    response
}

/// Delete rows matching the filters, or every row when `all` is set
pub async fn delete_rows(
    profile: &ConnectionProfile,
    table: &str,
    filters: &[String],
    all: bool,
) -> ApiResponse<u64> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };
    let mut events = utility.subscribe();

    let result = async {
        if all {
            return utility.delete_all(table).await;
        }
        let columns = utility.column_types(table).await?;
        let predicates = parse_filters(table, &columns, filters)?;
        utility.delete_where(table, &predicates).await
    }
    .await;

    let response = match result {
        Ok(removed) => {
            let mut resp = ApiResponse::success(removed);
            resp.messages.success.extend(drain_events(&mut events));
            resp
        }
        Err(e) => ApiResponse::error(format!("Failed to delete: {}", e)),
    };
    utility.close().await;
    response
}

/// Read one column with up to two filters
pub async fn select_column(
    profile: &ConnectionProfile,
    table: &str,
    column: &str,
    filters: &[String],
) -> ApiResponse<Vec<Value>> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let result = async {
        let columns = utility.column_types(table).await?;
        let predicates = parse_filters(table, &columns, filters)?;
        utility.select(table, column, &predicates).await
    }
    .await;

    let response = match result {
        Ok(values) => {
            let count = values.len();
            ApiResponse::success(values).with_info(format!("{} rows", count))
        }
        Err(e) => ApiResponse::error(format!("Failed to select: {}", e)),
    };
    utility.close().await;
    response
}

/// Run a statement typed by the user
pub async fn run_query(profile: &ConnectionProfile, sql: &str) -> ApiResponse<QueryResult> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.query(sql).await {
        Ok(result) => ApiResponse::success(result),
        Err(e) => ApiResponse::error(format!("Query failed: {}", e)),
    };
    utility.close().await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column_defs() {
        let defs = parse_column_defs(&["id:int".to_string(), "taken_at:datetime".to_string()]).unwrap();
        assert_eq!(
            defs,
            vec![
                ColumnDef::new("id", ColumnType::Integer),
                ColumnDef::new("taken_at", ColumnType::DateTime),
            ]
        );

        assert!(matches!(
            parse_column_defs(&["blob:varbinary".to_string()]),
            Err(SqlServerError::UnsupportedType(_))
        ));
        assert!(parse_column_defs(&["nocolon".to_string()]).is_err());
    }

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(&["note=a=b".to_string(), "id=7".to_string()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("note".to_string(), "a=b".to_string()),
                ("id".to_string(), "7".to_string()),
            ]
        );
        assert!(parse_assignments(&["=7".to_string()]).is_err());
        assert!(parse_assignments(&["id".to_string()]).is_err());
    }
}
