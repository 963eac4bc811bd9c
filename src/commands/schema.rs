// ABOUTME: Schema introspection commands
// ABOUTME: Lists tables and columns, column types, row counts and datetime spans

use crate::config::ConnectionProfile;
use crate::models::{ColumnInfo, TimeSpan};
use crate::ApiResponse;

/// Get list of tables in the profile's database
pub async fn get_tables(profile: &ConnectionProfile) -> ApiResponse<Vec<String>> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.list_tables().await {
        Ok(tables) => {
            let count = tables.len();
            ApiResponse::success(tables).with_info(format!("{} tables", count))
        }
        Err(e) => ApiResponse::error(format!("Failed to get tables: {}", e)),
    };
    utility.close().await;
    response
}

pub async fn get_columns(profile: &ConnectionProfile, table: &str) -> ApiResponse<Vec<String>> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.list_columns(table).await {
        Ok(columns) => ApiResponse::success(columns),
        Err(e) => ApiResponse::error(format!("Failed to get columns: {}", e)),
    };
    utility.close().await;
    response
}

pub async fn get_column_types(
    profile: &ConnectionProfile,
    table: &str,
) -> ApiResponse<Vec<ColumnInfo>> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.column_types(table).await {
        Ok(columns) => {
            let unmapped: Vec<&str> = columns
                .iter()
                .filter(|c| c.column_type.is_none())
                .map(|c| c.name.as_str())
                .collect();
            let warning = (!unmapped.is_empty())
                .then(|| format!("Columns without a primitive type: {}", unmapped.join(", ")));

            let mut resp = ApiResponse::success(columns);
            resp.messages.warning.extend(warning);
            resp
        }
        Err(e) => ApiResponse::error(format!("Failed to get column types: {}", e)),
    };
    utility.close().await;
    response
}

pub async fn get_row_count(profile: &ConnectionProfile, table: &str) -> ApiResponse<u64> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let limit = utility.limits().max_rows;
    let response = match utility.row_count(table).await {
        Ok(count) if limit > 0 => {
            ApiResponse::success(count).with_info(format!("{} of {} rows used", count, limit))
        }
        Ok(count) => ApiResponse::success(count),
        Err(e) => ApiResponse::error(format!("Failed to count rows: {}", e)),
    };
    utility.close().await;
    response
}

/// Earliest and latest timestamps in the table's first datetime column
pub async fn get_time_span(profile: &ConnectionProfile, table: &str) -> ApiResponse<TimeSpan> {
    let mut utility = match super::open(profile).await {
        Ok(u) => u,
        Err(e) => return ApiResponse::error(e),
    };

    let response = match utility.time_span(table).await {
        Ok(span) => ApiResponse::success(span),
        Err(e) => ApiResponse::error(format!("Failed to get time span: {}", e)),
    };
    utility.close().await;
    response
}
