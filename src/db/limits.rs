// ABOUTME: Administrative caps on table dimensions
// ABOUTME: Row and column limits checked before inserts and table creation

use serde::{Deserialize, Serialize};

use super::SqlServerError;

/// Optional caps on a table's size. `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableLimits {
    #[serde(rename = "maxRows", default)]
    pub max_rows: u64,
    #[serde(rename = "maxColumns", default)]
    pub max_columns: u32,
}

impl TableLimits {
    pub fn new(max_rows: u64, max_columns: u32) -> Self {
        Self {
            max_rows,
            max_columns,
        }
    }

    /// How many of `requested` rows may be inserted into a table that
    /// currently holds `current` rows.
    ///
    /// When the table cannot take them all, `insert_as_can` decides between
    /// inserting what fits and failing outright.
    pub fn rows_allowed(
        &self,
        table: &str,
        current: u64,
        requested: u64,
        insert_as_can: bool,
    ) -> Result<u64, SqlServerError> {
        if self.max_rows == 0 {
            return Ok(requested);
        }

        let exceeded = || SqlServerError::RowLimitExceeded {
            table: table.to_string(),
            count: current,
            limit: self.max_rows,
        };

        if current >= self.max_rows {
            return Err(exceeded());
        }

        let space_left = self.max_rows - current;
        if space_left < requested {
            if insert_as_can {
                return Ok(space_left);
            }
            return Err(exceeded());
        }

        Ok(requested)
    }

    /// The leading part of `rows` that may be inserted, per [`rows_allowed`](Self::rows_allowed)
    pub fn take_rows<'a, T>(
        &self,
        table: &str,
        current: u64,
        rows: &'a [T],
        insert_as_can: bool,
    ) -> Result<&'a [T], SqlServerError> {
        let allowed = self.rows_allowed(table, current, rows.len() as u64, insert_as_can)?;
        Ok(&rows[..allowed as usize])
    }

    pub fn check_columns(&self, table: &str, columns: usize) -> Result<(), SqlServerError> {
        if self.max_columns > 0 && columns > self.max_columns as usize {
            return Err(SqlServerError::ColumnLimitExceeded {
                table: table.to_string(),
                columns,
                limit: self.max_columns,
            });
        }
        Ok(())
    }
}
